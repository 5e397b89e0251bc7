//! Content-addressed hash DAG — the Merkle-style node store behind incremental
//! change detection.
//!
//! A node's identity is the SHA-256 digest of its payload, so two nodes with the
//! same payload are always the same node (`add` is idempotent) and no node can
//! ever become its own ancestor: identity is a pure function of content, not of
//! insertion order, so cycles are simply not constructible. Parent/child links
//! are stored as sets of identities into the same `nodes` map — an arena keyed by
//! content hash — rather than as pointers, which is the natural shape for this in
//! a language with strict ownership.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

pub type NodeId = String;

fn digest(payload: &[u8]) -> NodeId {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// A single node in the DAG: its payload plus the identities of its parents and
/// children. Parent/child identities always point at nodes present in the same
/// [`HashDag`] — enforced by construction, since `add` is the only way to create
/// an edge and it requires the parent to already exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub payload: Vec<u8>,
    #[serde(default)]
    pub parents: HashSet<NodeId>,
    #[serde(default)]
    pub children: HashSet<NodeId>,
}

/// Result of comparing two DAGs. `modified` is always empty: identity is
/// content-derived, so any mutation produces a new identity and shows up as an
/// add/remove pair instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DagDiff {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub modified: Vec<NodeId>,
}

/// Wire format for a persisted DAG: `{nodes: [[id, node]], rootIds: [id]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagSnapshot {
    pub nodes: Vec<(NodeId, Node)>,
    #[serde(rename = "rootIds")]
    pub root_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct HashDag {
    nodes: HashMap<NodeId, Node>,
    roots: HashSet<NodeId>,
}

impl HashDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `payload`, optionally as a child of `parent_id`. Returns the
    /// node's identity (the digest of `payload`).
    ///
    /// If the payload already has a node, that node's identity is returned
    /// unchanged and the node set is not modified — `add` is idempotent.
    ///
    /// If `parent_id` is given but no node with that id exists, the new node is
    /// still inserted, but no edge is recorded and the node is *not* added to
    /// the root set (it becomes an orphan). Callers are expected to never do
    /// this in practice; it exists only so `add` never fails.
    pub fn add(&mut self, payload: impl Into<Vec<u8>>, parent_id: Option<&NodeId>) -> NodeId {
        let payload = payload.into();
        let id = digest(&payload);

        if !self.nodes.contains_key(&id) {
            self.nodes.insert(
                id.clone(),
                Node { id: id.clone(), payload, parents: HashSet::new(), children: HashSet::new() },
            );
            match parent_id {
                Some(parent) if self.nodes.contains_key(parent) => {
                    // linked below
                }
                Some(_) => return id, // orphan: parent doesn't exist, no edge, no root membership
                None => {
                    self.roots.insert(id.clone());
                    return id;
                }
            }
        }

        if let Some(parent) = parent_id {
            if self.nodes.contains_key(parent) && parent != &id {
                self.nodes.get_mut(parent).unwrap().children.insert(id.clone());
                self.nodes.get_mut(&id).unwrap().parents.insert(parent.clone());
                self.roots.remove(&id);
            }
        } else if !self.nodes[&id].parents.is_empty() {
            // already linked from a previous add with a parent; leave root membership as-is
        } else {
            self.roots.insert(id.clone());
        }

        id
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn roots(&self) -> Vec<&Node> {
        self.nodes.values().filter(|n| n.parents.is_empty()).collect()
    }

    pub fn leaves(&self) -> Vec<&Node> {
        self.nodes.values().filter(|n| n.children.is_empty()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn serialize(&self) -> DagSnapshot {
        let nodes = self.nodes.iter().map(|(id, n)| (id.clone(), n.clone())).collect();
        let root_ids = self.roots().into_iter().map(|n| n.id.clone()).collect();
        DagSnapshot { nodes, root_ids }
    }

    pub fn deserialize(snapshot: DagSnapshot) -> Self {
        let nodes: HashMap<NodeId, Node> = snapshot.nodes.into_iter().collect();
        let roots = nodes.values().filter(|n| n.parents.is_empty()).map(|n| n.id.clone()).collect();
        HashDag { nodes, roots }
    }

    /// Set-difference of node identities between two DAGs. `modified` is always
    /// empty — see the module doc comment.
    pub fn compare(a: &HashDag, b: &HashDag) -> DagDiff {
        let a_ids: HashSet<&NodeId> = a.nodes.keys().collect();
        let b_ids: HashSet<&NodeId> = b.nodes.keys().collect();

        let mut added: Vec<NodeId> = b_ids.difference(&a_ids).map(|s| (*s).clone()).collect();
        let mut removed: Vec<NodeId> = a_ids.difference(&b_ids).map(|s| (*s).clone()).collect();
        added.sort();
        removed.sort();

        DagDiff { added, removed, modified: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut dag = HashDag::new();
        let a = dag.add(b"hello".to_vec(), None);
        let b = dag.add(b"hello".to_vec(), None);
        assert_eq!(a, b);
        assert_eq!(dag.len(), 1);
    }

    #[test]
    fn parent_child_edges_remove_root_membership() {
        let mut dag = HashDag::new();
        let parent = dag.add(b"root".to_vec(), None);
        let child = dag.add(b"child".to_vec(), Some(&parent));

        assert!(dag.roots().iter().any(|n| n.id == parent));
        assert!(!dag.roots().iter().any(|n| n.id == child));
        assert!(dag.get(&parent).unwrap().children.contains(&child));
        assert!(dag.get(&child).unwrap().parents.contains(&parent));
    }

    #[test]
    fn orphan_add_with_missing_parent_is_not_a_root() {
        let mut dag = HashDag::new();
        let child = dag.add(b"lonely".to_vec(), Some(&"does-not-exist".to_string()));
        assert!(!dag.roots().iter().any(|n| n.id == child));
        assert!(dag.get(&child).unwrap().parents.is_empty());
    }

    #[test]
    fn compare_is_pure_set_difference_with_empty_modified() {
        let mut a = HashDag::new();
        a.add(b"one".to_vec(), None);
        a.add(b"two".to_vec(), None);

        let mut b = HashDag::new();
        b.add(b"two".to_vec(), None);
        b.add(b"three".to_vec(), None);

        let diff = HashDag::compare(&a, &b);
        assert_eq!(diff.added, vec![digest(b"three")]);
        assert_eq!(diff.removed, vec![digest(b"one")]);
        assert!(diff.modified.is_empty());
    }

    #[test]
    fn serialize_deserialize_round_trip_preserves_structure() {
        let mut dag = HashDag::new();
        let root = dag.add(b"root".to_vec(), None);
        let leaf = dag.add(b"leaf".to_vec(), Some(&root));

        let snapshot = dag.serialize();
        let json = serde_json::to_string(&snapshot).unwrap();
        let round_tripped: DagSnapshot = serde_json::from_str(&json).unwrap();
        let restored = HashDag::deserialize(round_tripped);

        assert_eq!(restored.len(), dag.len());
        let mut restored_roots: Vec<NodeId> = restored.roots().into_iter().map(|n| n.id.clone()).collect();
        let mut original_roots: Vec<NodeId> = dag.roots().into_iter().map(|n| n.id.clone()).collect();
        restored_roots.sort();
        original_roots.sort();
        assert_eq!(restored_roots, original_roots);

        let mut restored_leaves: Vec<NodeId> = restored.leaves().into_iter().map(|n| n.id.clone()).collect();
        let mut original_leaves: Vec<NodeId> = dag.leaves().into_iter().map(|n| n.id.clone()).collect();
        restored_leaves.sort();
        original_leaves.sort();
        assert_eq!(restored_leaves, original_leaves);

        assert_eq!(restored.get(&leaf).unwrap().parents, dag.get(&leaf).unwrap().parents);
        assert_eq!(restored.get(&root).unwrap().children, dag.get(&root).unwrap().children);
    }
}
