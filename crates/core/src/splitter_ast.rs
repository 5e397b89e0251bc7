//! AST-based splitter (`treesitter` feature) — chunks source at symbol
//! boundaries (function/struct/class/impl/etc.) using tree-sitter grammars,
//! falling back to [`FallbackSplitter`] for languages without a grammar here.

use tree_sitter::{Language, Node, Parser};

use crate::collaborators::{SplitChunk, Splitter};
use crate::splitter::FallbackSplitter;

const SUPPORTED: &[&str] = &["rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "pyi", "go", "c", "h", "cpp", "cc", "cxx", "hpp", "hh", "hxx", "java"];

fn language_for(lang: &str) -> Option<Language> {
    match lang {
        "rs" => Some(tree_sitter_rust::LANGUAGE.into()),
        "ts" | "tsx" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "js" | "jsx" | "mjs" | "cjs" => Some(tree_sitter_javascript::LANGUAGE.into()),
        "py" | "pyi" => Some(tree_sitter_python::LANGUAGE.into()),
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        "c" | "h" => Some(tree_sitter_c::LANGUAGE.into()),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some(tree_sitter_cpp::LANGUAGE.into()),
        "java" => Some(tree_sitter_java::LANGUAGE.into()),
        _ => None,
    }
}

/// True for tree-sitter node kinds that mark a symbol boundary worth chunking
/// on across the grammars this splitter supports.
fn is_boundary(kind: &str) -> bool {
    matches!(
        kind,
        "function_item"
            | "struct_item"
            | "enum_item"
            | "trait_item"
            | "impl_item"
            | "type_item"
            | "const_item"
            | "static_item"
            | "function_declaration"
            | "class_declaration"
            | "interface_declaration"
            | "type_alias_declaration"
            | "method_definition"
            | "function_definition"
            | "class_definition"
            | "method_declaration"
            | "type_spec"
            | "struct_specifier"
            | "enum_specifier"
            | "class_specifier"
            | "enum_declaration"
    )
}

fn collect_boundaries(node: Node, source: &[u8], language: &str, file_path: Option<&str>, out: &mut Vec<SplitChunk>) {
    if is_boundary(node.kind()) {
        let start_line = node.start_position().row + 1;
        let end_line = node.end_position().row + 1;
        if let Ok(text) = node.utf8_text(source) {
            out.push(SplitChunk {
                content: text.to_string(),
                start_line,
                end_line,
                language: language.to_string(),
                file_path: file_path.map(str::to_string),
            });
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_boundaries(child, source, language, file_path, out);
    }
}

pub struct AstSplitter {
    fallback: FallbackSplitter,
}

impl Default for AstSplitter {
    fn default() -> Self {
        Self { fallback: FallbackSplitter::new() }
    }
}

impl AstSplitter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Splitter for AstSplitter {
    fn split(&self, code: &str, language: &str, file_path: Option<&str>) -> Vec<SplitChunk> {
        let Some(ts_language) = language_for(language) else {
            return self.fallback.split(code, language, file_path);
        };

        let mut parser = Parser::new();
        if parser.set_language(&ts_language).is_err() {
            return self.fallback.split(code, language, file_path);
        }

        let Some(tree) = parser.parse(code, None) else {
            return self.fallback.split(code, language, file_path);
        };

        let mut chunks = Vec::new();
        collect_boundaries(tree.root_node(), code.as_bytes(), language, file_path, &mut chunks);

        if chunks.is_empty() {
            return self.fallback.split(code, language, file_path);
        }

        chunks.sort_by_key(|c| c.start_line);
        chunks
    }

    fn set_chunk_size(&mut self, size: usize) {
        self.fallback.set_chunk_size(size);
    }

    fn set_chunk_overlap(&mut self, overlap: usize) {
        self.fallback.set_chunk_overlap(overlap);
    }

    fn supported_languages(&self) -> &[&'static str] {
        SUPPORTED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_functions_become_individual_chunks() {
        let splitter = AstSplitter::new();
        let code = "fn a() {\n    1\n}\n\nfn b() {\n    2\n}\n";
        let chunks = splitter.split(code, "rs", Some("lib.rs"));
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.starts_with("fn a"));
        assert!(chunks[1].content.starts_with("fn b"));
    }

    #[test]
    fn unsupported_language_falls_back() {
        let splitter = AstSplitter::new();
        let code = "some\n\nplain\n\ntext that is long enough to survive the fallback's minimum length check";
        let chunks = splitter.split(code, "plaintext", None);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn advertises_its_supported_languages() {
        let splitter = AstSplitter::new();
        assert!(splitter.supported_languages().contains(&"rs"));
    }
}
