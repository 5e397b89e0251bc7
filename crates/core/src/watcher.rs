//! Debounced, reentrancy-guarded file watcher.
//!
//! Filesystem notifications may arrive on any thread (`notify`'s own callback
//! thread); they are serialized into a single tokio channel and observed by one
//! debounce task, so from the registered callback's perspective the watcher is
//! single-threaded cooperative.

use futures::future::BoxFuture;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{CoreError, Result};

const DEFAULT_DEBOUNCE_MS: u64 = 2000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchEventKind {
    Add,
    Change,
    Unlink,
    AddDir,
    UnlinkDir,
}

#[derive(Clone, Debug)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub observed_at_ms: u64,
}

/// One debounced batch: `deduped` has at most one entry per relative path
/// (the most recent event for that path); `ordered` is every event observed
/// during the batch, in arrival order.
#[derive(Clone, Debug, Default)]
pub struct ChangeBatch {
    pub deduped: Vec<WatchEvent>,
    pub ordered: Vec<WatchEvent>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct WatchStats {
    pub watched_paths: usize,
    pub total_events: u64,
    pub processed_events: u64,
    pub errors: u64,
    pub started_at_ms: Option<u64>,
}

pub type ChangeCallback =
    Arc<dyn Fn(ChangeBatch) -> BoxFuture<'static, std::result::Result<(), String>> + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn relative_path_of(path: &Path, roots: &[PathBuf]) -> String {
    for root in roots {
        if let Ok(rel) = path.strip_prefix(root) {
            return rel.to_string_lossy().replace('\\', "/");
        }
    }
    path.to_string_lossy().replace('\\', "/")
}

fn kind_of(kind: &EventKind, path: &Path) -> WatchEventKind {
    let is_dir = path.is_dir();
    match kind {
        EventKind::Create(_) => {
            if is_dir {
                WatchEventKind::AddDir
            } else {
                WatchEventKind::Add
            }
        }
        EventKind::Remove(_) => {
            // The path no longer exists by the time we observe a remove event,
            // so directory-ness can't be determined; treat as a file unlink.
            WatchEventKind::Unlink
        }
        _ => WatchEventKind::Change,
    }
}

enum Control {
    Stop(oneshot::Sender<()>),
}

/// Subscribes to filesystem events under a configured set of absolute paths,
/// debounces them, and invokes a registered change callback once per quiet
/// period.
pub struct Watcher {
    paths: Vec<PathBuf>,
    debounce_ms: u64,
    notify_watcher: Option<RecommendedWatcher>,
    running: bool,
    change_cb: Arc<Mutex<Option<ChangeCallback>>>,
    error_cb: Arc<Mutex<Option<ErrorCallback>>>,
    stats: Arc<Mutex<WatchStats>>,
    task: Option<JoinHandle<()>>,
    control_tx: Option<mpsc::UnboundedSender<Control>>,
}

impl Watcher {
    pub fn new(paths: Vec<PathBuf>, debounce_ms: Option<u64>) -> Self {
        Self {
            paths,
            debounce_ms: debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
            notify_watcher: None,
            running: false,
            change_cb: Arc::new(Mutex::new(None)),
            error_cb: Arc::new(Mutex::new(None)),
            stats: Arc::new(Mutex::new(WatchStats::default())),
            task: None,
            control_tx: None,
        }
    }

    /// Only the most recently registered handler is invoked.
    pub fn on_change(&self, cb: ChangeCallback) {
        *self.change_cb.lock().unwrap() = Some(cb);
    }

    /// Only the most recently registered handler is invoked.
    pub fn on_error(&self, cb: ErrorCallback) {
        *self.error_cb.lock().unwrap() = Some(cb);
    }

    pub fn is_watching(&self) -> bool {
        self.running
    }

    pub fn stats(&self) -> WatchStats {
        self.stats.lock().unwrap().clone()
    }

    /// Subscribes to events on the configured paths. Initial-scan events
    /// already present at subscription time are not re-emitted, since
    /// `notify` only reports changes observed after `watch()` is called.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(CoreError::DuplicateStart("file watcher"));
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<std::result::Result<Event, String>>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = raw_tx.send(res.map_err(|e| e.to_string()));
            },
            notify::Config::default(),
        )
        .map_err(|e| CoreError::Watcher(e.to_string()))?;

        for path in &self.paths {
            watcher.watch(path, RecursiveMode::Recursive).map_err(|e| CoreError::Watcher(e.to_string()))?;
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel::<Control>();
        let roots = self.paths.clone();
        let debounce_ms = self.debounce_ms;
        let change_cb = Arc::clone(&self.change_cb);
        let error_cb = Arc::clone(&self.error_cb);
        let stats = Arc::clone(&self.stats);

        {
            let mut s = stats.lock().unwrap();
            s.watched_paths = self.paths.len();
            s.started_at_ms = Some(now_ms());
        }

        let handle = tokio::spawn(debounce_loop(raw_rx, control_rx, roots, debounce_ms, change_cb, error_cb, stats));

        self.notify_watcher = Some(watcher);
        self.control_tx = Some(control_tx);
        self.task = Some(handle);
        self.running = true;
        Ok(())
    }

    /// No-op (with a warning) if not currently running. Flushes any buffered
    /// batch through the callback before tearing down.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.running {
            warn!("stop() called on a watcher that is not running");
            return Ok(());
        }

        if let Some(tx) = self.control_tx.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(Control::Stop(ack_tx)).is_ok() {
                let _ = ack_rx.await;
            }
        }
        if let Some(handle) = self.task.take() {
            let _ = handle.await;
        }
        self.notify_watcher = None;
        self.running = false;
        Ok(())
    }

    /// Replaces the watched path set. If `restart` is true and the watcher is
    /// currently running, performs `stop()` then `start()`.
    pub async fn update_paths(&mut self, paths: Vec<PathBuf>, restart: bool) -> Result<()> {
        self.paths = paths;
        if restart && self.running {
            self.stop().await?;
            self.start().await?;
        }
        Ok(())
    }
}

fn record_event(
    event: Event,
    roots: &[PathBuf],
    ordered: &mut Vec<WatchEvent>,
    deduped: &mut HashMap<String, WatchEvent>,
    stats: &Mutex<WatchStats>,
) {
    let observed_at_ms = now_ms();
    for path in event.paths {
        let relative_path = relative_path_of(&path, roots);
        let watch_event =
            WatchEvent { kind: kind_of(&event.kind, &path), absolute_path: path, relative_path, observed_at_ms };
        stats.lock().unwrap().total_events += 1;
        deduped.insert(watch_event.relative_path.clone(), watch_event.clone());
        ordered.push(watch_event);
    }
}

/// Drains `ordered`/`deduped` into a batch and, if no previous invocation is
/// still in flight, hands it to the registered change callback. `force=true`
/// (used on `stop()`) waits for any in-flight invocation instead of skipping.
async fn flush(
    ordered: &mut Vec<WatchEvent>,
    deduped: &mut HashMap<String, WatchEvent>,
    change_cb: &Arc<Mutex<Option<ChangeCallback>>>,
    error_cb: &Arc<Mutex<Option<ErrorCallback>>>,
    stats: &Arc<Mutex<WatchStats>>,
    semaphore: &Arc<Semaphore>,
    done_tx: &mpsc::UnboundedSender<()>,
    force: bool,
) {
    if ordered.is_empty() {
        return;
    }

    let permit = if force {
        match semaphore.clone().acquire_owned().await {
            Ok(p) => Some(p),
            Err(_) => None,
        }
    } else {
        semaphore.clone().try_acquire_owned().ok()
    };

    let Some(permit) = permit else {
        // A previous invocation is still running; leave the buffers intact so
        // the next timer expiry retries with everything accumulated so far.
        return;
    };

    let batch = ChangeBatch { deduped: deduped.values().cloned().collect(), ordered: std::mem::take(ordered) };
    deduped.clear();

    let cb = change_cb.lock().unwrap().clone();
    let Some(cb) = cb else {
        drop(permit);
        return;
    };

    let processed = batch.ordered.len() as u64;
    let run = async move {
        let result = cb(batch).await;
        drop(permit);
        result
    };

    if force {
        if let Err(e) = run.await {
            stats.lock().unwrap().errors += 1;
            if let Some(err_cb) = error_cb.lock().unwrap().clone() {
                err_cb(e);
            }
        }
        stats.lock().unwrap().processed_events += processed;
    } else {
        let error_cb = Arc::clone(error_cb);
        let stats = Arc::clone(stats);
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = run.await {
                stats.lock().unwrap().errors += 1;
                if let Some(err_cb) = error_cb.lock().unwrap().clone() {
                    err_cb(e);
                }
            }
            stats.lock().unwrap().processed_events += processed;
            // Finally path: signal the debounce loop so it can schedule a
            // fresh timer if events accumulated while this callback ran.
            let _ = done_tx.send(());
        });
    }
}

async fn debounce_loop(
    mut event_rx: mpsc::UnboundedReceiver<std::result::Result<Event, String>>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    roots: Vec<PathBuf>,
    debounce_ms: u64,
    change_cb: Arc<Mutex<Option<ChangeCallback>>>,
    error_cb: Arc<Mutex<Option<ErrorCallback>>>,
    stats: Arc<Mutex<WatchStats>>,
) {
    let mut ordered: Vec<WatchEvent> = Vec::new();
    let mut deduped: HashMap<String, WatchEvent> = HashMap::new();
    let semaphore = Arc::new(Semaphore::new(1));
    let mut deadline: Option<tokio::time::Instant> = None;
    // Signaled by a spawned callback invocation's finally path when it
    // completes, so a busy-skipped flush gets retried once the in-flight
    // callback is done rather than waiting for an unrelated future event.
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();

    loop {
        let sleep = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            Some(control) = control_rx.recv() => {
                match control {
                    Control::Stop(ack) => {
                        flush(&mut ordered, &mut deduped, &change_cb, &error_cb, &stats, &semaphore, &done_tx, true).await;
                        let _ = ack.send(());
                        return;
                    }
                }
            }
            maybe_event = event_rx.recv() => {
                match maybe_event {
                    Some(Ok(event)) => {
                        record_event(event, &roots, &mut ordered, &mut deduped, &stats);
                        deadline = Some(tokio::time::Instant::now() + Duration::from_millis(debounce_ms));
                    }
                    Some(Err(err)) => {
                        stats.lock().unwrap().errors += 1;
                        let cb = error_cb.lock().unwrap().clone();
                        if let Some(cb) = cb {
                            cb(err);
                        }
                    }
                    None => {
                        flush(&mut ordered, &mut deduped, &change_cb, &error_cb, &stats, &semaphore, &done_tx, true).await;
                        return;
                    }
                }
            }
            Some(()) = done_rx.recv() => {
                if deadline.is_none() && !ordered.is_empty() {
                    deadline = Some(tokio::time::Instant::now() + Duration::from_millis(debounce_ms));
                }
            }
            _ = sleep, if deadline.is_some() => {
                flush(&mut ordered, &mut deduped, &change_cb, &error_cb, &stats, &semaphore, &done_tx, false).await;
                deadline = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn start_twice_returns_duplicate_start_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut watcher = Watcher::new(vec![tmp.path().to_path_buf()], Some(50));
        watcher.start().await.unwrap();
        let err = watcher.start().await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateStart(_)));
        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_when_not_running_is_a_harmless_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let mut watcher = Watcher::new(vec![tmp.path().to_path_buf()], Some(50));
        assert!(watcher.stop().await.is_ok());
    }

    #[tokio::test]
    async fn file_write_triggers_debounced_change_callback() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        let mut watcher = Watcher::new(vec![root.clone()], Some(80));

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);
        watcher.on_change(Arc::new(move |batch: ChangeBatch| {
            let seen_cb = Arc::clone(&seen_cb);
            Box::pin(async move {
                seen_cb.fetch_add(batch.ordered.len(), Ordering::SeqCst);
                Ok(())
            })
        }));

        watcher.start().await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        std::fs::write(root.join("new.txt"), b"hello").unwrap();

        tokio::time::sleep(StdDuration::from_millis(400)).await;
        watcher.stop().await.unwrap();

        assert!(seen.load(Ordering::SeqCst) > 0);
        assert!(watcher.stats().total_events > 0);
    }

    #[tokio::test]
    async fn events_buffered_during_a_long_running_callback_are_flushed_once_it_finishes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        let mut watcher = Watcher::new(vec![root.clone()], Some(60));

        let invocations = Arc::new(AtomicUsize::new(0));
        let invocations_cb = Arc::clone(&invocations);
        watcher.on_change(Arc::new(move |batch: ChangeBatch| {
            let invocations_cb = Arc::clone(&invocations_cb);
            Box::pin(async move {
                // The first invocation is slow enough that a second burst of
                // events arrives, is debounced, and then busy-skips because
                // this invocation still holds the semaphore permit.
                if invocations_cb.load(Ordering::SeqCst) == 0 {
                    tokio::time::sleep(StdDuration::from_millis(250)).await;
                }
                invocations_cb.fetch_add(1, Ordering::SeqCst);
                let _ = batch;
                Ok(())
            })
        }));

        watcher.start().await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        std::fs::write(root.join("first.txt"), b"one").unwrap();

        // Fires while the first callback is still sleeping; the resulting
        // flush attempt busy-skips and leaves this event buffered.
        tokio::time::sleep(StdDuration::from_millis(120)).await;
        std::fs::write(root.join("second.txt"), b"two").unwrap();

        // No further filesystem events after this. The buffered "second.txt"
        // event must still be flushed once the first callback's finally path
        // reschedules the timer, not left stranded.
        tokio::time::sleep(StdDuration::from_millis(600)).await;
        watcher.stop().await.unwrap();

        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }
}
