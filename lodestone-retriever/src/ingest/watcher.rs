//! Live filesystem watching for document directories.
//!
//! Each watched root gets its own notify watcher; all of them feed one
//! event channel consumed by a single listener task. Raw events are
//! filtered early (extension allow-list, dotted path components, depth
//! bound), then debounced per path so editor write bursts collapse into
//! one action. When a debounced event fires, the path's current existence
//! decides what happens: an existing file waits for its size to stop
//! changing and is reprocessed, a missing file is deleted from the store.
//! Per-file failures are logged and never stop the watch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::ingest::debounce::KeyedDebouncer;
use crate::ingest::pipeline::IngestionPipeline;

#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Process files already present when a watch starts. When false,
    /// only future changes are picked up
    pub initial_scan: bool,
    /// Lowercase extensions (no dot) worth reacting to
    pub allowed_extensions: Vec<String>,
    /// Maximum directory depth below a watched root
    pub max_depth: usize,
    /// Quiet period before a path's events are acted on
    pub debounce: Duration,
    /// Interval between file size polls while waiting for write stability
    pub stability_poll: Duration,
    /// Give up waiting for stability after this many polls
    pub stability_max_checks: usize,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            initial_scan: true,
            allowed_extensions: vec![
                "txt".into(),
                "log".into(),
                "md".into(),
                "markdown".into(),
                "json".into(),
            ],
            max_depth: 16,
            debounce: Duration::from_millis(500),
            stability_poll: Duration::from_millis(100),
            stability_max_checks: 20,
        }
    }
}

/// Decide whether a path below `root` is worth reacting to.
///
/// Rejects paths with any dot-prefixed component (hidden files and
/// directories like `.git`), paths deeper than the depth bound, and
/// extensions outside the allow-list.
pub fn should_watch(path: &Path, root: &Path, options: &WatcherOptions) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);

    let mut depth = 0usize;
    for component in relative.components() {
        if let std::path::Component::Normal(name) = component {
            if name.to_string_lossy().starts_with('.') {
                return false;
            }
            depth += 1;
        }
    }
    if depth > options.max_depth {
        return false;
    }

    match crate::ingest::loader::extension_of(path) {
        Some(ext) => options.allowed_extensions.iter().any(|a| *a == ext),
        None => false,
    }
}

/// Watches document roots and keeps the store in sync with them.
///
/// Multiple roots can be watched at once through repeated
/// [`watch_directory`](Self::watch_directory) calls; they share the event
/// channel, the listener, and the debouncer.
pub struct DirectoryWatcher {
    pipeline: Arc<IngestionPipeline>,
    options: WatcherOptions,
    events_tx: mpsc::Sender<PathBuf>,
    listener: tokio::task::JoinHandle<()>,
    debouncer: Arc<KeyedDebouncer<PathBuf>>,
    watches: Mutex<HashMap<PathBuf, RecommendedWatcher>>,
}

impl DirectoryWatcher {
    pub fn new(pipeline: Arc<IngestionPipeline>, options: WatcherOptions) -> Self {
        let (events_tx, events_rx) = mpsc::channel(128);
        let debouncer = Arc::new(KeyedDebouncer::new(options.debounce));

        let listener = tokio::spawn(Self::listen(
            events_rx,
            Arc::clone(&pipeline),
            Arc::clone(&debouncer),
            options.clone(),
        ));

        Self {
            pipeline,
            options,
            events_tx,
            listener,
            debouncer,
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching a root: scan existing files (when the options ask
    /// for it), then subscribe to change events. Watching an
    /// already-watched root replaces its subscription. Additive - other
    /// roots keep their watches.
    pub async fn watch_directory(&self, root: &Path) -> Result<()> {
        if self.options.initial_scan {
            self.scan_existing(root).await?;
        }

        let local_tx = self.events_tx.clone();
        let root_owned = root.to_path_buf();
        let options = self.options.clone();

        // The callback runs on notify's thread, so blocking_send is fine
        // there and only there
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    for path in event.paths {
                        if should_watch(&path, &root_owned, &options)
                            && local_tx.blocking_send(path).is_err()
                        {
                            warn!("event listener is gone, dropping file event");
                        }
                    }
                }
                Err(e) => warn!("watch error: {e}"),
            }
        })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        info!(root = %root.display(), "watching directory");

        if let Ok(mut watches) = self.watches.lock() {
            watches.insert(root.to_path_buf(), watcher);
        }
        Ok(())
    }

    /// Enqueue every matching file already present under the root.
    async fn scan_existing(&self, root: &Path) -> Result<()> {
        let walker = ignore::WalkBuilder::new(root)
            .max_depth(Some(self.options.max_depth))
            .build();

        for entry in walker {
            let entry = entry.map_err(|e| crate::error::RetrieverError::Io {
                source: std::io::Error::other(e),
            })?;
            let path = entry.into_path();
            if path.is_file() && should_watch(&path, root, &self.options) {
                self.events_tx
                    .send(path)
                    .await
                    .map_err(|_| crate::error::RetrieverError::InitializationFailed {
                        message: "watch event listener is not running".into(),
                    })?;
            }
        }
        Ok(())
    }

    async fn listen(
        events_rx: mpsc::Receiver<PathBuf>,
        pipeline: Arc<IngestionPipeline>,
        debouncer: Arc<KeyedDebouncer<PathBuf>>,
        options: WatcherOptions,
    ) {
        let pipeline_ref = &pipeline;
        let debouncer_ref = &debouncer;
        let options_ref = &options;
        tokio_stream::wrappers::ReceiverStream::new(events_rx)
            .for_each_concurrent(16, |path| async move {
                let pipeline = Arc::clone(pipeline_ref);
                let options = options_ref.clone();
                debouncer_ref.debounce(path.clone(), async move {
                    Self::apply_event(&pipeline, &path, &options).await;
                });
            })
            .await;
    }

    /// Act on a settled event: reprocess a present file, delete a missing
    /// one. Failures are logged, never propagated.
    async fn apply_event(pipeline: &IngestionPipeline, path: &Path, options: &WatcherOptions) {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            wait_for_stable_size(path, options).await;
            if let Err(e) = pipeline.process_document(path).await {
                error!("failed to process {}: {e}", path.display());
            }
        } else if let Err(e) = pipeline.delete_document(path).await {
            error!("failed to delete {}: {e}", path.display());
        }
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        self.watches
            .lock()
            .map(|watches| watches.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every watch and cancel pending debounced actions.
    pub fn stop_watching(&self) {
        if let Ok(mut watches) = self.watches.lock() {
            let count = watches.len();
            watches.clear();
            if count > 0 {
                debug!(roots = count, "stopped watching");
            }
        }
        self.debouncer.cancel_all();
    }

    /// Access to the pipeline driving this watcher.
    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        &self.pipeline
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Poll the file size until two consecutive reads agree, bounded by the
/// configured number of checks. A file that keeps growing past the bound
/// is processed anyway; the next change event will catch the rest.
async fn wait_for_stable_size(path: &Path, options: &WatcherOptions) {
    let mut previous: Option<u64> = None;
    for _ in 0..options.stability_max_checks {
        let size = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(_) => return,
        };
        if previous == Some(size) {
            return;
        }
        previous = Some(size);
        tokio::time::sleep(options.stability_poll).await;
    }
    debug!("file never settled, processing anyway: {}", path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options_with(extensions: &[&str]) -> WatcherOptions {
        WatcherOptions {
            allowed_extensions: extensions.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_should_watch_extension_allow_list() {
        let root = Path::new("/docs");
        let options = options_with(&["txt", "md"]);

        assert!(should_watch(Path::new("/docs/a.txt"), root, &options));
        assert!(should_watch(Path::new("/docs/sub/b.md"), root, &options));
        assert!(!should_watch(Path::new("/docs/c.json"), root, &options));
        assert!(!should_watch(Path::new("/docs/no_extension"), root, &options));
    }

    #[test]
    fn test_should_watch_rejects_dotted_components() {
        let root = Path::new("/docs");
        let options = options_with(&["txt"]);

        assert!(!should_watch(Path::new("/docs/.hidden.txt"), root, &options));
        assert!(!should_watch(
            Path::new("/docs/.git/objects/x.txt"),
            root,
            &options
        ));
        assert!(should_watch(
            Path::new("/docs/visible/file.txt"),
            root,
            &options
        ));
    }

    #[test]
    fn test_should_watch_depth_bound() {
        let root = Path::new("/docs");
        let mut options = options_with(&["txt"]);
        options.max_depth = 2;

        assert!(should_watch(Path::new("/docs/a/b.txt"), root, &options));
        assert!(!should_watch(Path::new("/docs/a/b/c.txt"), root, &options));
    }

    #[tokio::test]
    async fn test_wait_for_stable_size_returns_on_stable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stable.txt");
        std::fs::write(&path, "settled content").unwrap();

        let options = WatcherOptions {
            stability_poll: Duration::from_millis(5),
            stability_max_checks: 5,
            ..Default::default()
        };
        // Completes well within the check budget for an untouched file
        wait_for_stable_size(&path, &options).await;
    }

    #[tokio::test]
    async fn test_wait_for_stable_size_handles_missing_file() {
        let options = WatcherOptions::default();
        wait_for_stable_size(Path::new("/nope/missing.txt"), &options).await;
    }
}
