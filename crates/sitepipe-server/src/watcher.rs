//! File watching and per-category rebuilds.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

use sitepipe_tasks::{Category, Pipeline, ReloadKind, ReloadNotifier};

use crate::server::ServerError;

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A change to one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// File watcher for detecting changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create a new file watcher for the given directories.
    ///
    /// Missing directories are skipped. Returns the watcher and a channel to
    /// receive events; events stop when the watcher is dropped.
    pub fn new(
        paths: &[PathBuf],
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(std::io::Error::other)?;
                tracing::debug!("Watching {}", path.display());
            } else {
                tracing::debug!("Not watching missing {}", path.display());
            }
        }

        std::thread::spawn(move || {
            while let Ok(event) = sync_rx.recv() {
                let Some(kind) = classify_event(&event.kind) else {
                    continue;
                };
                for path in event.paths {
                    if async_tx.blocking_send(WatchEvent { path, kind }).is_err() {
                        return;
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

/// Classify a notify event kind; access events are ignored.
fn classify_event(kind: &notify::EventKind) -> Option<ChangeKind> {
    use notify::EventKind;

    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// One worker per category; reruns of a category never overlap.
///
/// Each worker has a single-slot queue, so changes that arrive while a run is
/// in progress collapse into one follow-up run.
pub struct CategoryWorkers {
    triggers: HashMap<Category, async_mpsc::Sender<()>>,
}

impl CategoryWorkers {
    /// Spawn a worker per category that calls `run` for each queued trigger.
    pub fn spawn<F, Fut>(run: F) -> Self
    where
        F: Fn(Category) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let run = Arc::new(run);
        let mut triggers = HashMap::new();

        for category in Category::ALL {
            let (tx, mut rx) = async_mpsc::channel::<()>(1);
            let run = Arc::clone(&run);
            tokio::spawn(async move {
                while rx.recv().await.is_some() {
                    run(category).await;
                }
            });
            triggers.insert(category, tx);
        }

        Self { triggers }
    }

    /// Queue a run unless one is already queued.
    pub fn trigger(&self, category: Category) {
        if let Some(tx) = self.triggers.get(&category) {
            if tx.try_send(()).is_err() {
                tracing::debug!("Rerun of '{}' already queued", category);
            }
        }
    }
}

/// Run a category's transform, then notify unless the task already did.
async fn rebuild(pipeline: &Pipeline, notifier: &dyn ReloadNotifier, category: Category) {
    match pipeline.transform(category).await {
        Ok(report) => {
            tracing::info!(
                "Rebuilt '{}' ({} files) in {}ms",
                category,
                report.files_written,
                report.duration_ms
            );
            if !category.notifies_on_completion() {
                notifier.notify(ReloadKind::FullReload);
            }
        }
        Err(e) => tracing::error!("Rebuilding '{}' failed: {}", category, e),
    }
}

/// Watch every category's sources and rebuild on change. Runs until the
/// watcher channel closes.
pub async fn watch(
    pipeline: Arc<Pipeline>,
    notifier: Arc<dyn ReloadNotifier>,
) -> Result<(), ServerError> {
    let roots = pipeline.paths().watch_roots();
    let (watcher, mut rx) =
        FileWatcher::new(&roots).map_err(|e| ServerError::WatchError(e.to_string()))?;

    let workers = {
        let pipeline = Arc::clone(&pipeline);
        CategoryWorkers::spawn(move |category| {
            let pipeline = Arc::clone(&pipeline);
            let notifier = Arc::clone(&notifier);
            async move { rebuild(&pipeline, notifier.as_ref(), category).await }
        })
    };

    tracing::info!("Watching for changes");

    while let Some(event) = rx.recv().await {
        for category in pipeline.paths().categories_for(&event.path) {
            tracing::debug!(
                "{:?} {} -> '{}'",
                event.kind,
                event.path.display(),
                category
            );
            workers.trigger(category);
        }
    }

    // Keep watcher alive
    drop(watcher);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use sitepipe_tasks::{PathTable, PipelineConfig};
    use tempfile::tempdir;

    #[derive(Default)]
    struct Signals(Mutex<Vec<ReloadKind>>);

    impl ReloadNotifier for Signals {
        fn notify(&self, kind: ReloadKind) {
            self.0.lock().unwrap().push(kind);
        }
    }

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Rebuild one category and return every signal sent along the way.
    async fn rebuild_signals(root: &Path, category: Category) -> Vec<ReloadKind> {
        let signals = Arc::new(Signals::default());
        let config = PipelineConfig::new(PathTable::standard(root).unwrap());
        let pipeline = Pipeline::new(config)
            .unwrap()
            .with_notifier(signals.clone());

        rebuild(&pipeline, signals.as_ref(), category).await;

        let recorded = signals.0.lock().unwrap().clone();
        recorded
    }

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let test_file = temp.path().join("main.scss");

        let (watcher, mut rx) = FileWatcher::new(&[temp.path().to_path_buf()]).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&test_file, "a { color: red; }").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        drop(watcher);

        assert!(event.is_ok(), "timeout waiting for file watch event");
        assert!(event.unwrap().is_some(), "channel should not be closed");
    }

    #[test]
    fn ignores_access_events() {
        use notify::event::{AccessKind, CreateKind};

        assert_eq!(
            classify_event(&notify::EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            classify_event(&notify::EventKind::Access(AccessKind::Any)),
            None
        );
    }

    #[tokio::test]
    async fn coalesces_triggers_while_running() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let workers = CategoryWorkers::spawn(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        });

        workers.trigger(Category::Styles);
        tokio::time::sleep(Duration::from_millis(50)).await;
        for _ in 0..5 {
            workers.trigger(Category::Styles);
        }
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn categories_run_independently() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let workers = CategoryWorkers::spawn(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        workers.trigger(Category::Styles);
        workers.trigger(Category::Scripts);
        workers.trigger(Category::Fonts);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn asset_reruns_request_full_reload() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/scripts/menu.js", "let open = false;");
        write(temp.path(), "src/assets/images/logo.svg", "<svg><rect/></svg>");
        write(temp.path(), "src/fonts/Inter.woff2", "font");

        for category in [Category::Scripts, Category::Images, Category::Fonts] {
            assert_eq!(
                rebuild_signals(temp.path(), category).await,
                vec![ReloadKind::FullReload],
                "{category}"
            );
        }
    }

    #[tokio::test]
    async fn styles_and_markup_signal_once() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/styles/main.scss", "a { color: red; }");
        write(temp.path(), "src/pages/home/index.html", "<p>Home</p>");

        assert_eq!(
            rebuild_signals(temp.path(), Category::Styles).await,
            vec![ReloadKind::StyleInject]
        );
        assert_eq!(
            rebuild_signals(temp.path(), Category::Markup).await,
            vec![ReloadKind::FullReload]
        );
    }

    #[tokio::test]
    async fn failed_rerun_sends_nothing() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/scripts/broken.js", "function (");

        assert!(rebuild_signals(temp.path(), Category::Scripts)
            .await
            .is_empty());
    }
}
