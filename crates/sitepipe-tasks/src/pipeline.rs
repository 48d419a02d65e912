//! Transform pipeline shared by every task.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use lightningcss::targets::Browsers;

use crate::paths::{Category, PathError, PathTable};
use crate::reload::{ReloadKind, ReloadNotifier};
use crate::{fonts, images, markup, scripts, styles};

/// Default browserslist queries for vendor prefixing.
pub const DEFAULT_BROWSERS: [&str; 2] = ["last 5 versions", "> 1%"];

/// Default language level for transpiled scripts.
pub const DEFAULT_SCRIPT_TARGET: &str = "es2015";

/// Configuration for the transform pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated source and destination layout
    pub paths: PathTable,

    /// Browserslist queries used for vendor prefixing
    pub browsers: Vec<String>,

    /// Script language level, e.g. `es2015`
    pub script_target: String,
}

impl PipelineConfig {
    /// Default settings for a path table.
    pub fn new(paths: PathTable) -> Self {
        Self {
            paths,
            browsers: DEFAULT_BROWSERS.iter().map(|q| q.to_string()).collect(),
            script_target: DEFAULT_SCRIPT_TARGET.to_string(),
        }
    }
}

/// Outcome of one task invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    /// Task name
    pub task: String,

    /// Number of files written
    pub files_written: usize,

    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl TaskReport {
    pub(crate) fn finish(task: &str, files_written: usize, start: Instant) -> Self {
        Self {
            task: task.to_string(),
            files_written,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Errors that fail a task invocation.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Script pipeline failed for {}: {message}", path.display())]
    Script { path: PathBuf, message: String },

    #[error("Invalid data file {}: {message}", path.display())]
    Data { path: PathBuf, message: String },

    #[error("Invalid browser targets: {0}")]
    Browsers(String),

    #[error("Invalid script target '{target}': {message}")]
    ScriptTarget { target: String, message: String },

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Dependency cycle through task '{0}'")]
    Cycle(String),

    #[error("Background task failed: {0}")]
    Join(String),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Attach a path to an I/O error.
pub(crate) fn io_error(path: &Path) -> impl FnOnce(io::Error) -> TaskError + '_ {
    move |source| TaskError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub(crate) fn join_error(err: tokio::task::JoinError) -> TaskError {
    TaskError::Join(err.to_string())
}

/// Write a file, creating parent directories first.
pub(crate) async fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_error(parent))?;
    }
    tokio::fs::write(path, contents).await.map_err(io_error(path))
}

/// Runs clean and the five transforms against one path table.
pub struct Pipeline {
    paths: PathTable,
    browsers: Option<Browsers>,
    script_target: String,
    notifier: Option<Arc<dyn ReloadNotifier>>,
}

impl Pipeline {
    /// Create a pipeline, resolving browser and script targets up front.
    pub fn new(config: PipelineConfig) -> Result<Self, TaskError> {
        let browsers = styles::resolve_browsers(&config.browsers)?;
        scripts::transform_options(&config.script_target)?;

        Ok(Self {
            paths: config.paths,
            browsers,
            script_target: config.script_target,
            notifier: None,
        })
    }

    /// Send live-reload signals from styles and markup to `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn ReloadNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn paths(&self) -> &PathTable {
        &self.paths
    }

    pub(crate) fn browsers(&self) -> Option<Browsers> {
        self.browsers
    }

    pub(crate) fn script_target(&self) -> &str {
        &self.script_target
    }

    pub(crate) fn notify(&self, kind: ReloadKind) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(kind);
        }
    }

    /// Delete the build root. A missing build root is not an error.
    pub fn clean(&self) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let build_root = self.paths.build_root();

        match std::fs::remove_dir_all(&build_root) {
            Ok(()) => tracing::debug!("Removed {}", build_root.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&build_root)(e)),
        }

        Ok(TaskReport::finish("clean", 0, start))
    }

    /// Run one category's transform.
    pub async fn transform(&self, category: Category) -> Result<TaskReport, TaskError> {
        match category {
            Category::Styles => styles::run(self).await,
            Category::Markup => markup::run(self).await,
            Category::Scripts => scripts::run(self).await,
            Category::Images => images::run(self).await,
            Category::Fonts => fonts::run(self).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    use super::*;

    /// Records every signal it receives.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub signals: Mutex<Vec<ReloadKind>>,
    }

    impl ReloadNotifier for RecordingNotifier {
        fn notify(&self, kind: ReloadKind) {
            self.signals.lock().unwrap().push(kind);
        }
    }

    pub fn pipeline(root: &Path) -> Pipeline {
        Pipeline::new(PipelineConfig::new(PathTable::standard(root).unwrap())).unwrap()
    }

    pub fn write(root: &Path, relative: &str, contents: impl AsRef<[u8]>) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn clean_removes_build_root() {
        let temp = tempdir().unwrap();
        write(temp.path(), "build/styles/main.css", "a{}");

        let report = pipeline(temp.path()).clean().unwrap();

        assert_eq!(report.task, "clean");
        assert!(!temp.path().join("build").exists());
    }

    #[test]
    fn clean_without_build_root_is_a_no_op() {
        let temp = tempdir().unwrap();
        assert!(pipeline(temp.path()).clean().is_ok());
    }

    #[tokio::test]
    async fn empty_sources_produce_no_output() {
        let temp = tempdir().unwrap();
        let pipeline = pipeline(temp.path());

        for category in Category::ALL {
            let report = pipeline.transform(category).await.unwrap();
            assert_eq!(report.files_written, 0, "{category} wrote files");
        }

        assert!(!temp.path().join("build").exists());
    }

    #[test]
    fn rejects_unknown_browser_queries() {
        let temp = tempdir().unwrap();
        let mut config = PipelineConfig::new(PathTable::standard(temp.path()).unwrap());
        config.browsers = vec!["not a real browser query".to_string()];

        assert!(matches!(
            Pipeline::new(config),
            Err(TaskError::Browsers(_))
        ));
    }

    #[test]
    fn rejects_unknown_script_target() {
        let temp = tempdir().unwrap();
        let mut config = PipelineConfig::new(PathTable::standard(temp.path()).unwrap());
        config.script_target = "es1999".to_string();

        assert!(matches!(
            Pipeline::new(config),
            Err(TaskError::ScriptTarget { .. })
        ));
    }
}
