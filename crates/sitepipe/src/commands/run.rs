//! Run a single named task.

use anyhow::{Context, Result};
use sitepipe_tasks::{Pipeline, TaskRegistry};

use crate::config::Config;

/// Run `task` and its dependencies.
pub async fn run(config: &Config, task: &str) -> Result<()> {
    let pipeline = Pipeline::new(config.pipeline_config()?).context("Invalid pipeline settings")?;
    let registry = TaskRegistry::standard();

    if registry.get(task).is_none() {
        anyhow::bail!(
            "Unknown task '{}'. Available tasks: {}",
            task,
            registry.names().join(", ")
        );
    }

    for report in registry
        .run(task, &pipeline)
        .await
        .with_context(|| format!("Task '{}' failed", task))?
    {
        tracing::info!(
            "{}: {} files in {}ms",
            report.task,
            report.files_written,
            report.duration_ms
        );
    }

    Ok(())
}
