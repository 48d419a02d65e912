//! One-shot build command.

use std::time::Instant;

use anyhow::{Context, Result};
use sitepipe_tasks::{Pipeline, TaskRegistry, BUILD};

use crate::config::Config;

/// Run the build command: clean, then every transform.
pub async fn run(config: &Config) -> Result<()> {
    tracing::info!("Building site...");
    let start = Instant::now();

    let pipeline = Pipeline::new(config.pipeline_config()?).context("Invalid pipeline settings")?;
    let registry = TaskRegistry::standard();

    let reports = registry
        .run(BUILD, &pipeline)
        .await
        .context("Build failed")?;

    let files: usize = reports.iter().map(|r| r.files_written).sum();
    tracing::info!(
        "Built {} files in {}ms",
        files,
        start.elapsed().as_millis()
    );
    tracing::info!("Output: {}", pipeline.paths().build_root().display());

    Ok(())
}
