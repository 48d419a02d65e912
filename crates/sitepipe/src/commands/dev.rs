//! Development mode: initial build, then server and watcher.

use std::sync::Arc;

use anyhow::{Context, Result};
use sitepipe_server::{DevServer, DevServerConfig, LiveReloadHub};
use sitepipe_tasks::{Pipeline, ReloadNotifier, TaskRegistry, TRANSFORMS};

use crate::config::Config;

/// Server overrides from the command line.
#[derive(Debug, Default)]
pub struct DevOptions {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub open: bool,
}

/// Run the dev server until interrupted.
pub async fn run(config: &Config, options: DevOptions) -> Result<()> {
    let hub = LiveReloadHub::new();
    let notifier: Arc<dyn ReloadNotifier> = Arc::new(hub.clone());

    let pipeline = Pipeline::new(config.pipeline_config()?)
        .context("Invalid pipeline settings")?
        .with_notifier(Arc::clone(&notifier));
    let pipeline = Arc::new(pipeline);

    // Initial failures are reported but do not stop the session.
    if let Err(e) = TaskRegistry::standard().run(TRANSFORMS, &pipeline).await {
        tracing::error!("Initial build failed: {}", e);
    }

    let server_config = DevServerConfig {
        root: pipeline.paths().build_root(),
        port: options.port.unwrap_or(config.file.server.port),
        host: options.host.unwrap_or_else(|| config.file.server.host.clone()),
        open: options.open && config.file.server.open,
    };
    let server = DevServer::new(server_config, hub);

    tokio::select! {
        result = server.start() => result?,
        result = sitepipe_server::watch(Arc::clone(&pipeline), notifier) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
