//! sitepipe CLI - asset pipeline and live-reload dev server for static sites.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

use commands::dev::DevOptions;
use config::Config;

#[derive(Parser)]
#[command(name = "sitepipe")]
#[command(about = "Asset pipeline and live-reload dev server for static sites")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to sitepipe.toml config file
    #[arg(short, long, default_value = "sitepipe.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the build root and run every transform
    Build,

    /// Build, then serve with live reload and rebuild on change (default)
    Dev {
        /// Port to listen on (defaults to config or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Run one named task and its dependencies
    Run {
        /// Task name, e.g. styles or build
        task: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    fmt().with_env_filter(filter).with_target(false).init();

    let config = Config::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Dev {
        port: None,
        host: None,
        no_open: false,
    }) {
        Commands::Build => {
            commands::build::run(&config).await?;
        }
        Commands::Dev {
            port,
            host,
            no_open,
        } => {
            let options = DevOptions {
                port,
                host,
                open: !no_open,
            };
            commands::dev::run(&config, options).await?;
        }
        Commands::Run { task } => {
            commands::run::run(&config, &task).await?;
        }
    }

    Ok(())
}
