#![cfg(not(tarpaulin_include))]

use anyhow::Context;
use band_log::app;
use band_log::config::{Backend, Config, DEFAULT_CONFIG_FILE};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "Band Practice Log")]
#[command(about = "Web form and dashboard for band practice reports", long_about = None)]
struct Cli {
    /// Path of the TOML configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Address to listen on, overrides the config file
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Store backend (sheets, file or memory), overrides the config file
    #[arg(long, value_name = "BACKEND")]
    backend: Option<String>,
}

/// Main entry point for the web application
///
/// Reads the configuration, applies command line overrides and serves the
/// report form, dashboard and history pages until stopped.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::prelude::*;

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info,tower_http=debug".into()),
            )
            .init()
    }

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;

    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(backend) = cli.backend {
        config.store.backend = backend
            .parse::<Backend>()
            .map_err(anyhow::Error::msg)
            .context("Invalid --backend")?;
    }
    config.validate()?;

    app::run(config).await
}
