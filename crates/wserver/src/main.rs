//! WServer
//!
//! Usage:
//!     wserver --bind tcp://0.0.0.0:8888 --database sqlite:gdb.sqlite3?mode=rwc

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use wserver::{Registry, WServer, WServerConfig};
use wserver_db::Gdb;
use wserver_logging::{init_logging, LogConfig};

#[derive(Parser, Debug)]
#[command(name = "wserver", about = "Weighing record server with core node propagation")]
struct Args {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// ZMQ bind address for RPC clients
    #[arg(long)]
    bind: Option<String>,

    /// GDB connection string
    #[arg(long, env = "WSERVER_DATABASE_URL")]
    database: Option<String>,

    /// Directory act photos are written to
    #[arg(long)]
    photos_dir: Option<PathBuf>,

    /// Debug output on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// File config (or defaults) with command-line values on top.
    fn into_config(self) -> Result<WServerConfig> {
        let mut config = match &self.config {
            Some(path) => WServerConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => WServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(database) = self.database {
            config.database_url = database;
        }
        if let Some(photos_dir) = self.photos_dir {
            config.photos_dir = photos_dir;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(LogConfig {
        app_name: "wserver",
        verbose: args.verbose,
        log_dir: None,
    })?;

    let config = args.into_config()?;

    tracing::info!("Starting WServer");
    tracing::info!("  Bind: {}", config.bind_addr);
    tracing::info!("  Database: {}", config.database_url);
    tracing::info!("  Photos: {}", config.photos_dir.display());
    tracing::info!("  Core port: {} ({:?} fan-out)", config.core.port, config.fanout_mode);

    let gdb = Gdb::connect(&config.database_url)
        .await
        .context("Failed to open GDB")?;
    let registry = Registry::from_config(&config, gdb.clone()).context("Failed to compose RPC methods")?;

    let server = WServer::bind(&config.bind_addr, registry).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    gdb.close().await;
    Ok(())
}
