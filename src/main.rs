use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use esm_filter::cli::{Cli, Command};
use esm_filter::config::AppConfig;
use esm_filter::server::Server;
use esm_filter::version;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// After the first signal, a second one or this much time forces exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command() {
        Command::Version => {
            println!("{}", version::version_line());
            Ok(())
        }
        Command::Config => {
            let app_config = AppConfig::load(cli.config_path())?;
            print!("{}", app_config.to_toml()?);
            Ok(())
        }
        Command::Run => run(cli.config_path()).await,
    }
}

async fn run(config_path: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = AppConfig::load(config_path)?;
    tracing::info!(
        version = version::VERSION,
        hostname = %app_config.server.hostname,
        interval_secs = app_config.aggregation.interval_secs,
        "starting {}",
        version::NAME
    );

    let handle = Server::open(&app_config).await?.start();

    shutdown_signal().await;
    tracing::info!("Received shutdown signal, closing");

    tokio::select! {
        result = handle.close() => result?,
        _ = shutdown_signal() => {
            tracing::warn!("Second signal received, exiting without flushing");
        }
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
            tracing::warn!("Shutdown grace period elapsed, exiting without flushing");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
