#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tollgate_lib::sink::{EventSink, JsonFileSink, NoopSink};
use tollgate_lib::{load_from_path, proxy, Config, ProxyContext};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Forwarding HTTP/HTTPS proxy with admission control")]
struct Cli {
    /// Port to listen on
    port: u16,

    /// Pass the literal word `Log` to persist per-request events and the
    /// shutdown summary under the log directory
    #[arg(value_parser = ["Log"])]
    log: Option<String>,

    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(path) => match load_from_path(&path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(%err, "failed to load configuration");
                std::process::exit(2);
            }
        },
        None => Config::default(),
    };
    config.port = cli.port;
    if cli.log.is_some() {
        config.logging_enabled = true;
    }

    let sink: Arc<dyn EventSink> = if config.logging_enabled {
        match JsonFileSink::new(&config.log_root) {
            Ok(sink) => Arc::new(sink),
            Err(err) => {
                error!(%err, "failed to prepare log directory");
                std::process::exit(2);
            }
        }
    } else {
        Arc::new(NoopSink)
    };

    let ctx = match ProxyContext::new(config, sink) {
        Ok(ctx) => Arc::new(ctx),
        Err(err) => {
            error!(%err, "invalid configuration");
            std::process::exit(2);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    if let Err(err) = proxy::run(ctx, shutdown_rx).await {
        error!(%err, "proxy exited with error");
        std::process::exit(2);
    }

    // An interrupt-driven shutdown still exits non-zero.
    std::process::exit(1);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
