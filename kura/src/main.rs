use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kura::config::Settings;
use kura::query::{serve_until, QueryHandler};
use kura::Kura;

/// Command-line flags; each one overrides its `KURA_*` variable
#[derive(Parser, Debug)]
#[command(name = "kura", version, about)]
struct Args {
    /// Directory watched for incoming packages
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Directory holding canonical packages and the identifier map
    #[arg(long)]
    content_dir: Option<PathBuf>,

    #[arg(long)]
    settle_delay_ms: Option<u64>,

    #[arg(long)]
    workers: Option<usize>,
}

impl Args {
    fn value_for(&self, key: &str) -> Option<String> {
        match key {
            "KURA_SOURCE_DIR" => self.source_dir.as_ref().map(|p| p.display().to_string()),
            "KURA_CONTENT_DIR" => self.content_dir.as_ref().map(|p| p.display().to_string()),
            "KURA_SETTLE_DELAY_MS" => self.settle_delay_ms.map(|ms| ms.to_string()),
            "KURA_WORKERS" => self.workers.map(|n| n.to_string()),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the query protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = Settings::from_lookup(|key| args.value_for(key).or_else(|| std::env::var(key).ok()))?;

    info!("Starting kura v{}", env!("CARGO_PKG_VERSION"));
    let kura = Kura::start(settings).await?;
    let handler = QueryHandler::new(kura.link());

    // Closing stdin ends queries only; ingestion runs until a signal
    if let Err(e) = serve_until(&handler, tokio::io::stdin(), tokio::io::stdout(), terminated()).await {
        error!("Query endpoint failed: {}", e);
        terminated().await;
    }

    kura.shutdown().await;
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
async fn terminated() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Interrupted"),
                    _ = term.recv() => info!("Terminated"),
                }
                return;
            }
            Err(e) => error!("Cannot listen for SIGTERM: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupted"),
        Err(e) => error!("Cannot listen for Ctrl-C: {}", e),
    }
}
