pub mod catalog;
pub mod common;
pub mod config;
pub mod ingest;
pub mod link;
pub mod query;
pub mod registry;
pub mod settle;
pub mod watcher;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use catalog::Catalog;
use config::{ConfigError, Settings};
use ingest::Ingestor;
use link::CatalogLink;
use registry::IdentifierRegistry;
use settle::SettleDetector;
use watcher::{EventSource, WatchError, EVENT_QUEUE};

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// The running ingestion service and the catalog it feeds
pub struct Kura {
    settings: Settings,
    registry: Arc<IdentifierRegistry>,
    link: Arc<CatalogLink>,
    detector: Arc<SettleDetector>,
    source: EventSource,
    dispatch: JoinHandle<()>,
    grace: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl Kura {
    pub async fn start(settings: Settings) -> Result<Self, StartError> {
        settings.validate()?;

        let registry = Arc::new(IdentifierRegistry::new(&settings.content_dir));
        info!("Identifier map holds {} names", registry.len());
        ingest::sweep_stale(&settings.content_dir, &registry);

        let (ingest_end, catalog_end) = kura_protocol::pair();
        let link = Arc::new(CatalogLink::new(Arc::new(Catalog::new()), catalog_end));
        let ingestor = Arc::new(Ingestor::new(
            settings.content_dir.clone(),
            Arc::clone(&registry),
            ingest_end,
        ));

        // Settle immediately until the startup scan is through
        let (shutdown, shutdown_rx) = watch::channel(false);
        let detector = Arc::new(SettleDetector::new(
            ingestor,
            Duration::ZERO,
            settings.workers,
            shutdown_rx.clone(),
        ));

        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let dispatch = tokio::spawn(Arc::clone(&detector).run(rx));
        let source = EventSource::start(&settings.source_dir, tx, settings.tick_interval).await?;

        let grace = {
            let detector = Arc::clone(&detector);
            let grace = settings.startup_grace;
            let delay = settings.settle_delay;
            let mut stop = shutdown_rx;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(grace) => detector.set_delay(delay),
                    _ = stop.wait_for(|stop| *stop) => {}
                }
            })
        };

        info!(
            "Watching {:?}, publishing to {:?}",
            settings.source_dir, settings.content_dir
        );

        Ok(Self {
            settings,
            registry,
            link,
            detector,
            source,
            dispatch,
            grace,
            shutdown,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<IdentifierRegistry> {
        &self.registry
    }

    /// Catalog access for the query side
    pub fn link(&self) -> Arc<CatalogLink> {
        Arc::clone(&self.link)
    }

    /// Signal, stop ticks, stop the watch, drain the pool, abort leftovers
    pub async fn shutdown(mut self) {
        info!("Shutting down");
        let timeout = self.settings.shutdown_timeout;

        let _ = self.shutdown.send(true);
        self.grace.abort();
        self.source.stop(timeout).await;

        if tokio::time::timeout(timeout, &mut self.dispatch).await.is_err() {
            warn!("Event dispatch did not stop within {:?}", timeout);
            self.dispatch.abort();
        }
        self.detector.shutdown(timeout).await;

        info!("Shutdown complete");
    }
}
