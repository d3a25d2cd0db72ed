//! Event Source
//!
//! Watches the drop directory and feeds raw events (plus a periodic tick)
//! into a channel consumed by the settle detector.

mod events;

pub use events::{translate, RawEvent};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::common::paths::is_package_file;

/// Capacity of the raw event channel
pub const EVENT_QUEUE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to watch directory: {0}")]
    Notify(#[from] notify::Error),

    #[error("Failed to scan directory: {0}")]
    Io(#[from] std::io::Error),
}

pub struct EventSource {
    dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
    tick: Option<JoinHandle<()>>,
}

impl EventSource {
    /// Start watching `dir`. Packages already present are reported as
    /// created so a restart reconciles the directory from scratch.
    pub async fn start(
        dir: &Path,
        tx: mpsc::Sender<RawEvent>,
        tick_interval: Duration,
    ) -> Result<Self, WatchError> {
        info!("Starting package watcher on {:?}", dir);

        let watch_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) => {
                    for raw in translate(&event) {
                        if watch_tx.blocking_send(raw).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!("Watch error: {}", e),
            }
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let existing = scan(dir)?;
        info!("Found {} existing packages", existing.len());
        for path in existing {
            if tx.send(RawEvent::Created(path)).await.is_err() {
                break;
            }
        }

        let tick = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(RawEvent::Tick).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            dir: dir.to_path_buf(),
            watcher: Some(watcher),
            tick: Some(tick),
        })
    }

    /// Stop the tick task, then the watch. Each step is bounded by `timeout`.
    pub async fn stop(&mut self, timeout: Duration) {
        if let Some(tick) = self.tick.take() {
            tick.abort();
            if tokio::time::timeout(timeout, tick).await.is_err() {
                warn!("Tick task did not stop within {:?}", timeout);
            }
        }

        if let Some(watcher) = self.watcher.take() {
            let dir = self.dir.clone();
            let stopped = tokio::task::spawn_blocking(move || {
                let mut watcher = watcher;
                if let Err(e) = watcher.unwatch(&dir) {
                    debug!("Unwatch of {:?} failed: {}", dir, e);
                }
            });
            if tokio::time::timeout(timeout, stopped).await.is_err() {
                warn!("Watcher did not stop within {:?}", timeout);
            }
        }

        info!("Package watcher on {:?} stopped", self.dir);
    }
}

/// Package files directly inside `dir`, sorted by name
fn scan(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_package_file(&path) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}
