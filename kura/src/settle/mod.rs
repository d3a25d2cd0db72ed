//! Settle Detector
//!
//! Per-path debounce. Every raw event records the path's modification time
//! and schedules a check after the settle delay; a check only goes through
//! when nothing newer was recorded for its path in the meantime and the file
//! still looks the same on disk.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::watcher::RawEvent;

/// A change judged final
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledChange {
    /// Path the package used to live at (None for a fresh create)
    pub previous: Option<PathBuf>,
    /// Path the package lives at now (None for a deletion)
    pub current: Option<PathBuf>,
    pub settled_at: DateTime<Utc>,
}

/// Receiver of settled changes and ticks. Both calls run on the blocking pool.
pub trait SettleHandler: Send + Sync + 'static {
    fn settled(&self, change: SettledChange);

    fn drain(&self);
}

struct Inner {
    handler: Arc<dyn SettleHandler>,
    pending: Mutex<HashMap<PathBuf, SystemTime>>,
    delay_ms: AtomicU64,
    permits: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
}

pub struct SettleDetector {
    inner: Arc<Inner>,
    tasks: Mutex<JoinSet<()>>,
}

impl SettleDetector {
    pub fn new(
        handler: Arc<dyn SettleHandler>,
        delay: Duration,
        workers: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                handler,
                pending: Mutex::new(HashMap::new()),
                delay_ms: AtomicU64::new(delay.as_millis() as u64),
                permits: Arc::new(Semaphore::new(workers.max(1))),
                shutdown,
            }),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay()
    }

    /// Change the settle delay for checks scheduled from now on
    pub fn set_delay(&self, delay: Duration) {
        self.inner.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        info!("Settle delay set to {:?}", delay);
    }

    /// Record a raw event and schedule its check (or drain, for ticks)
    pub fn observe(&self, event: RawEvent) {
        if self.inner.is_shutting_down() {
            return;
        }

        let (key, recorded, previous, current) = match event {
            RawEvent::Tick => {
                let inner = Arc::clone(&self.inner);
                self.spawn(async move { inner.drain().await });
                return;
            }
            RawEvent::Created(path) => match modified_time(&path) {
                Some(ts) => (path.clone(), ts, None, Some(path)),
                None => return,
            },
            RawEvent::Modified(path) => match modified_time(&path) {
                Some(ts) => (path.clone(), ts, Some(path.clone()), Some(path)),
                None => return,
            },
            RawEvent::Moved { from, to } => match modified_time(&to) {
                Some(ts) => (to.clone(), ts, Some(from), Some(to)),
                None => return,
            },
            RawEvent::Deleted(path) => (path.clone(), SystemTime::now(), Some(path), None),
        };

        debug!("Recorded {:?} at {:?}", key, recorded);
        self.inner.pending().insert(key.clone(), recorded);

        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            inner.check(key, recorded, previous, current).await;
        });
    }

    /// Feed events from `rx` until the sender side closes or shutdown is signalled
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<RawEvent>) {
        let mut shutdown = self.inner.shutdown.clone();
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.observe(event),
                    None => break,
                },
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }
        debug!("Settle dispatch stopped");
    }

    /// Number of checks and drains not yet finished
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.tasks();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Wait for in-flight work up to `timeout`, then abort the rest.
    ///
    /// Call after the shutdown flag is set so waiting checks bail out.
    pub async fn shutdown(&self, timeout: Duration) {
        let mut tasks = std::mem::take(&mut *self.tasks());
        if tasks.is_empty() {
            return;
        }

        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    if !e.is_cancelled() {
                        error!("Settle task failed: {}", e);
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Aborting {} settle tasks still running after {:?}", tasks.len(), timeout);
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks();
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                error!("Settle task failed: {}", e);
            }
        }
        tasks.spawn(task);
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Inner {
    fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::SeqCst))
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<PathBuf, SystemTime>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn check(
        &self,
        key: PathBuf,
        recorded: SystemTime,
        previous: Option<PathBuf>,
        current: Option<PathBuf>,
    ) {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(self.delay()) => {}
            _ = shutdown.wait_for(|stop| *stop) => return,
        }

        {
            let mut pending = self.pending();
            match pending.get(&key) {
                Some(latest) if *latest == recorded => {}
                _ => {
                    debug!("Superseded check for {:?}", key);
                    return;
                }
            }
            pending.remove(&key);
        }

        if let Some(path) = &current {
            match modified_time(path) {
                Some(now) if now == recorded => {}
                Some(_) => {
                    debug!("{:?} changed again, waiting for its next event", path);
                    return;
                }
                None => {
                    debug!("{:?} vanished before it settled", path);
                    return;
                }
            }
        }

        let Some(_permit) = self.acquire().await else {
            return;
        };
        if self.is_shutting_down() {
            return;
        }

        let change = SettledChange {
            previous,
            current,
            settled_at: DateTime::<Utc>::from(recorded),
        };
        debug!("Settled {:?}", change);

        let handler = Arc::clone(&self.handler);
        if let Err(e) = tokio::task::spawn_blocking(move || handler.settled(change)).await {
            error!("Ingestion of {:?} failed: {}", key, e);
        }
    }

    async fn drain(&self) {
        let Some(_permit) = self.acquire().await else {
            return;
        };

        let handler = Arc::clone(&self.handler);
        if let Err(e) = tokio::task::spawn_blocking(move || handler.drain()).await {
            error!("Delete drain failed: {}", e);
        }
    }

    /// A worker slot, or None once shutdown is signalled
    async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
            _ = shutdown.wait_for(|stop| *stop) => None,
        }
    }
}

fn modified_time(path: &std::path::Path) -> Option<SystemTime> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.modified().ok(),
        Ok(_) => None,
        Err(e) => {
            debug!("Cannot stat {:?}: {}", path, e);
            None
        }
    }
}
