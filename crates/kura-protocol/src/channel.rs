//! Sync Channel
//!
//! One end of a duplex, ordered message channel over any byte stream.
//! Messages are written as newline-delimited JSON by a writer task and
//! decoded into a local queue by a reader task, so `send` and `drain` never
//! block the caller.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::message::{CatalogUpdate, IngestNotice};

/// Buffer size of the in-process duplex pipe
const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("peer is gone")]
    PeerGone,
}

/// Endpoint held by the ingestion side
pub type IngestEndpoint = Endpoint<CatalogUpdate, IngestNotice>;

/// Endpoint held by the catalog side
pub type CatalogEndpoint = Endpoint<IngestNotice, CatalogUpdate>;

/// Sends `Tx` messages, receives `Rx` messages
pub struct Endpoint<Tx, Rx> {
    outbound: mpsc::UnboundedSender<Tx>,
    inbound: Mutex<mpsc::UnboundedReceiver<Rx>>,
    alive: Arc<AtomicBool>,
    _marker: PhantomData<fn(Tx) -> Rx>,
}

impl<Tx, Rx> Endpoint<Tx, Rx>
where
    Tx: Serialize + Send + 'static,
    Rx: DeserializeOwned + Send + 'static,
{
    /// Attach an endpoint to a byte stream. Must be called inside a Tokio runtime.
    pub fn attach<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let alive = Arc::new(AtomicBool::new(true));
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(writer, out_rx, Arc::clone(&alive)));
        tokio::spawn(read_loop(BufReader::new(reader), in_tx, Arc::clone(&alive)));

        Self {
            outbound: out_tx,
            inbound: Mutex::new(in_rx),
            alive,
            _marker: PhantomData,
        }
    }

    /// Queue a message for the peer
    pub fn send(&self, message: Tx) -> Result<(), ChannelError> {
        if !self.is_alive() {
            return Err(ChannelError::PeerGone);
        }
        self.outbound.send(message).map_err(|_| {
            self.alive.store(false, Ordering::SeqCst);
            ChannelError::PeerGone
        })
    }

    /// Take every message that has arrived so far without waiting.
    ///
    /// Messages that arrived before the peer went away are still returned.
    pub fn drain(&self) -> Vec<Rx> {
        let mut inbound = match self.inbound.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut messages = Vec::new();
        loop {
            match inbound.try_recv() {
                Ok(message) => messages.push(message),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.alive.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
        messages
    }

    /// False once either direction has hit EOF or a write failure
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Create a connected in-process pair. Must be called inside a Tokio runtime.
pub fn pair() -> (IngestEndpoint, CatalogEndpoint) {
    let (ingest_side, catalog_side) = tokio::io::duplex(PIPE_CAPACITY);
    (Endpoint::attach(ingest_side), Endpoint::attach(catalog_side))
}

async fn write_loop<W, Tx>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<Tx>, alive: Arc<AtomicBool>)
where
    W: AsyncWrite + Unpin,
    Tx: Serialize,
{
    while let Some(message) = outbound.recv().await {
        let payload = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize sync message: {}", e);
                continue;
            }
        };

        let written = async {
            writer.write_all(payload.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            debug!("Sync channel write failed, peer gone: {}", e);
            alive.store(false, Ordering::SeqCst);
            return;
        }
    }

    // Every sender dropped: close our half so the peer reads EOF
    let _ = writer.shutdown().await;
}

async fn read_loop<R, Rx>(mut reader: BufReader<R>, inbound: mpsc::UnboundedSender<Rx>, alive: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
    Rx: DeserializeOwned,
{
    let mut line = String::new();

    loop {
        line.clear();

        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Sync channel closed by peer");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Rx>(trimmed) {
                    Ok(message) => {
                        if inbound.send(message).is_err() {
                            // Endpoint dropped locally
                            break;
                        }
                    }
                    Err(e) => warn!("Skipping malformed sync message: {}", e),
                }
            }
            Err(e) => {
                debug!("Sync channel read failed: {}", e);
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    async fn drain_until<Tx, Rx>(endpoint: &Endpoint<Tx, Rx>, want: usize) -> Vec<Rx>
    where
        Tx: Serialize + Send + 'static,
        Rx: DeserializeOwned + Send + 'static,
    {
        let mut got = Vec::new();
        for _ in 0..200 {
            got.extend(endpoint.drain());
            if got.len() >= want {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        got
    }

    #[tokio::test]
    async fn test_pair_preserves_order() {
        let (ingest, catalog) = pair();

        for name in ["a", "b", "c"] {
            ingest
                .send(CatalogUpdate::ContentRemoval {
                    path: None,
                    original_path: PathBuf::from(name),
                })
                .unwrap();
        }

        let received = drain_until(&catalog, 3).await;
        let order: Vec<PathBuf> = received
            .into_iter()
            .map(|m| match m {
                CatalogUpdate::ContentRemoval { original_path, .. } => original_path,
                other => panic!("unexpected message {:?}", other),
            })
            .collect();
        assert_eq!(order, vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]);
    }

    #[tokio::test]
    async fn test_delete_notices_flow_back() {
        let (ingest, catalog) = pair();

        catalog
            .send(IngestNotice::DeletePath {
                path: PathBuf::from("/srv/old.zip"),
            })
            .unwrap();

        let received = drain_until(&ingest, 1).await;
        assert_eq!(
            received,
            vec![IngestNotice::DeletePath {
                path: PathBuf::from("/srv/old.zip")
            }]
        );
    }

    #[tokio::test]
    async fn test_peer_drop_marks_endpoint_dead() {
        let (ingest, catalog) = pair();
        drop(catalog);

        for _ in 0..200 {
            ingest.drain();
            if !ingest.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!ingest.is_alive());
        let result = ingest.send(CatalogUpdate::ContentRemoval {
            path: None,
            original_path: PathBuf::from("x"),
        });
        assert!(matches!(result, Err(ChannelError::PeerGone)));
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let (raw, catalog_side) = tokio::io::duplex(1024);
        let catalog: CatalogEndpoint = Endpoint::attach(catalog_side);
        let (_reader, mut writer) = tokio::io::split(raw);

        writer.write_all(b"this is not json\n").await.unwrap();
        writer
            .write_all(b"{\"type\":\"content_removal\",\"original_path\":\"/x\"}\n")
            .await
            .unwrap();
        writer.flush().await.unwrap();

        let received = drain_until(&catalog, 1).await;
        assert_eq!(received.len(), 1);
        assert!(catalog.is_alive());
    }
}
