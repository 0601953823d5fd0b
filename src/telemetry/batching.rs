//! Background batching in front of a slow sink.

use super::{SelectionEvent, SelectionSink};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct BatchingConfig {
    /// Queue bound; events beyond it are dropped and counted.
    pub capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            batch_size: 50,
            flush_interval: Duration::from_secs(5),
        }
    }
}

impl BatchingConfig {
    pub fn with_capacity(mut self, n: usize) -> Self {
        self.capacity = n.max(1);
        self
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval.max(Duration::from_millis(1));
        self
    }
}

enum Command {
    Event(SelectionEvent),
    Flush(oneshot::Sender<()>),
}

/// Queues events and hands them to `inner` in batches.
///
/// - `record` never waits: a full queue drops the event and bumps [`dropped`](Self::dropped)
/// - A batch is written when it reaches `batch_size` or every `flush_interval`
/// - [`shutdown`](Self::shutdown) drains the queue before returning
///
/// Must be created inside a Tokio runtime.
pub struct BatchingSelectionSink {
    tx: mpsc::Sender<Command>,
    dropped: Arc<AtomicU64>,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BatchingSelectionSink {
    pub fn new(inner: Arc<dyn SelectionSink>, cfg: BatchingConfig) -> Self {
        let (tx, rx) = mpsc::channel(cfg.capacity.max(1));
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(rx, inner, cfg, token.clone()));
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            token,
            task: Mutex::new(Some(handle)),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Events queued but not yet handed to the inner sink's worker.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    fn closed() -> Error {
        Error::runtime_with_context(
            "selection batch worker has stopped",
            ErrorContext::new().with_source("batching_selection_sink"),
        )
    }
}

#[async_trait]
impl SelectionSink for BatchingSelectionSink {
    async fn record(&self, event: SelectionEvent) -> Result<()> {
        match self.tx.try_send(Command::Event(event)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(dropped = n, "selection queue full; event dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(Self::closed())
            }
        }
    }

    /// Waits until everything queued before this call has been written.
    async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack))
            .await
            .map_err(|_| Self::closed())?;
        done.await.map_err(|_| Self::closed())
    }

    /// Stop the worker after writing everything still queued.
    async fn shutdown(&self) -> Result<()> {
        self.token.cancel();
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "selection batch worker ended abnormally");
            }
        }
        Ok(())
    }
}

async fn run(
    mut rx: mpsc::Receiver<Command>,
    inner: Arc<dyn SelectionSink>,
    cfg: BatchingConfig,
    token: CancellationToken,
) {
    let mut buffer = Vec::with_capacity(cfg.batch_size);
    let mut ticker = tokio::time::interval(cfg.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            cmd = rx.recv() => match cmd {
                Some(Command::Event(e)) => {
                    buffer.push(e);
                    if buffer.len() >= cfg.batch_size {
                        write_batch(inner.as_ref(), &mut buffer).await;
                    }
                }
                Some(Command::Flush(ack)) => {
                    write_batch(inner.as_ref(), &mut buffer).await;
                    let _ = inner.flush().await;
                    let _ = ack.send(());
                }
                None => break,
            },
            _ = ticker.tick() => write_batch(inner.as_ref(), &mut buffer).await,
        }
    }

    rx.close();
    while let Ok(cmd) = rx.try_recv() {
        match cmd {
            Command::Event(e) => buffer.push(e),
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    write_batch(inner.as_ref(), &mut buffer).await;
    let _ = inner.flush().await;
}

async fn write_batch(inner: &dyn SelectionSink, buffer: &mut Vec<SelectionEvent>) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    let n = batch.len();
    if let Err(e) = inner.record_batch(batch).await {
        warn!(events = n, error = %e, "failed to write selection batch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{sample_event, InMemorySelectionSink};

    #[tokio::test(start_paused = true)]
    async fn test_flushes_when_batch_is_full() {
        let inner = Arc::new(InMemorySelectionSink::new(100));
        let sink = BatchingSelectionSink::new(
            inner.clone(),
            BatchingConfig::default()
                .with_batch_size(2)
                .with_flush_interval(Duration::from_secs(3600)),
        );
        sink.record(sample_event("a")).await.unwrap();
        sink.record(sample_event("b")).await.unwrap();
        for _ in 0..50 {
            if inner.len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(inner.len(), 2);
        sink.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_on_interval() {
        let inner = Arc::new(InMemorySelectionSink::new(100));
        let sink = BatchingSelectionSink::new(
            inner.clone(),
            BatchingConfig::default()
                .with_batch_size(100)
                .with_flush_interval(Duration::from_secs(1)),
        );
        sink.record(sample_event("a")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(inner.len(), 1);
        sink.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let inner = Arc::new(InMemorySelectionSink::new(100));
        let sink = BatchingSelectionSink::new(
            inner.clone(),
            BatchingConfig::default().with_capacity(1).with_batch_size(100),
        );
        // The worker has not been polled yet, so only one slot is available.
        for id in ["a", "b", "c"] {
            sink.record(sample_event(id)).await.unwrap();
        }
        assert_eq!(sink.dropped(), 2);
        sink.shutdown().await.unwrap();
        assert_eq!(inner.len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_flush_and_shutdown_drain() {
        let inner = Arc::new(InMemorySelectionSink::new(100));
        let sink = BatchingSelectionSink::new(inner.clone(), BatchingConfig::default());
        sink.record(sample_event("a")).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(inner.len(), 1);

        sink.record(sample_event("b")).await.unwrap();
        sink.record(sample_event("c")).await.unwrap();
        sink.shutdown().await.unwrap();
        assert_eq!(inner.len(), 3);
        assert!(sink.record(sample_event("d")).await.is_err());
        // a second shutdown finds no worker left
        sink.shutdown().await.unwrap();
    }
}
