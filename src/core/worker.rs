use crate::core::outbox::{FlushReport, OfflineQueue};
use crate::domain::ports::QueueJob;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Object-safe view of an [`OfflineQueue`] so queues of different jobs can share one worker.
#[async_trait]
pub trait Flushable: Send + Sync {
    fn label(&self) -> &'static str;
    async fn flush(&self, force: bool) -> Result<FlushReport>;
}

#[async_trait]
impl<J: QueueJob + 'static> Flushable for OfflineQueue<J> {
    fn label(&self) -> &'static str {
        OfflineQueue::label(self)
    }

    async fn flush(&self, force: bool) -> Result<FlushReport> {
        OfflineQueue::flush(self, force).await
    }
}

pub async fn flush_all(queues: &[Arc<dyn Flushable>], force: bool) {
    for queue in queues {
        if let Err(e) = queue.flush(force).await {
            tracing::error!(queue = queue.label(), "flush failed: {}", e);
        }
    }
}

/// Background task flushing the queues on a timer and when the network comes back.
pub struct OutboxWorker {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl OutboxWorker {
    pub fn start(
        queues: Vec<Arc<dyn Flushable>>,
        tick: Duration,
        mut network: watch::Receiver<bool>,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut was_online = *network.borrow_and_update();
            let mut network_closed = false;

            tracing::info!(
                queues = queues.len(),
                tick_seconds = tick.as_secs(),
                "outbox worker started"
            );

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {
                        flush_all(&queues, false).await;
                    }
                    changed = network.changed(), if !network_closed => {
                        if changed.is_err() {
                            network_closed = true;
                            continue;
                        }
                        let online = *network.borrow_and_update();
                        if online && !was_online {
                            tracing::info!("connectivity restored, flushing outbox");
                            flush_all(&queues, false).await;
                        }
                        was_online = online;
                    }
                }
            }

            tracing::info!("outbox worker stopped");
        });

        Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the loop and waits for an in-flight flush to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("outbox worker panicked: {}", e);
            }
        }
    }
}

impl Drop for OutboxWorker {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}
