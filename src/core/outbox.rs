//! Persisted offline queue with exponential-backoff redelivery.
//!
//! Items are kept newest-first in a single in-memory list that is written to
//! the key-value store after every mutation. Only one flush runs at a time;
//! a flush that finds another one in progress returns immediately.

use crate::core::backoff::BackoffPolicy;
use crate::domain::model::{QueueError, QueueItem, QueueStatus};
use crate::domain::ports::{Checkpoint, Connectivity, KeyValueStore, QueueJob};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
    pub not_due: usize,
    pub offline: bool,
    pub already_running: bool,
}

impl FlushReport {
    fn already_running() -> Self {
        Self {
            already_running: true,
            ..Self::default()
        }
    }

    fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Writes in-flight progress of one item back to the queue and storage.
struct ItemCheckpoint<'a, J: QueueJob> {
    queue: &'a OfflineQueue<J>,
    id: &'a str,
}

#[async_trait]
impl<'a, J: QueueJob> Checkpoint<J::Payload> for ItemCheckpoint<'a, J> {
    async fn save(&self, payload: &J::Payload) {
        let mut items = self.queue.items.lock().await;
        let Some(item) = items.iter_mut().find(|item| item.id == self.id) else {
            return;
        };
        item.payload = payload.clone();
        if let Err(e) = self.queue.persist(&items).await {
            tracing::error!(queue = self.queue.label(), id = %self.id, "progress not saved: {}", e);
        }
    }
}

fn retry_at(now: DateTime<Utc>, delay: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub struct OfflineQueue<J: QueueJob> {
    job: J,
    store: Arc<dyn KeyValueStore>,
    connectivity: Arc<dyn Connectivity>,
    backoff: BackoffPolicy,
    items: Mutex<Vec<QueueItem<J::Payload>>>,
    flushing: AtomicBool,
}

impl<J: QueueJob> OfflineQueue<J> {
    /// Restores the queue from storage. An unreadable blob is moved aside to
    /// `<key>.corrupt` and the queue starts empty.
    pub async fn load(
        job: J,
        store: Arc<dyn KeyValueStore>,
        connectivity: Arc<dyn Connectivity>,
        backoff: BackoffPolicy,
    ) -> Result<Self> {
        let key = job.storage_key();
        let items = match store.get(key).await? {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<QueueItem<J::Payload>>>(&raw) {
                Ok(items) => items,
                Err(e) => {
                    tracing::error!(queue = job.label(), "stored queue is unreadable: {}", e);
                    store.set(&format!("{}.corrupt", key), &raw).await?;
                    Vec::new()
                }
            },
        };
        tracing::debug!(queue = job.label(), items = items.len(), "queue loaded");

        Ok(Self {
            job,
            store,
            connectivity,
            backoff,
            items: Mutex::new(items),
            flushing: AtomicBool::new(false),
        })
    }

    pub fn label(&self) -> &'static str {
        self.job.label()
    }

    async fn persist(&self, items: &[QueueItem<J::Payload>]) -> Result<()> {
        let json = serde_json::to_string(items)?;
        self.store.set(self.job.storage_key(), &json).await
    }

    /// Stores a new pending item at the front of the queue. Never touches the network.
    pub async fn enqueue(&self, payload: J::Payload) -> Result<QueueItem<J::Payload>> {
        let item = QueueItem::new(payload);
        let mut items = self.items.lock().await;
        items.insert(0, item.clone());
        self.persist(&items).await?;
        tracing::info!(queue = self.label(), id = %item.id, "queued for delivery");
        Ok(item)
    }

    pub async fn items(&self) -> Vec<QueueItem<J::Payload>> {
        self.items.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    /// Delivers every eligible item in list order. Eligible means `force` or
    /// its `next_attempt_at` has passed.
    pub async fn flush(&self, force: bool) -> Result<FlushReport> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(queue = self.label(), "flush already running");
            return Ok(FlushReport::already_running());
        }
        let _guard = FlushGuard(&self.flushing);

        if !self.connectivity.is_online().await {
            tracing::debug!(queue = self.label(), "offline, flush skipped");
            return Ok(FlushReport::offline());
        }

        let now = Utc::now();
        let mut report = FlushReport::default();
        let due: Vec<String> = {
            let items = self.items.lock().await;
            let (due, waiting): (Vec<_>, Vec<_>) =
                items.iter().partition(|item| force || item.is_due(now));
            report.not_due = waiting.len();
            due.into_iter().map(|item| item.id.clone()).collect()
        };

        for id in due {
            let payload = {
                let items = self.items.lock().await;
                match items.iter().find(|item| item.id == id) {
                    Some(item) => item.payload.clone(),
                    // removed by the operator while we were busy
                    None => continue,
                }
            };

            let mut payload = payload;
            let checkpoint = ItemCheckpoint { queue: self, id: &id };
            let outcome = self.job.deliver(&id, &mut payload, &checkpoint).await;

            let mut items = self.items.lock().await;
            let Some(index) = items.iter().position(|item| item.id == id) else {
                continue;
            };
            match outcome {
                Ok(()) => {
                    items.remove(index);
                    report.delivered += 1;
                    tracing::info!(queue = self.label(), id = %id, "delivered");
                }
                Err(err) => {
                    let item = &mut items[index];
                    let delay = self.backoff.delay(item.attempts);
                    item.payload = payload;
                    item.status = QueueStatus::Failed;
                    item.attempts = item.attempts.saturating_add(1);
                    item.last_error = Some(QueueError::from(&err));
                    item.next_attempt_at = retry_at(Utc::now(), delay);
                    report.failed += 1;
                    tracing::warn!(
                        queue = self.label(),
                        id = %id,
                        attempts = item.attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        "delivery failed: {}",
                        err
                    );
                }
            }
            self.persist(&items).await?;
        }

        if report.attempted() > 0 {
            tracing::info!(
                queue = self.label(),
                delivered = report.delivered,
                failed = report.failed,
                "flush finished"
            );
        }
        Ok(report)
    }

    /// Makes an item due now and runs a flush. Returns `None` when the id is unknown.
    pub async fn retry_item(&self, id: &str) -> Result<Option<FlushReport>> {
        {
            let mut items = self.items.lock().await;
            let Some(item) = items.iter_mut().find(|item| item.id == id) else {
                return Ok(None);
            };
            item.status = QueueStatus::Pending;
            item.next_attempt_at = Utc::now();
            item.last_error = None;
            self.persist(&items).await?;
        }
        tracing::info!(queue = self.label(), id = %id, "manual retry");
        self.flush(false).await.map(Some)
    }

    pub async fn remove_item(&self, id: &str) -> Result<bool> {
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.persist(&items).await?;
        tracing::info!(queue = self.label(), id = %id, "removed from queue");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connectivity::NetworkMonitor;
    use crate::core::storage::MemoryKeyValueStore;
    use crate::utils::error::ApiError;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Note {
        text: String,
        #[serde(default)]
        steps_done: u32,
    }

    /// Fails every delivery whose text starts with "bad", succeeds otherwise.
    struct NoteJob {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QueueJob for NoteJob {
        type Payload = Note;

        fn storage_key(&self) -> &'static str {
            "outbox.notes"
        }

        fn label(&self) -> &'static str {
            "notes"
        }

        async fn deliver(
            &self,
            _item_id: &str,
            payload: &mut Note,
            _checkpoint: &dyn Checkpoint<Note>,
        ) -> std::result::Result<(), ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            payload.steps_done += 1;
            if payload.text.starts_with("bad") {
                Err(ApiError::http(500, "boom"))
            } else {
                Ok(())
            }
        }
    }

    /// Finishes one step, saves it, then waits for `gate` before completing.
    struct GatedJob {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl QueueJob for GatedJob {
        type Payload = Note;

        fn storage_key(&self) -> &'static str {
            "outbox.notes"
        }

        fn label(&self) -> &'static str {
            "gated"
        }

        async fn deliver(
            &self,
            _item_id: &str,
            payload: &mut Note,
            checkpoint: &dyn Checkpoint<Note>,
        ) -> std::result::Result<(), ApiError> {
            payload.steps_done += 1;
            checkpoint.save(payload).await;
            self.gate.notified().await;
            payload.steps_done += 1;
            Ok(())
        }
    }

    fn note(text: &str) -> Note {
        Note {
            text: text.to_string(),
            steps_done: 0,
        }
    }

    async fn queue(
        store: Arc<dyn KeyValueStore>,
        online: bool,
    ) -> (OfflineQueue<NoteJob>, NetworkMonitor, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let monitor = NetworkMonitor::new(online);
        let q = OfflineQueue::load(
            NoteJob {
                calls: calls.clone(),
            },
            store,
            Arc::new(monitor.clone()),
            BackoffPolicy::default(),
        )
        .await
        .unwrap();
        (q, monitor, calls)
    }

    #[tokio::test]
    async fn test_enqueue_prepends_and_persists() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let (q, _, _) = queue(store.clone(), false).await;

        let first = q.enqueue(note("one")).await.unwrap();
        let second = q.enqueue(note("two")).await.unwrap();

        let ids: Vec<String> = q.items().await.into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        let (reloaded, _, _) = queue(store, false).await;
        assert_eq!(reloaded.len().await, 2);
        assert_eq!(reloaded.items().await[0].payload.text, "two");
    }

    #[tokio::test]
    async fn test_offline_flush_does_nothing() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let (q, _, calls) = queue(store, false).await;
        q.enqueue(note("one")).await.unwrap();

        let report = q.flush(true).await.unwrap();
        assert!(report.offline);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(q.len().await, 1);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_backs_off() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let (q, _, calls) = queue(store, true).await;
        q.enqueue(note("good-1")).await.unwrap();
        let bad = q.enqueue(note("bad")).await.unwrap();
        q.enqueue(note("good-2")).await.unwrap();

        let report = q.flush(false).await.unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let items = q.items().await;
        assert_eq!(items.len(), 1);
        let failed = &items[0];
        assert_eq!(failed.id, bad.id);
        assert_eq!(failed.status, QueueStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert_eq!(failed.payload.steps_done, 1);
        assert_eq!(
            failed.last_error,
            Some(QueueError {
                message: "boom".into(),
                status: Some(500)
            })
        );
        assert!(failed.next_attempt_at > bad.next_attempt_at);
        let max = chrono::Duration::from_std(BackoffPolicy::default().max_total_delay()).unwrap();
        assert!(failed.next_attempt_at <= Utc::now() + max);

        // not due yet
        let report = q.flush(false).await.unwrap();
        assert_eq!(report.attempted(), 0);
        assert_eq!(report.not_due, 1);

        // forced: attempted again, next attempt pushed further out
        let previous = failed.next_attempt_at;
        q.flush(true).await.unwrap();
        let again = &q.items().await[0];
        assert_eq!(again.attempts, 2);
        assert!(again.next_attempt_at > previous);
    }

    #[tokio::test]
    async fn test_retry_and_remove_item() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let (q, _, calls) = queue(store, true).await;
        let bad = q.enqueue(note("bad")).await.unwrap();
        q.flush(false).await.unwrap();

        let report = q.retry_item(&bad.id).await.unwrap().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(q.retry_item("missing").await.unwrap().is_none());

        assert!(q.remove_item(&bad.id).await.unwrap());
        assert!(!q.remove_item(&bad.id).await.unwrap());
        assert!(q.is_empty().await);
    }

    #[tokio::test]
    async fn test_corrupt_storage_is_moved_aside() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        store.set("outbox.notes", "{not json").await.unwrap();

        let (q, _, _) = queue(store.clone(), true).await;
        assert!(q.is_empty().await);
        assert_eq!(
            store.get("outbox.notes.corrupt").await.unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[tokio::test]
    async fn test_progress_is_stored_while_delivery_is_in_flight() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let gate = Arc::new(Notify::new());
        let online: Arc<dyn Connectivity> = Arc::new(NetworkMonitor::new(true));
        let q = Arc::new(
            OfflineQueue::load(
                GatedJob { gate: gate.clone() },
                store.clone(),
                online,
                BackoffPolicy::default(),
            )
            .await
            .unwrap(),
        );
        let item = q.enqueue(note("two steps")).await.unwrap();

        let flushing = tokio::spawn({
            let q = q.clone();
            async move { q.flush(false).await }
        });
        while q.items().await[0].payload.steps_done == 0 {
            tokio::task::yield_now().await;
        }
        assert!(q.is_flushing());

        // a process restarted at this point sees the first step as done
        let (restarted, _, _) = queue(store.clone(), false).await;
        let saved = &restarted.items().await[0];
        assert_eq!(saved.id, item.id);
        assert_eq!(saved.payload.steps_done, 1);
        assert_eq!(saved.attempts, 0);

        gate.notify_one();
        let report = flushing.await.unwrap().unwrap();
        assert_eq!(report.delivered, 1);
        assert!(q.is_empty().await);
        assert_eq!(store.get("outbox.notes").await.unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_retry_time_saturates() {
        let now = Utc::now();
        assert_eq!(
            retry_at(now, std::time::Duration::from_millis(u64::MAX)),
            DateTime::<Utc>::MAX_UTC
        );
        assert_eq!(
            retry_at(now, std::time::Duration::from_secs(5)),
            now + chrono::Duration::seconds(5)
        );
    }
}
