//! Delivery of events and batches to the analytics backend
//!
//! Transport never lets a failure escape its own boundary: every undelivered
//! payload is redirected to the offline queue, so a telemetry failure can
//! never interrupt the host application. Absence of a configured backend is
//! itself a valid, handled state that routes all traffic offline.
//!
//! Batch sends come in two flavors: [`Transport::send_batch`] awaits delivery
//! inline (teardown, direct drive), while [`Transport::begin_batch`] returns
//! an [`InFlightBatch`] handle the pipeline's run loop polls alongside its
//! other work, so a hung request delays that one batch without stalling
//! capture or timers.

mod client;

pub use client::HttpSink;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use serde_json::Value;

use crate::error::Result;
use crate::offline::OfflineQueue;
use crate::store::QueueStore;
use crate::types::{Batch, Event, QueuePayload};

/// Collection receiving fast-path single-event writes
pub const EVENTS_COLLECTION: &str = "analytics_events";

/// Collection receiving batch writes and offline-queue replays
pub const BATCHES_COLLECTION: &str = "analytics_batches";

/// The operations consumed from the persistence backend.
///
/// Writes are fallible; transport treats every failure as a signal to park
/// the payload in the offline queue.
#[allow(async_fn_in_trait)]
pub trait AnalyticsSink {
    /// Single-record write, used for the critical fast path and batch writes
    async fn append_record(&self, collection: &str, record: &Value) -> Result<()>;

    /// Multi-record write, used for offline-queue resync
    async fn bulk_write(&self, collection: &str, records: &[Value]) -> Result<()>;

    /// Whether the backend is currently reachable. Resync checks this before
    /// replaying the queue; backends without a cheap reachability endpoint
    /// can keep the default.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Delivery statistics, for observability
#[derive(Debug, Default, Clone)]
pub struct TransportStats {
    /// Fast-path events delivered
    pub events_sent: usize,
    /// Batches delivered
    pub batches_sent: usize,
    /// Payloads redirected to the offline queue
    pub deferred: usize,
    /// Entries replayed by successful resyncs
    pub resynced: usize,
}

/// A batch send in progress.
///
/// Returned by [`Transport::begin_batch`]; the caller's event loop polls it
/// via [`InFlightBatch::wait`] and settles the outcome with
/// [`Transport::complete_batch`]. The handle owns the batch so a failed or
/// abandoned send can still be parked offline.
pub struct InFlightBatch {
    batch: Batch,
    send: Pin<Box<dyn Future<Output = Result<()>>>>,
}

impl InFlightBatch {
    /// Poll the underlying send to completion.
    ///
    /// Cancel-safe: dropping the borrow mid-poll leaves the send resumable.
    pub async fn wait(&mut self) -> Result<()> {
        self.send.as_mut().await
    }

    /// Take the batch back once the send has settled (or been abandoned).
    pub fn into_batch(self) -> Batch {
        self.batch
    }
}

/// Hands payloads to the sink, falling back to the offline queue.
pub struct Transport<S: AnalyticsSink, Q: QueueStore> {
    sink: Option<Rc<S>>,
    offline: OfflineQueue<Q>,
    stats: TransportStats,
}

impl<S: AnalyticsSink + 'static, Q: QueueStore> Transport<S, Q> {
    /// `sink: None` models the "no configured backend" state: everything
    /// goes straight to the offline queue.
    pub fn new(sink: Option<S>, offline: OfflineQueue<Q>) -> Self {
        Self {
            sink: sink.map(Rc::new),
            offline,
            stats: TransportStats::default(),
        }
    }

    /// Fast-path delivery of a single critical event.
    pub async fn send_event(&mut self, event: Event) {
        let Some(sink) = self.sink.clone() else {
            self.defer(QueuePayload::Event(event));
            return;
        };

        let record = match serde_json::to_value(&event) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(error = %e, name = %event.name, "failed to serialize event");
                return;
            }
        };

        match sink.append_record(EVENTS_COLLECTION, &record).await {
            Ok(()) => {
                self.stats.events_sent += 1;
                tracing::debug!(name = %event.name, "fast-path event delivered");
            }
            Err(e) => {
                tracing::warn!(error = %e, name = %event.name, "fast-path send failed, deferring");
                self.defer(QueuePayload::Event(event));
            }
        }
    }

    /// Begin a batch send without blocking the caller.
    ///
    /// Returns `None` when the batch was settled immediately instead: no
    /// sink configured (batch parked offline) or serialization failed.
    pub fn begin_batch(&mut self, batch: Batch) -> Option<InFlightBatch> {
        let Some(sink) = self.sink.clone() else {
            self.defer(QueuePayload::Batch(batch));
            return None;
        };

        let record = match serde_json::to_value(&batch) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize batch");
                return None;
            }
        };

        let send = Box::pin(async move { sink.append_record(BATCHES_COLLECTION, &record).await });
        Some(InFlightBatch { batch, send })
    }

    /// Settle the outcome of an in-flight batch send.
    pub fn complete_batch(&mut self, batch: Batch, outcome: Result<()>) {
        match outcome {
            Ok(()) => {
                self.stats.batches_sent += 1;
                tracing::debug!(
                    events = batch.events.len(),
                    session_id = %batch.session_id,
                    "batch delivered"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "batch send failed, deferring");
                self.defer(QueuePayload::Batch(batch));
            }
        }
    }

    /// Deliver a batch, awaiting the send inline. Used for the forced
    /// teardown flush and direct-drive callers.
    pub async fn send_batch(&mut self, batch: Batch) {
        if let Some(mut in_flight) = self.begin_batch(batch) {
            let outcome = in_flight.wait().await;
            self.complete_batch(in_flight.into_batch(), outcome);
        }
    }

    /// Park a batch offline without attempting delivery. Used when teardown
    /// finds a send still outstanding: the queue replays it on resync.
    pub fn defer_batch(&mut self, batch: Batch) {
        self.defer(QueuePayload::Batch(batch));
    }

    /// Replay the offline queue as one bulk write.
    ///
    /// All-or-nothing: on success the queue is cleared entirely; on failure
    /// (including an unhealthy backend) it is left untouched and the next
    /// resync retries the same entries. Returns the number of entries
    /// replayed.
    pub async fn resync(&mut self) -> usize {
        let Some(sink) = self.sink.clone() else {
            return 0;
        };

        let entries = self.offline.entries();
        if entries.is_empty() {
            return 0;
        }

        if !sink.health_check().await {
            tracing::debug!("backend unhealthy, resync deferred");
            return 0;
        }

        let records: Vec<Value> = match entries
            .iter()
            .map(|e| serde_json::to_value(&e.payload))
            .collect::<std::result::Result<_, _>>()
        {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize offline queue for resync");
                return 0;
            }
        };

        match sink.bulk_write(BATCHES_COLLECTION, &records).await {
            Ok(()) => {
                self.offline.clear();
                self.stats.resynced += entries.len();
                tracing::info!(entries = entries.len(), "offline queue resynced");
                entries.len()
            }
            Err(e) => {
                tracing::warn!(error = %e, entries = entries.len(), "resync failed, queue left intact");
                0
            }
        }
    }

    pub fn offline_len(&self) -> usize {
        self.offline.len()
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    fn defer(&mut self, payload: QueuePayload) {
        self.stats.deferred += 1;
        self.offline.enqueue(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryQueueStore;
    use crate::types::{PageContext, Viewport};
    use chrono::Utc;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Sink that records writes; failure and health are toggled through
    /// shared handles
    #[derive(Default)]
    struct RecordingSink {
        appended: Rc<RefCell<Vec<(String, Value)>>>,
        bulks: Rc<RefCell<Vec<(String, Vec<Value>)>>>,
        failing: Rc<Cell<bool>>,
        unhealthy: Rc<Cell<bool>>,
    }

    impl AnalyticsSink for RecordingSink {
        async fn append_record(&self, collection: &str, record: &Value) -> Result<()> {
            if self.failing.get() {
                return Err(crate::error::Error::Backend("write failed".to_string()));
            }
            self.appended
                .borrow_mut()
                .push((collection.to_string(), record.clone()));
            Ok(())
        }

        async fn bulk_write(&self, collection: &str, records: &[Value]) -> Result<()> {
            if self.failing.get() {
                return Err(crate::error::Error::Backend("bulk write failed".to_string()));
            }
            self.bulks
                .borrow_mut()
                .push((collection.to_string(), records.to_vec()));
            Ok(())
        }

        async fn health_check(&self) -> bool {
            !self.unhealthy.get()
        }
    }

    fn event(name: &str) -> Event {
        Event {
            name: name.to_string(),
            properties: serde_json::json!({}),
            session_id: "s-1".to_string(),
            user_id: None,
            captured_at: Utc::now(),
            context: PageContext {
                url: "https://example.com/".to_string(),
                title: "Example".to_string(),
                viewport: Viewport {
                    width: 1280,
                    height: 720,
                },
            },
        }
    }

    fn batch(names: &[&str]) -> Batch {
        Batch {
            events: names.iter().map(|n| event(n)).collect(),
            session_id: "s-1".to_string(),
            user_id: None,
            produced_at: Utc::now(),
            performance_summary: None,
            heatmap_sample: Vec::new(),
        }
    }

    fn transport(
        sink: Option<RecordingSink>,
    ) -> Transport<RecordingSink, MemoryQueueStore> {
        Transport::new(sink, OfflineQueue::new(MemoryQueueStore::new(), 100))
    }

    #[tokio::test]
    async fn test_no_sink_routes_to_offline_queue() {
        let mut t = transport(None);
        t.send_event(event("error")).await;
        assert_eq!(t.offline_len(), 1);
        assert_eq!(t.stats().deferred, 1);
    }

    #[tokio::test]
    async fn test_sink_failure_routes_to_offline_queue() {
        let sink = RecordingSink::default();
        sink.failing.set(true);
        let mut t = transport(Some(sink));

        t.send_event(event("error")).await;
        assert_eq!(t.offline_len(), 1);
    }

    #[tokio::test]
    async fn test_success_leaves_queue_empty() {
        let sink = RecordingSink::default();
        let appended = Rc::clone(&sink.appended);
        let mut t = transport(Some(sink));

        t.send_event(event("error")).await;
        assert_eq!(t.offline_len(), 0);
        assert_eq!(appended.borrow().len(), 1);
        assert_eq!(appended.borrow()[0].0, EVENTS_COLLECTION);
    }

    #[tokio::test]
    async fn test_begin_batch_then_complete() {
        let sink = RecordingSink::default();
        let appended = Rc::clone(&sink.appended);
        let mut t = transport(Some(sink));

        let mut in_flight = t.begin_batch(batch(&["a", "b"])).expect("sink configured");
        let outcome = in_flight.wait().await;
        t.complete_batch(in_flight.into_batch(), outcome);

        assert_eq!(t.stats().batches_sent, 1);
        assert_eq!(t.offline_len(), 0);
        assert_eq!(appended.borrow()[0].0, BATCHES_COLLECTION);
    }

    #[tokio::test]
    async fn test_begin_batch_without_sink_parks_offline() {
        let mut t = transport(None);
        assert!(t.begin_batch(batch(&["a"])).is_none());
        assert_eq!(t.offline_len(), 1);
    }

    #[tokio::test]
    async fn test_failed_in_flight_batch_is_deferred() {
        let sink = RecordingSink::default();
        let failing = Rc::clone(&sink.failing);
        let mut t = transport(Some(sink));

        failing.set(true);
        let mut in_flight = t.begin_batch(batch(&["a"])).expect("sink configured");
        let outcome = in_flight.wait().await;
        t.complete_batch(in_flight.into_batch(), outcome);

        assert_eq!(t.stats().batches_sent, 0);
        assert_eq!(t.offline_len(), 1);
    }

    #[tokio::test]
    async fn test_resync_failure_leaves_queue_unchanged() {
        let sink = RecordingSink::default();
        let failing = Rc::clone(&sink.failing);
        let mut t = transport(Some(sink));

        failing.set(true);
        t.send_event(event("error")).await;
        t.send_event(event("conversion")).await;
        assert_eq!(t.offline_len(), 2);

        // Backend reports healthy but the bulk write itself still fails
        let replayed = t.resync().await;
        assert_eq!(replayed, 0);
        assert_eq!(t.offline_len(), 2);
    }

    #[tokio::test]
    async fn test_resync_success_empties_queue() {
        let sink = RecordingSink::default();
        let failing = Rc::clone(&sink.failing);
        let bulks = Rc::clone(&sink.bulks);
        let mut t = transport(Some(sink));

        failing.set(true);
        t.send_event(event("error")).await;
        t.send_event(event("conversion")).await;

        failing.set(false);
        let replayed = t.resync().await;
        assert_eq!(replayed, 2);
        assert_eq!(t.offline_len(), 0);
        assert_eq!(bulks.borrow().len(), 1);
        assert_eq!(bulks.borrow()[0].1.len(), 2);
    }

    #[tokio::test]
    async fn test_resync_skipped_while_backend_unhealthy() {
        let sink = RecordingSink::default();
        let failing = Rc::clone(&sink.failing);
        let unhealthy = Rc::clone(&sink.unhealthy);
        let bulks = Rc::clone(&sink.bulks);
        let mut t = transport(Some(sink));

        failing.set(true);
        t.send_event(event("error")).await;
        failing.set(false);

        // Unhealthy backend: no bulk write is even attempted
        unhealthy.set(true);
        assert_eq!(t.resync().await, 0);
        assert_eq!(t.offline_len(), 1);
        assert!(bulks.borrow().is_empty());

        unhealthy.set(false);
        assert_eq!(t.resync().await, 1);
        assert_eq!(t.offline_len(), 0);
    }

    #[tokio::test]
    async fn test_resync_with_empty_queue_is_noop() {
        let sink = RecordingSink::default();
        let bulks = Rc::clone(&sink.bulks);
        let mut t = transport(Some(sink));

        assert_eq!(t.resync().await, 0);
        assert!(bulks.borrow().is_empty());
    }
}
