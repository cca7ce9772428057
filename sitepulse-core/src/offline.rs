//! Bounded durable FIFO queue of undelivered payloads
//!
//! When the backend is unreachable (or not configured at all), failed
//! payloads are parked here and replayed once delivery becomes possible
//! again. The queue is strictly bounded: under sustained overflow the oldest
//! entries are dropped silently. That data loss is an accepted degradation,
//! not an error.

use chrono::Utc;

use crate::store::QueueStore;
use crate::types::{OfflineEntry, QueuePayload};

/// Default queue capacity, in entries
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded FIFO of undelivered payloads over a [`QueueStore`].
///
/// Storage faults are logged and swallowed: a broken local store must never
/// take event capture down with it.
pub struct OfflineQueue<Q: QueueStore> {
    store: Q,
    capacity: usize,
    evictions: u64,
}

impl<Q: QueueStore> OfflineQueue<Q> {
    pub fn new(store: Q, capacity: usize) -> Self {
        Self {
            store,
            capacity,
            evictions: 0,
        }
    }

    /// Append a payload, evicting the oldest entries past capacity.
    pub fn enqueue(&mut self, payload: QueuePayload) {
        let mut entries = self.read_entries();
        entries.push(OfflineEntry {
            payload,
            enqueued_at: Utc::now(),
        });

        while entries.len() > self.capacity {
            entries.remove(0);
            self.evictions += 1;
        }

        if let Err(e) = self.store.write_all(&entries) {
            tracing::warn!(error = %e, "failed to persist offline queue entry");
        } else {
            tracing::debug!(queued = entries.len(), "payload parked in offline queue");
        }
    }

    /// Snapshot of the full queue, oldest first.
    pub fn entries(&self) -> Vec<OfflineEntry> {
        self.read_entries()
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    /// Entries silently dropped to capacity so far
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Clear the queue after a successful resync.
    pub fn clear(&mut self) {
        if let Err(e) = self.store.write_all(&[]) {
            tracing::warn!(error = %e, "failed to clear offline queue");
        }
    }

    fn read_entries(&self) -> Vec<OfflineEntry> {
        match self.store.read_all() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read offline queue, treating as empty");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryQueueStore;
    use crate::types::{Event, PageContext, Viewport};

    fn payload(name: &str) -> QueuePayload {
        QueuePayload::Event(Event {
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
        })
    }

    fn name_of(entry: &OfflineEntry) -> &str {
        match &entry.payload {
            QueuePayload::Event(e) => &e.name,
            QueuePayload::Batch(_) => panic!("expected event"),
        }
    }

    #[test]
    fn test_enqueue_fifo_order() {
        let mut queue = OfflineQueue::new(MemoryQueueStore::new(), 100);
        queue.enqueue(payload("a"));
        queue.enqueue(payload("b"));
        queue.enqueue(payload("c"));

        let entries = queue.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(name_of(&entries[0]), "a");
        assert_eq!(name_of(&entries[2]), "c");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut queue = OfflineQueue::new(MemoryQueueStore::new(), 100);
        for i in 0..101 {
            queue.enqueue(payload(&format!("event-{i}")));
        }

        let entries = queue.entries();
        assert_eq!(entries.len(), 100);
        assert_eq!(name_of(&entries[0]), "event-1");
        assert_eq!(name_of(&entries[99]), "event-100");
        assert_eq!(queue.evictions(), 1);
    }

    #[test]
    fn test_clear_empties() {
        let mut queue = OfflineQueue::new(MemoryQueueStore::new(), 100);
        queue.enqueue(payload("a"));
        assert!(!queue.is_empty());

        queue.clear();
        assert!(queue.is_empty());
    }
}
