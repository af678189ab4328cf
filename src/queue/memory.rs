//! In-memory Signal Queue and Extraction Cache for testing and development.
#![allow(clippy::expect_used)]

use super::{ExtractionCache, Signal, SignalQueue, SignalStatus};
use crate::models::{DecisionId, SignalId};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory implementation of [`SignalQueue`]. Not persisted between runs.
#[derive(Default)]
pub struct InMemorySignalQueue {
    signals: RwLock<HashMap<SignalId, Signal>>,
}

impl InMemorySignalQueue {
    /// Creates a new empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalQueue for InMemorySignalQueue {
    fn enqueue(&self, signal: &Signal) -> Result<()> {
        self.signals
            .write()
            .expect("signals lock poisoned")
            .insert(signal.id.clone(), signal.clone());
        Ok(())
    }

    fn dequeue_batch(&self, limit: usize, now: i64) -> Result<Vec<Signal>> {
        let mut signals = self.signals.write().expect("signals lock poisoned");
        let mut due: Vec<Signal> = signals.values().filter(|s| s.is_due(now)).cloned().collect();
        due.sort_by_key(|s| s.created_at);
        due.truncate(limit);
        for signal in &mut due {
            signal.status = SignalStatus::Extracting;
            signals.insert(signal.id.clone(), signal.clone());
        }
        Ok(due)
    }

    fn update(&self, signal: &Signal) -> Result<()> {
        self.signals
            .write()
            .expect("signals lock poisoned")
            .insert(signal.id.clone(), signal.clone());
        Ok(())
    }

    fn get(&self, id: &SignalId) -> Result<Option<Signal>> {
        Ok(self.signals.read().expect("signals lock poisoned").get(id).cloned())
    }

    fn count_by_status(&self, status: SignalStatus) -> Result<usize> {
        Ok(self
            .signals
            .read()
            .expect("signals lock poisoned")
            .values()
            .filter(|s| s.status == status)
            .count())
    }
}

/// In-memory implementation of [`ExtractionCache`].
#[derive(Default)]
pub struct InMemoryExtractionCache {
    entries: RwLock<HashMap<String, DecisionId>>,
}

impl InMemoryExtractionCache {
    /// Creates a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExtractionCache for InMemoryExtractionCache {
    fn get(&self, fingerprint: &str) -> Result<Option<DecisionId>> {
        Ok(self.entries.read().expect("extraction cache lock poisoned").get(fingerprint).cloned())
    }

    fn put(&self, fingerprint: &str, decision_id: &DecisionId) -> Result<()> {
        let mut entries = self.entries.write().expect("extraction cache lock poisoned");
        match entries.get(fingerprint) {
            Some(existing) if existing != decision_id => Err(Error::Validation(format!(
                "fingerprint {fingerprint} already mapped to a different decision"
            ))),
            Some(_) => Ok(()),
            None => {
                entries.insert(fingerprint.to_string(), decision_id.clone());
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Module;

    #[test]
    fn dequeue_only_returns_due_signals_and_claims_them() {
        let queue = InMemorySignalQueue::new();
        let mut pending = Signal::new("p", "r", vec!["I recommend".to_string()], Module::Backend, 100);
        let id = pending.id.clone();
        queue.enqueue(&pending).unwrap();

        let mut backing_off = Signal::new("p2", "r2", vec![], Module::Backend, 100);
        backing_off.status = SignalStatus::Failed;
        backing_off.next_retry_at = Some(10_000);
        queue.enqueue(&backing_off).unwrap();

        let batch = queue.dequeue_batch(10, 200).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id);

        let stored = queue.get(&id).unwrap().unwrap();
        assert_eq!(stored.status, SignalStatus::Extracting);
        pending.status = SignalStatus::Extracting;
    }

    #[test]
    fn dequeue_respects_limit_and_fifo_order() {
        let queue = InMemorySignalQueue::new();
        for i in 0..5 {
            queue
                .enqueue(&Signal::new("p", "r", vec![], Module::Other, i64::from(i)))
                .unwrap();
        }
        let batch = queue.dequeue_batch(3, 1_000).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch[0].created_at <= batch[1].created_at);
    }

    #[test]
    fn failed_signal_becomes_due_only_after_backoff() {
        let queue = InMemorySignalQueue::new();
        let mut signal = Signal::new("p", "r", vec![], Module::Other, 0);
        signal.record_failure(0);
        queue.enqueue(&signal).unwrap();

        assert!(queue.dequeue_batch(10, 1).unwrap().is_empty());
        let retry_at = signal.next_retry_at.unwrap();
        assert_eq!(queue.dequeue_batch(10, retry_at).unwrap().len(), 1);
    }

    #[test]
    fn extraction_cache_rejects_fingerprint_reassignment() {
        let cache = InMemoryExtractionCache::new();
        let d1 = DecisionId::generate();
        let d2 = DecisionId::generate();
        cache.put("fp1", &d1).unwrap();
        assert!(cache.put("fp1", &d1).is_ok());
        assert!(cache.put("fp1", &d2).is_err());
        assert_eq!(cache.get("fp1").unwrap(), Some(d1));
    }
}
