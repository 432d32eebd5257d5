//! Result batching
//!
//! The in-progress batch is the only state shared by concurrent chunk
//! tasks; appends and the swap on flush happen under one mutex.

use std::mem;

use parking_lot::Mutex;

use super::wire::AlignmentRecord;

/// Shared, locked accumulator for one package's records.
pub struct ResultBatch {
    records: Mutex<Vec<AlignmentRecord>>,
    threshold: usize,
}

impl ResultBatch {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            records: Mutex::new(Vec::with_capacity(threshold)),
            threshold,
        }
    }

    /// Append one record; when the threshold is reached the filled batch is
    /// swapped out and returned for flushing.
    pub fn push(&self, record: AlignmentRecord) -> Option<Vec<AlignmentRecord>> {
        let mut records = self.records.lock();
        records.push(record);
        if records.len() >= self.threshold {
            Some(mem::replace(
                &mut *records,
                Vec::with_capacity(self.threshold),
            ))
        } else {
            None
        }
    }

    /// Take whatever remains for the final flush.
    pub fn drain(&self) -> Vec<AlignmentRecord> {
        mem::take(&mut *self.records.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::wire::QueryTargetPair;

    fn record(n: usize) -> AlignmentRecord {
        AlignmentRecord::failure(
            QueryTargetPair {
                query: format!("q{}", n),
                target: format!("t{}", n),
            },
            "test".to_string(),
        )
    }

    #[test]
    fn test_push_returns_full_batch_at_threshold() {
        let batch = ResultBatch::new(3);
        assert!(batch.push(record(0)).is_none());
        assert!(batch.push(record(1)).is_none());
        let full = batch.push(record(2)).expect("threshold reached");
        assert_eq!(full.len(), 3);
        assert!(batch.push(record(3)).is_none());
        assert_eq!(batch.drain().len(), 1);
    }

    #[test]
    fn test_drain_empties_the_batch() {
        let batch = ResultBatch::new(10);
        batch.push(record(0));
        batch.push(record(1));
        assert_eq!(batch.drain().len(), 2);
        assert!(batch.drain().is_empty());
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let batch = ResultBatch::new(0);
        assert!(batch.push(record(0)).is_some());
    }
}
