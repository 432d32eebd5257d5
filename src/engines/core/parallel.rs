//! Parallel execution primitives
//!
//! Owns the compute thread pool used to fan a work package's pairs across
//! CPU lanes, plus the lane accounting and contiguous partitioning helpers
//! shared by the orchestrator.

use std::ops::Range;
use std::sync::OnceLock;

use rayon::{ThreadPool, ThreadPoolBuilder};

static COMPUTE_POOL: OnceLock<ThreadPool> = OnceLock::new();

/// The process-wide compute pool, created on first use.
///
/// `lanes` only takes effect on the first call; later callers share the
/// pool that already exists.
pub fn compute_pool(lanes: usize) -> &'static ThreadPool {
    COMPUTE_POOL.get_or_init(|| {
        let pool = ThreadPoolBuilder::new()
            .num_threads(lanes.max(1))
            .thread_name(|idx| format!("swgrid-compute-{}", idx))
            .build()
            .expect("failed to build compute thread pool");
        log::info!("compute pool started with {} lanes", lanes.max(1));
        pool
    })
}

/// CPU lanes available for alignment work, keeping `reserved` lanes free
/// for the heartbeat and I/O tasks.
pub fn available_lanes(reserved: usize) -> usize {
    num_cpus::get().saturating_sub(reserved).max(1)
}

/// Split `0..len` into `parts` contiguous, near-equal ranges.
pub fn partition(len: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.clamp(1, len.max(1));
    (0..parts)
        .map(|i| (len * i / parts)..(len * (i + 1) / parts))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_covers_range_contiguously() {
        for len in [0usize, 1, 7, 100, 101] {
            for parts in [1usize, 2, 3, 8] {
                let ranges = partition(len, parts);
                let mut expected_start = 0;
                for range in &ranges {
                    assert_eq!(range.start, expected_start);
                    expected_start = range.end;
                }
                assert_eq!(expected_start, len, "len {} parts {}", len, parts);
            }
        }
    }

    #[test]
    fn test_partition_is_near_equal() {
        let ranges = partition(100, 8);
        assert_eq!(ranges.len(), 8);
        for range in &ranges {
            let size = range.end - range.start;
            assert!((12..=13).contains(&size));
        }
    }

    #[test]
    fn test_partition_never_exceeds_item_count() {
        assert_eq!(partition(3, 8).len(), 3);
        assert_eq!(partition(0, 8).len(), 1);
    }

    #[test]
    fn test_available_lanes_keeps_a_minimum() {
        assert!(available_lanes(usize::MAX) >= 1);
        assert!(available_lanes(0) >= 1);
    }
}
