//! Capability probe
//!
//! Measures what this host can sustain in cell updates per second (CUPS)
//! with the sequential fill, and packages the result with the core count
//! for the registration report. The target length doubles until one run
//! exceeds the calibration threshold, then the mean is taken over a small
//! grid of problem sizes.

use std::time::{Duration, Instant};

use crate::engines::compute::matrix::ScoreMatrix;
use crate::engines::compute::ScoringScheme;

use super::wire::CapabilityReport;

/// Probe tuning
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Calibration stops once a single run takes longer than this
    pub threshold: Duration,
    /// Query-axis doublings in the measurement grid
    pub query_steps: u32,
    /// Target-axis doublings in the measurement grid
    pub target_steps: u32,
    /// Starting query length
    pub base_query: usize,
    /// Starting target length
    pub base_target: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            threshold: Duration::from_millis(10),
            query_steps: 3,
            target_steps: 2,
            base_query: 1 << 8,
            base_target: 1 << 10,
        }
    }
}

/// Run the probe and build the registration report.
pub fn probe(options: &ProbeOptions) -> CapabilityReport {
    CapabilityReport {
        benchmark_result: measure_cups(options) as u64,
        cpu_cores: num_cpus::get(),
    }
}

/// Mean CUPS over the calibrated size grid.
pub fn measure_cups(options: &ProbeOptions) -> f64 {
    let mut target_len = options.base_target;
    loop {
        let (elapsed, _) = run_once(options.base_query, target_len);
        if elapsed > options.threshold {
            break;
        }
        target_len *= 2;
    }

    let shrink = 1usize << (options.query_steps + options.target_steps).saturating_sub(2);
    target_len = (target_len / shrink).max(1);

    let mut sum = 0.0;
    for target_step in 0..options.target_steps {
        for query_step in 0..options.query_steps {
            let (_, cups) = run_once(
                options.base_query << query_step,
                target_len << target_step,
            );
            sum += cups;
        }
    }

    sum / (options.query_steps * options.target_steps) as f64
}

fn run_once(query_len: usize, target_len: usize) -> (Duration, f64) {
    let scoring = ScoringScheme {
        match_score: 1,
        mismatch_penalty: 1,
        gap_penalty: 2,
    };
    let query = vec![b'A'; query_len];
    let target = vec![b'T'; target_len];

    let start = Instant::now();
    ScoreMatrix::sequential(&query, &target, &scoring);
    let elapsed = start.elapsed();

    let cells = (query_len * target_len) as f64;
    (elapsed, cells / elapsed.as_secs_f64().max(f64::EPSILON))
}
