//! Alignment engine with tiered strategy selection
//!
//! One entry point for computing a local alignment. The engine picks a
//! construction strategy from the input size and the configured memory
//! budget, and falls back tier by tier when a strategy fails, so a single
//! pair's computational anomaly never aborts a whole batch.

use std::panic::{self, AssertUnwindSafe};

use super::matrix::{self, ScoreMatrix};
use super::traceback;
use super::{AlignmentResult, ComputeError, ComputeResult, ScoringScheme};

/// Minimum columns per wavefront lane for the split to pay off.
const MIN_COLUMNS_PER_LANE: usize = 16;

/// Tuning knobs for one engine instance
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Threads available for a single alignment's wavefront fill
    pub lanes: usize,
    /// Full-matrix byte budget; larger inputs use the bounded-memory tier
    pub memory_budget: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            lanes: 1,
            memory_budget: 256 * 1024 * 1024,
        }
    }
}

/// One construction strategy in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    LowMemory,
    Wavefront,
    Sequential,
}

/// Computes optimal local alignments behind a tiered fallback chain.
pub struct AlignmentEngine {
    options: EngineOptions,
}

impl AlignmentEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    /// Compute the optimal local alignment for one pair.
    ///
    /// Fails only when both inputs are empty or every tier in the chain
    /// fails. A single empty side yields the score-0 empty alignment.
    pub fn align(
        &self,
        query: &str,
        target: &str,
        scoring: &ScoringScheme,
    ) -> ComputeResult<AlignmentResult> {
        if query.is_empty() && target.is_empty() {
            return Err(ComputeError::InvalidInput(
                "both sequences are empty".to_string(),
            ));
        }

        let query = query.as_bytes();
        let target = target.as_bytes();

        for tier in self.tier_chain(query.len(), target.len()) {
            match Self::run_tier(tier, query, target, scoring, self.options.lanes) {
                Ok(result) => return Ok(result),
                Err(error) => {
                    log::warn!(
                        "{:?} tier failed for {}x{} pair, falling back: {}",
                        tier,
                        query.len(),
                        target.len(),
                        error
                    );
                }
            }
        }

        Err(ComputeError::TiersExhausted)
    }

    /// Compute up to `k` alignments ordered by descending score.
    ///
    /// The scan needs the whole surface, so the bounded-memory tier does
    /// not participate; the full-matrix tiers fall back among themselves.
    pub fn align_top_k(
        &self,
        query: &str,
        target: &str,
        scoring: &ScoringScheme,
        k: usize,
    ) -> ComputeResult<Vec<AlignmentResult>> {
        if query.is_empty() && target.is_empty() {
            return Err(ComputeError::InvalidInput(
                "both sequences are empty".to_string(),
            ));
        }

        let query = query.as_bytes();
        let target = target.as_bytes();
        let lanes = self.wavefront_lanes(query.len());

        let scan = |lanes: usize| -> Vec<AlignmentResult> {
            let matrix = if lanes >= 2 {
                ScoreMatrix::wavefront(query, target, scoring, lanes)
            } else {
                ScoreMatrix::sequential(query, target, scoring)
            };
            traceback::top_alignments(&matrix, query, target, scoring, k)
        };

        if lanes >= 2 {
            match panic::catch_unwind(AssertUnwindSafe(|| scan(lanes))) {
                Ok(results) => return Ok(results),
                Err(payload) => {
                    log::warn!(
                        "wavefront top-{} scan failed, falling back to sequential: {}",
                        k,
                        panic_message(payload)
                    );
                }
            }
        }

        match panic::catch_unwind(AssertUnwindSafe(|| scan(1))) {
            Ok(results) => Ok(results),
            Err(payload) => Err(ComputeError::TierFailure(panic_message(payload))),
        }
    }

    /// Fallback chain for one input, most resource-efficient tier first.
    fn tier_chain(&self, query_len: usize, target_len: usize) -> Vec<Tier> {
        let full_bytes = (query_len + 1) * (target_len + 1) * std::mem::size_of::<i32>();

        let mut chain = Vec::with_capacity(3);
        if full_bytes > self.options.memory_budget {
            chain.push(Tier::LowMemory);
        }
        if self.wavefront_lanes(query_len) >= 2 {
            chain.push(Tier::Wavefront);
        }
        chain.push(Tier::Sequential);
        chain
    }

    /// Lanes the wavefront fill would profitably use for this query width.
    fn wavefront_lanes(&self, query_len: usize) -> usize {
        self.options.lanes.min(query_len / MIN_COLUMNS_PER_LANE)
    }

    /// Run one tier with a panic boundary.
    fn run_tier(
        tier: Tier,
        query: &[u8],
        target: &[u8],
        scoring: &ScoringScheme,
        lanes: usize,
    ) -> ComputeResult<AlignmentResult> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match tier {
            Tier::LowMemory => matrix::align_low_memory(query, target, scoring),
            Tier::Wavefront => Ok(align_full(
                &ScoreMatrix::wavefront(query, target, scoring, lanes),
                query,
                target,
                scoring,
            )),
            Tier::Sequential => Ok(align_full(
                &ScoreMatrix::sequential(query, target, scoring),
                query,
                target,
                scoring,
            )),
        }));

        match outcome {
            Ok(result) => result,
            Err(payload) => Err(ComputeError::TierFailure(panic_message(payload))),
        }
    }
}

/// Locate the maximum cell of a completed surface and trace from it.
fn align_full(
    matrix: &ScoreMatrix,
    query: &[u8],
    target: &[u8],
    scoring: &ScoringScheme,
) -> AlignmentResult {
    let (score, end) = matrix.max_cell();
    if score == 0 {
        return AlignmentResult::empty();
    }

    let (x, y) = matrix::coord(end, matrix.width());
    let (aligned_query, aligned_target) = traceback::trace_from(
        matrix.cells(),
        matrix.width(),
        matrix.height(),
        query,
        target,
        x,
        y,
        scoring,
    );

    AlignmentResult {
        aligned_query,
        aligned_target,
        score,
        end_x: x,
        end_y: y,
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "computation panicked".to_string()
    }
}
