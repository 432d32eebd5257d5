//! Smith-Waterman score surface construction
//!
//! Builds the local-alignment scoring matrix for one query/target pair.
//! Three construction strategies are provided: a sequential fill, a
//! wavefront-parallel fill that splits the query axis into column lanes,
//! and a low-memory fill that retains only a ring of recent rows.
//!
//! The surface is addressed by `(x, y)` with `x` on the query axis
//! (`0 ..= query.len()`) and `y` on the target axis, stored row-major with
//! `width = query.len() + 1`. Border cells are zero and every interior cell
//! is floored at zero, which is what makes the alignment local.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use super::traceback;
use super::{AlignmentResult, ComputeError, ComputeResult, ScoringScheme};

/// Spin iterations between scheduler yields while waiting on a lane
/// neighbour.
const SPINS_PER_YIELD: u32 = 1024;

/// Convert matrix coordinates to a linear row-major index.
#[inline]
pub fn index(x: usize, y: usize, width: usize) -> usize {
    y * width + x
}

/// Convert a linear row-major index back to matrix coordinates.
#[inline]
pub fn coord(index: usize, width: usize) -> (usize, usize) {
    (index % width, index / width)
}

/// A fully retained score surface for one query/target pair.
pub struct ScoreMatrix {
    cells: Vec<i32>,
    width: usize,
    height: usize,
}

impl ScoreMatrix {
    /// Fill the matrix row by row on the calling thread.
    pub fn sequential(query: &[u8], target: &[u8], scoring: &ScoringScheme) -> Self {
        let width = query.len() + 1;
        let height = target.len() + 1;
        let mut cells = vec![0i32; width * height];

        for y in 1..height {
            for x in 1..width {
                let sub = scoring.substitution(query[x - 1], target[y - 1]);
                cells[index(x, y, width)] = (cells[index(x - 1, y - 1, width)] + sub)
                    .max(cells[index(x - 1, y, width)] - scoring.gap_penalty)
                    .max(cells[index(x, y - 1, width)] - scoring.gap_penalty)
                    .max(0);
            }
        }

        Self {
            cells,
            width,
            height,
        }
    }

    /// Fill the matrix with one thread per contiguous column lane.
    ///
    /// Cells on the same anti-diagonal are independent; a lane only depends
    /// on its left neighbour through `(x-1, y)` and `(x-1, y-1)`. Each lane
    /// sweeps its columns top to bottom and publishes a completed-row
    /// counter; lane `i` spins until lane `i-1` has finished the row it is
    /// about to start. Lane 0 never waits. The resulting surface is
    /// cell-for-cell identical to the sequential fill.
    pub fn wavefront(query: &[u8], target: &[u8], scoring: &ScoringScheme, lanes: usize) -> Self {
        let width = query.len() + 1;
        let height = target.len() + 1;
        let lanes = lanes.clamp(1, query.len().max(1));

        if lanes < 2 || query.is_empty() || target.is_empty() {
            return Self::sequential(query, target, scoring);
        }

        let mut cells = vec![0i32; width * height];
        let progress: Vec<AtomicUsize> = (0..lanes).map(|_| AtomicUsize::new(0)).collect();
        let shared = SharedCells(cells.as_mut_ptr());
        let scoring = *scoring;

        thread::scope(|scope| {
            for lane in 0..lanes {
                let first = lane * query.len() / lanes + 1;
                let last = (lane + 1) * query.len() / lanes + 1;
                let progress = &progress;
                let shared = shared;

                scope.spawn(move || {
                    // Capture the whole `SharedCells` (which is `Send`) rather
                    // than the bare `*mut i32` field under disjoint capture.
                    let shared = shared;
                    // Lanes write disjoint column bands; reads of the left
                    // neighbour's cells are ordered by its progress counter.
                    let cells =
                        unsafe { std::slice::from_raw_parts_mut(shared.0, width * height) };

                    for y in 1..height {
                        if lane > 0 {
                            let mut spins = 0u32;
                            while progress[lane - 1].load(Ordering::Acquire) < y {
                                std::hint::spin_loop();
                                spins += 1;
                                if spins % SPINS_PER_YIELD == 0 {
                                    thread::yield_now();
                                }
                            }
                        }

                        for x in first..last {
                            let sub = scoring.substitution(query[x - 1], target[y - 1]);
                            cells[index(x, y, width)] = (cells[index(x - 1, y - 1, width)] + sub)
                                .max(cells[index(x - 1, y, width)] - scoring.gap_penalty)
                                .max(cells[index(x, y - 1, width)] - scoring.gap_penalty)
                                .max(0);
                        }

                        progress[lane].store(y, Ordering::Release);
                    }
                });
            }
        });

        Self {
            cells,
            width,
            height,
        }
    }

    /// Cell value at `(x, y)`.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> i32 {
        self.cells[index(x, y, self.width)]
    }

    /// Matrix width (query length + 1).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Matrix height (target length + 1).
    pub fn height(&self) -> usize {
        self.height
    }

    /// The flat row-major cell storage.
    pub fn cells(&self) -> &[i32] {
        &self.cells
    }

    /// Maximum cell value and its linear index.
    ///
    /// Ties are broken by scan order: the first maximum in row-major order
    /// wins. All strategies and the top-K scan share this rule.
    pub fn max_cell(&self) -> (i32, usize) {
        let mut best = 0;
        let mut best_index = 0;
        for (i, &value) in self.cells.iter().enumerate() {
            if value > best {
                best = value;
                best_index = i;
            }
        }
        (best, best_index)
    }
}

/// Raw cell pointer shared between wavefront lanes.
///
/// Sound because lanes write disjoint column bands and cross-lane reads are
/// ordered by the acquire/release progress counters.
#[derive(Clone, Copy)]
struct SharedCells(*mut i32);

unsafe impl Send for SharedCells {}

/// Number of rows an optimal local alignment can span.
///
/// A local alignment scores at most `m * match_score` and every
/// target-consuming step costs `gap_penalty`, so a traceback never walks
/// back further than `m + ceil(m * match_score / gap_penalty)` rows. Two
/// extra rows cover the border and the predecessor probe of the terminal
/// cell.
fn row_window(query_len: usize, scoring: &ScoringScheme) -> usize {
    let gap = scoring.gap_penalty as usize;
    let matched = query_len * scoring.match_score.max(0) as usize;
    query_len + (matched + gap - 1) / gap + 2
}

/// Align within a bounded row window instead of retaining the full matrix.
///
/// Only the last `row_window` rows stay resident, addressed modulo the
/// window height. The running maximum is tracked during the fill; whenever
/// a strictly greater maximum appears, a traceback runs immediately against
/// the resident window and the best alignment found so far is kept. Because
/// recovered alignments are monotonically improving and no optimal path
/// spans more rows than the window holds, the final alignment equals the
/// full-matrix result.
pub fn align_low_memory(
    query: &[u8],
    target: &[u8],
    scoring: &ScoringScheme,
) -> ComputeResult<AlignmentResult> {
    if scoring.gap_penalty <= 0 {
        return Err(ComputeError::UnsupportedOperation(
            "bounded-memory fill requires a positive gap penalty".to_string(),
        ));
    }

    let width = query.len() + 1;
    let height = target.len() + 1;
    let window = row_window(query.len(), scoring).min(height);
    let mut cells = vec![0i32; width * window];

    let mut best = AlignmentResult::empty();

    for y in 1..height {
        let row = y % window;
        let prev = (y + window - 1) % window;

        let mut row_best = 0;
        let mut row_best_x = 0;
        for x in 1..width {
            let sub = scoring.substitution(query[x - 1], target[y - 1]);
            let value = (cells[index(x - 1, prev, width)] + sub)
                .max(cells[index(x - 1, row, width)] - scoring.gap_penalty)
                .max(cells[index(x, prev, width)] - scoring.gap_penalty)
                .max(0);
            cells[index(x, row, width)] = value;

            if value > row_best {
                row_best = value;
                row_best_x = x;
            }
        }

        // Trace while the rows the path runs through are still resident.
        if row_best > best.score {
            let (aligned_query, aligned_target) = traceback::trace_from(
                &cells,
                width,
                window,
                query,
                target,
                row_best_x,
                y,
                scoring,
            );
            best = AlignmentResult {
                aligned_query,
                aligned_target,
                score: row_best,
                end_x: row_best_x,
                end_y: y,
            };
        }
    }

    Ok(best)
}
