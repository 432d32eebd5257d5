//! Alignment recovery from a score surface
//!
//! Walks a completed (or ring-resident) matrix backward from an end
//! coordinate, rebuilding the two aligned strings. The walk is iterative
//! with reversed-buffer accumulation so arbitrarily long alignments cannot
//! exhaust the call stack.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use itertools::Itertools;

use super::matrix::{self, ScoreMatrix};
use super::{AlignmentResult, ScoringScheme, GAP};

/// Reconstruct the alignment ending at `(end_x, end_y)`.
///
/// `window` is the number of resident rows; row addresses are reduced
/// modulo it, so passing the full matrix height makes this a plain
/// full-matrix walk. The walk stops at a zero cell or a border.
///
/// Predecessor priority is fixed and identical for every construction
/// strategy: the diagonal move first, then the query-consuming gap move
/// (gap emitted into the aligned target), then the target-consuming one.
#[allow(clippy::too_many_arguments)]
pub fn trace_from(
    cells: &[i32],
    width: usize,
    window: usize,
    query: &[u8],
    target: &[u8],
    end_x: usize,
    end_y: usize,
    scoring: &ScoringScheme,
) -> (String, String) {
    let mut query_rev = Vec::new();
    let mut target_rev = Vec::new();

    let mut x = end_x;
    let mut y = end_y;

    while x > 0 && y > 0 {
        let score = cells[matrix::index(x, y % window, width)];
        if score == 0 {
            break;
        }

        let sub = scoring.substitution(query[x - 1], target[y - 1]);
        if score == cells[matrix::index(x - 1, (y - 1) % window, width)] + sub {
            query_rev.push(query[x - 1]);
            target_rev.push(target[y - 1]);
            x -= 1;
            y -= 1;
        } else if score == cells[matrix::index(x - 1, y % window, width)] - scoring.gap_penalty {
            query_rev.push(query[x - 1]);
            target_rev.push(GAP);
            x -= 1;
        } else {
            query_rev.push(GAP);
            target_rev.push(target[y - 1]);
            y -= 1;
        }
    }

    query_rev.reverse();
    target_rev.reverse();

    (
        String::from_utf8_lossy(&query_rev).into_owned(),
        String::from_utf8_lossy(&target_rev).into_owned(),
    )
}

/// Recover up to `k` distinct-endpoint alignments, best score first.
///
/// A bounded min-heap over `(score, linear index)` is maintained during one
/// scan of the matrix; a cell only displaces the heap minimum when its
/// score is strictly greater, so for `k = 1` the retained cell is exactly
/// the single-best scan result. Order among equal scores is unspecified.
pub fn top_alignments(
    matrix: &ScoreMatrix,
    query: &[u8],
    target: &[u8],
    scoring: &ScoringScheme,
    k: usize,
) -> Vec<AlignmentResult> {
    if k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Reverse<(i32, usize)>> = BinaryHeap::with_capacity(k);
    for (i, &value) in matrix.cells().iter().enumerate() {
        if value == 0 {
            continue;
        }
        if heap.len() < k {
            heap.push(Reverse((value, i)));
        } else if let Some(&Reverse((lowest, _))) = heap.peek() {
            if value > lowest {
                heap.pop();
                heap.push(Reverse((value, i)));
            }
        }
    }

    heap.into_iter()
        .map(|Reverse(entry)| entry)
        .sorted_by(|a, b| b.0.cmp(&a.0))
        .map(|(score, end)| {
            let (x, y) = matrix::coord(end, matrix.width());
            let (aligned_query, aligned_target) = trace_from(
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
        })
        .collect()
}
