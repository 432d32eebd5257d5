//! Coordinator wire model
//!
//! Serde types exchanged with the coordinator. Sequence identifiers are
//! opaque coordinator-issued strings; uniqueness is scoped to one work
//! package.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engines::compute::{AlignmentResult, ScoringScheme};

/// A residue string, owned by the work package that carries it.
pub type Sequence = String;

/// Opaque identifier used as a sequence map key.
pub type SequenceId = String;

/// Coordinator-issued worker identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerId {
    pub id: String,
}

/// Capability and benchmark report sent once, at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityReport {
    /// Sustained cell updates per second measured by the probe
    pub benchmark_result: u64,
    /// Logical CPU count of the host
    pub cpu_cores: usize,
}

/// One unit of work: align this query against this target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryTargetPair {
    pub query: SequenceId,
    pub target: SequenceId,
}

/// A batch of pairs handed out by one poll.
///
/// The sequence map may arrive fully inlined or empty; an empty map means
/// the sequences are fetched lazily before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkPackage {
    pub id: String,
    pub job_id: String,
    pub match_score: i32,
    pub mismatch_penalty: i32,
    pub gap_penalty: i32,
    pub pairs: Vec<QueryTargetPair>,
    #[serde(default)]
    pub sequences: HashMap<SequenceId, Sequence>,
}

impl WorkPackage {
    /// The scoring scheme this package's alignments must use.
    pub fn scoring(&self) -> ScoringScheme {
        ScoringScheme {
            match_score: self.match_score,
            mismatch_penalty: self.mismatch_penalty,
            gap_penalty: self.gap_penalty,
        }
    }
}

/// One computed alignment in coordinator form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alignment {
    pub query_alignment: String,
    pub target_alignment: String,
    pub score: i32,
    pub length: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl From<&AlignmentResult> for Alignment {
    fn from(result: &AlignmentResult) -> Self {
        Self {
            query_alignment: result.aligned_query.clone(),
            target_alignment: result.aligned_target.clone(),
            score: result.score,
            length: result.aligned_query.len(),
            max_x: result.end_x,
            max_y: result.end_y,
        }
    }
}

/// One outcome for one pair, successful or not.
///
/// A failed pair keeps its identity in the batch so the coordinator's
/// expected output counts stay intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentRecord {
    pub pair: QueryTargetPair,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AlignmentRecord {
    pub fn success(pair: QueryTargetPair, alignment: Alignment) -> Self {
        Self {
            pair,
            alignment: Some(alignment),
            error: None,
        }
    }

    pub fn failure(pair: QueryTargetPair, error: String) -> Self {
        Self {
            pair,
            alignment: None,
            error: Some(error),
        }
    }
}

/// One submitted batch of records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkResult {
    pub alignments: Vec<AlignmentRecord>,
}
