//! Per-tick records and deterministic digests
//!
//! Every tick produces a record of what was admitted and how each thread
//! step ended, plus a Blake3 digest over the deterministic fields.
//! Identically driven projects must produce identical digest streams;
//! that is the replayability check the rest of the platform leans on.

use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ScriptFault;
use super::instance::InstanceId;
use super::script::BodyId;
use super::thread::GroupId;

/// How one execution opportunity ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepDisposition {
    /// Body ran to normal completion
    Completed,
    /// Body yielded at a suspension point
    Suspended,
    /// Forced end: instance removed or unrecovered script error
    Terminated,
}

/// Trace of one thread's execution opportunity within a tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTrace {
    /// Group the thread belongs to
    pub group: GroupId,
    /// Instance the thread ran against
    pub instance: InstanceId,
    /// Handler body executed
    pub body: BodyId,
    /// How the opportunity ended
    pub outcome: StepDisposition,
}

/// Complete record of one tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickRecord {
    /// Tick sequence number (0 for the first tick)
    pub seq: u64,
    /// Groups admitted at the start of this tick, in admission order
    pub admitted: Vec<GroupId>,
    /// Every execution opportunity given, in order
    pub steps: Vec<StepTrace>,
    /// Unrecovered script errors raised during this tick
    pub faults: Vec<ScriptFault>,
    /// Active performances observed by the end-of-tick external poll
    pub active_performances: usize,
    /// Digest over the deterministic fields
    pub digest: String,
    /// Debug timestamp (not part of the digest)
    pub timestamp: DateTime<Utc>,
}

impl TickRecord {
    /// Build a record, computing its digest
    pub fn new(
        seq: u64,
        admitted: Vec<GroupId>,
        steps: Vec<StepTrace>,
        faults: Vec<ScriptFault>,
        active_performances: usize,
    ) -> Self {
        let digest = compute_tick_digest(seq, &admitted, &steps, &faults);
        Self {
            seq,
            admitted,
            steps,
            faults,
            active_performances,
            digest,
            timestamp: Utc::now(),
        }
    }
}

/// Compute a deterministic digest for one tick
///
/// Hashes the canonical JSON encoding of everything except the timestamp
/// and the externally-owned performance count.
pub fn compute_tick_digest(
    seq: u64,
    admitted: &[GroupId],
    steps: &[StepTrace],
    faults: &[ScriptFault],
) -> String {
    let mut hasher = Hasher::new();
    hasher.update(&seq.to_le_bytes());

    if let Ok(bytes) = serde_json::to_vec(admitted) {
        hasher.update(&bytes);
    }
    if let Ok(bytes) = serde_json::to_vec(steps) {
        hasher.update(&bytes);
    }
    if let Ok(bytes) = serde_json::to_vec(faults) {
        hasher.update(&bytes);
    }

    format!("tick_{}", hasher.finalize().to_hex())
}
