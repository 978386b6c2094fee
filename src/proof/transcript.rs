//! Race Transcript Recording
//!
//! Records everything needed to verify a race after the seed is revealed.
//! Snapshots themselves are not stored: a Merkle root over the history
//! commits to them, and replay regenerates them.

use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::hash::StateHash;
use crate::core::seed::Seed;
use crate::proof::commitment::RaceCommitment;
use crate::proof::merkle::{MerkleProof, MerkleTree};
use crate::race::config::RaceConfig;
use crate::race::events::{RaceEvent, RaceEventData};
use crate::race::resolver::{ResolutionReason, TerminalRecord};
use crate::race::roster::{ParticipantId, Roster};
use crate::race::state::TickSnapshot;

/// Current transcript version.
pub const TRANSCRIPT_VERSION: u8 = 1;

/// Checkpoint interval in ticks (one second at the default 50 ms tick).
pub const CHECKPOINT_INTERVAL: u32 = 20;

/// Complete race transcript.
///
/// Contains all data needed to:
/// 1. Check the revealed inputs against the pre-race commitment
/// 2. Deterministically replay the race
/// 3. Check checkpoints, history root and final state hash
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceTranscript {
    /// Version for forward compatibility.
    pub version: u8,

    /// Revealed inputs and the commitment they must match.
    pub metadata: RaceMetadata,

    /// State hash checkpoints (every [`CHECKPOINT_INTERVAL`] ticks).
    pub checkpoints: Vec<StateCheckpoint>,

    /// Significant events (starts, finishes, resolution, abort).
    pub events: Vec<RaceEvent>,

    /// Final result, once finalized.
    pub result: Option<TranscriptResult>,
}

/// Race metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceMetadata {
    /// Race identifier.
    pub race_id: Uuid,
    /// Revealed seed.
    pub seed: Seed,
    /// Entrants.
    pub roster: Roster,
    /// Rules the race ran under.
    pub config: RaceConfig,
    /// Commitment published before tick 1.
    pub commitment: RaceCommitment,
}

/// State hash checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCheckpoint {
    /// Tick number.
    pub tick: u32,
    /// State hash after the tick.
    pub state_hash: StateHash,
}

/// How the race ended, without the history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscriptOutcome {
    /// Winner declared.
    Resolved {
        /// Winning participant.
        winner: ParticipantId,
        /// Tick the race resolved on.
        final_tick: u32,
        /// Finish or timeout.
        reason: ResolutionReason,
    },
    /// Race cancelled.
    Aborted {
        /// Last processed tick.
        tick: u32,
    },
}

impl TranscriptOutcome {
    /// Summarize a terminal record.
    pub fn from_record(record: &TerminalRecord) -> Self {
        match record {
            TerminalRecord::Resolved(result) => TranscriptOutcome::Resolved {
                winner: result.winner,
                final_tick: result.final_tick,
                reason: result.resolution_reason,
            },
            TerminalRecord::Aborted(aborted) => TranscriptOutcome::Aborted { tick: aborted.tick },
        }
    }

    /// Last processed tick.
    pub fn final_tick(&self) -> u32 {
        match self {
            TranscriptOutcome::Resolved { final_tick, .. } => *final_tick,
            TranscriptOutcome::Aborted { tick } => *tick,
        }
    }
}

/// Final transcript result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// How the race ended.
    pub outcome: TranscriptOutcome,
    /// Merkle root over the bincode encoding of every snapshot, tick 0 first.
    pub history_root: StateHash,
    /// Hash of the terminal state.
    pub final_state_hash: StateHash,
}

impl RaceTranscript {
    /// Start a transcript for a committed race.
    pub fn new(metadata: RaceMetadata) -> Self {
        Self {
            version: TRANSCRIPT_VERSION,
            metadata,
            checkpoints: Vec::new(),
            events: Vec::new(),
            result: None,
        }
    }

    /// Record one processed tick.
    pub fn record_tick(&mut self, tick: u32, state_hash: StateHash, events: &[RaceEvent]) {
        if tick % CHECKPOINT_INTERVAL == 0 {
            self.checkpoints.push(StateCheckpoint { tick, state_hash });
        }

        // Expiries are implied by the started event's expiry tick
        self.events.extend(
            events
                .iter()
                .filter(|e| !matches!(e.data, RaceEventData::EventExpired { .. }))
                .cloned(),
        );
    }

    /// Seal the transcript with the terminal record.
    pub fn finalize(
        &mut self,
        record: &TerminalRecord,
        history: &[TickSnapshot],
        final_state_hash: StateHash,
    ) -> Result<(), TranscriptError> {
        if self.result.is_some() {
            return Err(TranscriptError::AlreadyFinalized);
        }

        let outcome = TranscriptOutcome::from_record(record);
        if let TranscriptOutcome::Aborted { tick } = outcome {
            self.events.push(RaceEvent::aborted(tick));
        }

        self.result = Some(TranscriptResult {
            outcome,
            history_root: history_root(history)?,
            final_state_hash,
        });
        Ok(())
    }

    /// Has the transcript been finalized?
    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    /// Serialize to compact binary format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TranscriptError> {
        bincode::serialize(self).map_err(|e| TranscriptError::Encode(e.to_string()))
    }

    /// Deserialize from binary format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TranscriptError> {
        bincode::deserialize(bytes).map_err(|e| TranscriptError::Decode(e.to_string()))
    }
}

// =============================================================================
// HISTORY COMMITMENT
// =============================================================================

/// Canonical leaf encoding of one snapshot.
pub fn snapshot_leaf(snapshot: &TickSnapshot) -> Result<Vec<u8>, TranscriptError> {
    bincode::serialize(snapshot).map_err(|e| TranscriptError::Encode(e.to_string()))
}

/// Merkle tree over a snapshot history.
pub fn history_tree(history: &[TickSnapshot]) -> Result<MerkleTree, TranscriptError> {
    let leaves = history
        .iter()
        .map(snapshot_leaf)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MerkleTree::from_leaves(&leaves))
}

/// Merkle root over a snapshot history.
pub fn history_root(history: &[TickSnapshot]) -> Result<StateHash, TranscriptError> {
    Ok(history_tree(history)?.root())
}

/// Inclusion proof for the snapshot at `tick`.
pub fn prove_snapshot(history: &[TickSnapshot], tick: u32) -> Result<Option<MerkleProof>, TranscriptError> {
    Ok(history_tree(history)?.generate_proof(tick as usize))
}

/// Check a single published snapshot against a transcript's history root.
pub fn verify_snapshot(root: &StateHash, proof: &MerkleProof, snapshot: &TickSnapshot) -> Result<bool, TranscriptError> {
    if proof.leaf_index != snapshot.tick as usize {
        return Ok(false);
    }
    Ok(MerkleTree::verify_proof(root, proof, &snapshot_leaf(snapshot)?))
}

/// Transcript errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    /// bincode refused to encode.
    #[error("transcript encode failed: {0}")]
    Encode(String),

    /// Bytes are not a transcript.
    #[error("transcript decode failed: {0}")]
    Decode(String),

    /// `finalize` called twice.
    #[error("transcript already finalized")]
    AlreadyFinalized,
}
