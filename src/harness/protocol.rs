//! Protocol Messages
//!
//! Wire format for race observers. JSON with a `type` tag; lanes are sent
//! as lists rather than id-keyed maps so every message parses back.

use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::seed::Seed;
use crate::proof::commitment::RaceCommitment;
use crate::race::resolver::{ResolutionReason, TerminalRecord};
use crate::race::roster::ParticipantId;
use crate::race::scheduler::EventKind;
use crate::race::state::TickSnapshot;

/// Messages sent to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RaceMessage {
    /// Commitment, before tick 1.
    Commit(CommitInfo),

    /// State after a tick.
    Tick(TickUpdate),

    /// Winner declared; seed revealed.
    Resolved(ResolvedInfo),

    /// Race cancelled.
    Aborted {
        /// Race identifier.
        race_id: Uuid,
        /// Last processed tick.
        tick: u32,
    },
}

/// Commitment announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Race identifier.
    pub race_id: Uuid,
    /// Commitment hash (hex).
    pub commitment: String,
    /// Seed commitment (hex).
    pub seed_commitment: String,
    /// Config hash (hex).
    pub config_hash: String,
    /// Unix milliseconds.
    pub committed_at_ms: i64,
}

/// Per-tick update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickUpdate {
    /// Race identifier.
    pub race_id: Uuid,
    /// Tick number.
    pub tick: u32,
    /// Lanes in id order.
    pub lanes: Vec<LaneUpdate>,
}

/// One lane in a tick update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneUpdate {
    /// Entrant.
    pub participant: ParticipantId,
    /// Track units covered.
    pub position: f64,
    /// Active event, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventKind>,
}

/// Resolution announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInfo {
    /// Race identifier.
    pub race_id: Uuid,
    /// Winning participant.
    pub winner: ParticipantId,
    /// Tick the race resolved on.
    pub final_tick: u32,
    /// Finish or timeout.
    pub resolution_reason: ResolutionReason,
    /// Revealed seed, so anyone can replay.
    pub seed: Seed,
}

impl RaceMessage {
    /// Commit message.
    pub fn commit(commitment: &RaceCommitment) -> Self {
        RaceMessage::Commit(CommitInfo {
            race_id: commitment.race_id,
            commitment: hex::encode(commitment.commitment_hash),
            seed_commitment: hex::encode(commitment.seed_commitment),
            config_hash: hex::encode(commitment.config_hash),
            committed_at_ms: commitment.committed_at_ms,
        })
    }

    /// Tick message.
    pub fn tick(race_id: Uuid, snapshot: &TickSnapshot) -> Self {
        RaceMessage::Tick(TickUpdate {
            race_id,
            tick: snapshot.tick,
            lanes: snapshot
                .positions
                .iter()
                .map(|(id, position)| LaneUpdate {
                    participant: *id,
                    position: *position,
                    event: snapshot.active_events.get(id).copied(),
                })
                .collect(),
        })
    }

    /// Final message for a terminal record.
    pub fn terminal(race_id: Uuid, record: &TerminalRecord, seed: Seed) -> Self {
        match record {
            TerminalRecord::Resolved(result) => RaceMessage::Resolved(ResolvedInfo {
                race_id,
                winner: result.winner,
                final_tick: result.final_tick,
                resolution_reason: result.resolution_reason,
                seed,
            }),
            TerminalRecord::Aborted(aborted) => RaceMessage::Aborted { race_id, tick: aborted.tick },
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
