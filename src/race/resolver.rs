//! Outcome Resolver
//!
//! ```text
//!            finish / timeout
//!  Pending ───────────────────▶ Resolved(outcome)
//!     │
//!     │ abort
//!     └───────────────────────▶ Aborted { tick }
//! ```
//!
//! Both exits are terminal. No further ticks are processed.

use serde::de::{self, Deserializer};
use serde::{Serialize, Deserialize};

use crate::core::fixed::Fixed;
use crate::core::hash::StateHasher;
use crate::race::roster::ParticipantId;
use crate::race::state::{RaceState, TickSnapshot};
use crate::race::tick::RaceError;

/// Why the race resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ResolutionReason {
    /// Someone reached the finish line.
    Finish = 0,
    /// Nobody finished by the timeout tick.
    Timeout = 1,
}

/// Winner and when.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceOutcome {
    /// Winning participant.
    pub winner: ParticipantId,
    /// Tick the race resolved on.
    pub final_tick: u32,
    /// Finish or timeout.
    pub resolution_reason: ResolutionReason,
}

/// Resolution status carried in [`RaceState`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceStatus {
    /// Still racing.
    #[default]
    Pending,
    /// A winner was declared.
    Resolved(RaceOutcome),
    /// Cancelled at `tick`; no winner, no payout.
    Aborted {
        /// Last processed tick.
        tick: u32,
    },
}

impl RaceStatus {
    /// Resolved or Aborted.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RaceStatus::Pending)
    }

    /// Short name for errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            RaceStatus::Pending => "pending",
            RaceStatus::Resolved(_) => "resolved",
            RaceStatus::Aborted { .. } => "aborted",
        }
    }

    pub(crate) fn hash_into(&self, hasher: &mut StateHasher) {
        match self {
            RaceStatus::Pending => hasher.update_u8(0),
            RaceStatus::Resolved(outcome) => {
                hasher.update_u8(1);
                hasher.update_u32(outcome.winner.0);
                hasher.update_u32(outcome.final_tick);
                hasher.update_u8(outcome.resolution_reason as u8);
            }
            RaceStatus::Aborted { tick } => {
                hasher.update_u8(2);
                hasher.update_u32(*tick);
            }
        }
    }
}

// =============================================================================
// TERMINAL RECORD
// =============================================================================

/// Terminal record of a resolved race.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    /// Winning participant.
    pub winner: ParticipantId,
    /// Tick the race resolved on.
    pub final_tick: u32,
    /// `"finish"` or `"timeout"`.
    pub resolution_reason: ResolutionReason,
    /// Every snapshot from tick 0 to `final_tick`.
    pub history: Vec<TickSnapshot>,
}

/// Terminal record of an aborted race. Serializes as `{"aborted": true, "tick": N}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortedRecord {
    /// Always true.
    pub aborted: bool,
    /// Last processed tick.
    pub tick: u32,
}

/// The one record emitted when a race ends.
///
/// Serializes as the bare inner record. Reading it back goes through a
/// flat struct rather than serde's untagged buffering, which cannot parse
/// the string map keys JSON writes for participant ids.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TerminalRecord {
    /// Winner declared.
    Resolved(RaceResult),
    /// Race cancelled.
    Aborted(AbortedRecord),
}

/// Union of both record shapes.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTerminalRecord {
    #[serde(default)]
    aborted: bool,
    tick: Option<u32>,
    winner: Option<ParticipantId>,
    final_tick: Option<u32>,
    resolution_reason: Option<ResolutionReason>,
    history: Option<Vec<TickSnapshot>>,
}

impl<'de> Deserialize<'de> for TerminalRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawTerminalRecord::deserialize(deserializer)?;

        if raw.aborted {
            let tick = raw.tick.ok_or_else(|| de::Error::missing_field("tick"))?;
            return Ok(TerminalRecord::aborted(tick));
        }

        Ok(TerminalRecord::Resolved(RaceResult {
            winner: raw.winner.ok_or_else(|| de::Error::missing_field("winner"))?,
            final_tick: raw.final_tick.ok_or_else(|| de::Error::missing_field("final_tick"))?,
            resolution_reason: raw
                .resolution_reason
                .ok_or_else(|| de::Error::missing_field("resolution_reason"))?,
            history: raw.history.ok_or_else(|| de::Error::missing_field("history"))?,
        }))
    }
}

impl TerminalRecord {
    /// Aborted record for `tick`.
    pub fn aborted(tick: u32) -> Self {
        TerminalRecord::Aborted(AbortedRecord { aborted: true, tick })
    }

    /// Result, if resolved.
    pub fn result(&self) -> Option<&RaceResult> {
        match self {
            TerminalRecord::Resolved(result) => Some(result),
            TerminalRecord::Aborted(_) => None,
        }
    }

    /// Winner, if resolved.
    pub fn winner(&self) -> Option<ParticipantId> {
        self.result().map(|r| r.winner)
    }

    /// Was the race aborted?
    pub fn is_aborted(&self) -> bool {
        matches!(self, TerminalRecord::Aborted(_))
    }

    /// Last processed tick.
    pub fn final_tick(&self) -> u32 {
        match self {
            TerminalRecord::Resolved(result) => result.final_tick,
            TerminalRecord::Aborted(record) => record.tick,
        }
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Applies the finish, timeout and abort transitions to a [`RaceState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutcomeResolver {
    track_length: Fixed,
    timeout_ticks: u32,
}

impl OutcomeResolver {
    /// Create a resolver for a track and timeout.
    pub fn new(track_length: Fixed, timeout_ticks: u32) -> Self {
        Self { track_length, timeout_ticks }
    }

    /// Evaluate the state after a tick has been applied.
    ///
    /// Finish rule first (lowest id among finishers), then the timeout rule
    /// (strictly highest progress, lowest id on ties). Returns the outcome
    /// when the race resolves on this tick.
    pub fn evaluate(&self, state: &mut RaceState) -> Result<Option<RaceOutcome>, RaceError> {
        ensure_pending(state)?;

        // BTreeMap iterates ascending, so the first finisher is the lowest id
        let finisher = state
            .lanes
            .iter()
            .find(|(_, lane)| lane.has_finished(self.track_length))
            .map(|(id, _)| *id);

        let outcome = if let Some(winner) = finisher {
            Some(RaceOutcome {
                winner,
                final_tick: state.tick,
                resolution_reason: ResolutionReason::Finish,
            })
        } else if state.tick >= self.timeout_ticks {
            state.leader().map(|leader| RaceOutcome {
                winner: leader.leader,
                final_tick: state.tick,
                resolution_reason: ResolutionReason::Timeout,
            })
        } else {
            None
        };

        if let Some(outcome) = outcome {
            state.status = RaceStatus::Resolved(outcome);
        }
        Ok(outcome)
    }

    /// Move a pending race to Aborted at its current tick.
    pub fn abort(&self, state: &mut RaceState) -> Result<u32, RaceError> {
        ensure_pending(state)?;
        state.status = RaceStatus::Aborted { tick: state.tick };
        Ok(state.tick)
    }

    /// Timeout tick.
    pub fn timeout_ticks(&self) -> u32 {
        self.timeout_ticks
    }
}

fn ensure_pending(state: &RaceState) -> Result<(), RaceError> {
    if state.status.is_terminal() {
        return Err(RaceError::AlreadyTerminal {
            tick: state.tick,
            status: state.status.name(),
        });
    }
    Ok(())
}
