//! Race State Definitions
//!
//! All state types for race simulation.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, to_float};
use crate::core::hash::{StateHash, StateHasher, compute_state_hash};
use crate::core::seed::Seed;
use crate::race::resolver::RaceStatus;
use crate::race::roster::{ParticipantId, Roster};
use crate::race::scheduler::{EventKind, EventRecord};

// =============================================================================
// LANE STATE
// =============================================================================

/// State of a single participant's lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneState {
    /// Progress along the track, always in `[0, track_length]`.
    pub progress: Fixed,

    /// Event currently attached to the lane.
    pub event: Option<EventRecord>,

    /// Recovery multiplier applies while `tick < recovery_until`.
    pub recovery_until: u32,
}

impl LaneState {
    /// Is the lane recovering at `tick`?
    #[inline]
    pub fn is_recovering(&self, tick: u32) -> bool {
        tick < self.recovery_until
    }

    /// Has the lane crossed the finish line?
    #[inline]
    pub fn has_finished(&self, track_length: Fixed) -> bool {
        self.progress >= track_length
    }

    fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_fixed(self.progress);
        match &self.event {
            Some(event) => {
                hasher.update_bool(true);
                hasher.update_u8(event.kind as u8);
                hasher.update_fixed(event.multiplier);
                hasher.update_u32(event.started_tick);
                hasher.update_u32(event.expiry_tick);
            }
            None => hasher.update_bool(false),
        }
        hasher.update_u32(self.recovery_until);
    }
}

// =============================================================================
// LEADER SUMMARY
// =============================================================================

/// Who is ahead, read from the previous tick's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaderSummary {
    /// Leading participant (lowest id among equals).
    pub leader: ParticipantId,
    /// Leader's progress.
    pub progress: Fixed,
}

// =============================================================================
// RACE STATE
// =============================================================================

/// Complete race state.
///
/// Exclusively owned and advanced by [`RaceEngine`](crate::race::tick::RaceEngine).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceState {
    /// Last processed tick (0 = start line).
    pub tick: u32,

    /// Per-participant lanes (BTreeMap for deterministic iteration).
    pub lanes: BTreeMap<ParticipantId, LaneState>,

    /// Resolution status.
    pub status: RaceStatus,
}

impl RaceState {
    /// Everyone on the start line at tick 0.
    pub fn new(roster: &Roster) -> Self {
        let lanes = roster
            .ids()
            .iter()
            .map(|id| (*id, LaneState::default()))
            .collect();

        Self {
            tick: 0,
            lanes,
            status: RaceStatus::Pending,
        }
    }

    /// Get a lane by participant.
    pub fn lane(&self, id: ParticipantId) -> Option<&LaneState> {
        self.lanes.get(&id)
    }

    /// Highest progress, lowest id on ties.
    pub fn leader(&self) -> Option<LeaderSummary> {
        let mut best: Option<LeaderSummary> = None;
        for (id, lane) in &self.lanes {
            // Ascending iteration + strict comparison keeps the lowest id
            if best.map_or(true, |b| lane.progress > b.progress) {
                best = Some(LeaderSummary { leader: *id, progress: lane.progress });
            }
        }
        best
    }

    /// Is the race over?
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Immutable view handed to observers.
    pub fn snapshot(&self) -> TickSnapshot {
        let positions = self
            .lanes
            .iter()
            .map(|(id, lane)| (*id, to_float(lane.progress)))
            .collect();

        let active_events = self
            .lanes
            .iter()
            .filter_map(|(id, lane)| {
                lane.event
                    .filter(|event| event.is_active(self.tick))
                    .map(|event| (*id, event.kind))
            })
            .collect();

        TickSnapshot {
            tick: self.tick,
            positions,
            active_events,
        }
    }

    /// Compute hash of current state for verification.
    pub fn compute_hash(&self, seed: &Seed) -> StateHash {
        compute_state_hash(self.tick, seed, |hasher| {
            hasher.update_u32(self.lanes.len() as u32);
            for (id, lane) in &self.lanes {
                hasher.update_u32(id.0);
                lane.hash_into(hasher);
            }
            self.status.hash_into(hasher);
        })
    }
}

// =============================================================================
// TICK SNAPSHOT
// =============================================================================

/// Per-tick stream element published to observers.
///
/// Positions are exact conversions of the Q16.16 progress values, so two
/// snapshots of the same tick are bit-identical.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickSnapshot {
    /// Tick index.
    pub tick: u32,
    /// Progress per participant.
    pub positions: BTreeMap<ParticipantId, f64>,
    /// Events in effect this tick.
    pub active_events: BTreeMap<ParticipantId, EventKind>,
}

impl TickSnapshot {
    /// Position of one participant.
    pub fn position(&self, id: ParticipantId) -> Option<f64> {
        self.positions.get(&id).copied()
    }

    /// Participants ordered by position, furthest first, lowest id on ties.
    pub fn standings(&self) -> Vec<(ParticipantId, f64)> {
        let mut order: Vec<(ParticipantId, f64)> =
            self.positions.iter().map(|(id, pos)| (*id, *pos)).collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        order
    }
}

// =============================================================================
// TESTS
// =============================================================================
