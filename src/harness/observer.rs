//! Visualization Adapters
//!
//! Read-only views over [`TickSnapshot`]s. Nothing here can reach back into
//! the simulation; renderers get positions and profile data, never state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::race::roster::ParticipantId;
use crate::race::scheduler::EventKind;
use crate::race::state::TickSnapshot;

/// Lanes stop short of the finish line so the marble stays on screen.
pub const LANE_FRACTION_CAP: f64 = 0.95;

// =============================================================================
// PROFILES
// =============================================================================

/// Display data for one entrant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayProfile {
    /// Display name.
    pub name: String,
    /// Social handle, e.g. `@vitalik`.
    pub handle: String,
    /// CSS color, e.g. `#34C759`.
    pub color: String,
}

impl DisplayProfile {
    /// Generic profile for entrants the directory does not know.
    pub fn placeholder(id: ParticipantId) -> Self {
        const PALETTE: [&str; 5] = ["#FF3B30", "#007AFF", "#34C759", "#FF9500", "#AF52DE"];
        Self {
            name: format!("marble {}", id.0),
            handle: format!("@marble{}", id.0),
            color: PALETTE[id.0 as usize % PALETTE.len()].to_string(),
        }
    }
}

/// Identity collaborator. Consumed only by views.
pub trait ProfileDirectory: Send + Sync {
    /// Profile for a participant, if known.
    fn profile(&self, id: ParticipantId) -> Option<DisplayProfile>;
}

/// In-memory directory.
#[derive(Clone, Debug, Default)]
pub struct StaticProfiles {
    profiles: BTreeMap<ParticipantId, DisplayProfile>,
}

impl StaticProfiles {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a profile.
    pub fn insert(&mut self, id: ParticipantId, profile: DisplayProfile) {
        self.profiles.insert(id, profile);
    }
}

impl ProfileDirectory for StaticProfiles {
    fn profile(&self, id: ParticipantId) -> Option<DisplayProfile> {
        self.profiles.get(&id).cloned()
    }
}

// =============================================================================
// LANE VIEW
// =============================================================================

/// One row of the 2D timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneRow {
    /// Entrant.
    pub participant: ParticipantId,
    /// 1-based standing.
    pub rank: usize,
    /// Track units covered.
    pub position: f64,
    /// Position as a fraction of the track, capped at [`LANE_FRACTION_CAP`].
    pub lane_fraction: f64,
    /// Active event, for badges.
    pub event: Option<EventKind>,
    /// Display data.
    pub profile: DisplayProfile,
}

/// 2D timeline view: lanes plus live standings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneView {
    /// Tick shown.
    pub tick: u32,
    /// Rows in standings order.
    pub rows: Vec<LaneRow>,
}

impl LaneView {
    /// Build the view for one snapshot.
    pub fn from_snapshot(snapshot: &TickSnapshot, track_length: f64, profiles: &dyn ProfileDirectory) -> Self {
        let rows = snapshot
            .standings()
            .into_iter()
            .enumerate()
            .map(|(i, (participant, position))| LaneRow {
                participant,
                rank: i + 1,
                position,
                lane_fraction: lane_fraction(position, track_length),
                event: snapshot.active_events.get(&participant).copied(),
                profile: profiles
                    .profile(participant)
                    .unwrap_or_else(|| DisplayProfile::placeholder(participant)),
            })
            .collect();

        Self { tick: snapshot.tick, rows }
    }

    /// Current leader.
    pub fn leader(&self) -> Option<&LaneRow> {
        self.rows.first()
    }
}

fn lane_fraction(position: f64, track_length: f64) -> f64 {
    if track_length <= 0.0 {
        return 0.0;
    }
    (position / track_length).clamp(0.0, LANE_FRACTION_CAP)
}

// =============================================================================
// FRAME INTERPOLATION
// =============================================================================

/// Smooths tick-rate positions for frame-rate renderers.
///
/// Keeps the last two snapshots and blends between them by the time elapsed
/// since the newer one arrived.
#[derive(Clone, Debug)]
pub struct FrameInterpolator {
    tick_duration: Duration,
    previous: Option<Arc<TickSnapshot>>,
    current: Option<Arc<TickSnapshot>>,
}

impl FrameInterpolator {
    /// Interpolator for a given tick duration.
    pub fn new(tick_duration: Duration) -> Self {
        Self {
            tick_duration,
            previous: None,
            current: None,
        }
    }

    /// Feed the next snapshot.
    pub fn push(&mut self, snapshot: Arc<TickSnapshot>) {
        self.previous = self.current.replace(snapshot);
    }

    /// Tick of the newest snapshot.
    pub fn latest_tick(&self) -> Option<u32> {
        self.current.as_ref().map(|s| s.tick)
    }

    /// Blended positions, `elapsed` after the newest snapshot arrived.
    pub fn frame(&self, elapsed: Duration) -> BTreeMap<ParticipantId, f64> {
        let Some(current) = self.current.as_ref() else {
            return BTreeMap::new();
        };
        let Some(previous) = self.previous.as_ref() else {
            return current.positions.clone();
        };

        let alpha = self.alpha(elapsed);
        current
            .positions
            .iter()
            .map(|(id, to)| {
                let from = previous.position(*id).unwrap_or(*to);
                (*id, from + (to - from) * alpha)
            })
            .collect()
    }

    /// Commanded speed in track units per second, for physics-styled views.
    pub fn commanded_speed(&self, id: ParticipantId) -> Option<f64> {
        let current = self.current.as_ref()?.position(id)?;
        let previous = self.previous.as_ref()?.position(id)?;
        let secs = self.tick_duration.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        Some((current - previous) / secs)
    }

    fn alpha(&self, elapsed: Duration) -> f64 {
        let period = self.tick_duration.as_secs_f64();
        if period <= 0.0 {
            return 1.0;
        }
        (elapsed.as_secs_f64() / period).clamp(0.0, 1.0)
    }
}
