//! Participant identifiers and roster validation.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::hash::{StateHash, StateHasher};

/// Largest roster accepted by [`Roster::new`].
pub const MAX_PARTICIPANTS: usize = 64;

// =============================================================================
// PARTICIPANT ID
// =============================================================================

/// Stable ordinal assigned when the lobby closes (0..N-1).
///
/// Outcomes depend only on this ordinal and the seed, never on display
/// metadata. Implements Ord for deterministic BTreeMap ordering and for
/// ascending-id tie-breaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u32);

impl ParticipantId {
    /// Create from an ordinal.
    pub const fn new(ordinal: u32) -> Self {
        Self(ordinal)
    }

    /// Raw ordinal.
    pub const fn ordinal(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for ParticipantId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

// =============================================================================
// ROSTER
// =============================================================================

/// Roster rejected before tick 0.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    /// No participants.
    #[error("roster is empty")]
    Empty,

    /// Same id listed twice.
    #[error("participant {0} appears more than once")]
    Duplicate(ParticipantId),

    /// Ids are not exactly 0..N-1.
    #[error("participant ids must be contiguous from 0: expected {expected}, found {found}")]
    Gap {
        /// Ordinal that should have been present.
        expected: ParticipantId,
        /// Ordinal found in its place.
        found: ParticipantId,
    },

    /// More than [`MAX_PARTICIPANTS`] entrants.
    #[error("roster has {0} participants, max is {MAX_PARTICIPANTS}")]
    TooLarge(usize),
}

/// Validated, immutable list of race entrants in ascending id order.
///
/// Deserialization runs the same validation as [`Roster::new`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ParticipantId>", into = "Vec<ParticipantId>")]
pub struct Roster {
    ids: Vec<ParticipantId>,
}

impl Roster {
    /// Validate a roster.
    ///
    /// Input order does not matter; the stored order is ascending.
    pub fn new(ids: &[ParticipantId]) -> Result<Self, RosterError> {
        if ids.is_empty() {
            return Err(RosterError::Empty);
        }
        if ids.len() > MAX_PARTICIPANTS {
            return Err(RosterError::TooLarge(ids.len()));
        }

        let mut sorted = ids.to_vec();
        sorted.sort_unstable();

        for pair in sorted.windows(2) {
            if pair[0] == pair[1] {
                return Err(RosterError::Duplicate(pair[0]));
            }
        }

        for (expected, found) in sorted.iter().enumerate() {
            let expected = ParticipantId(expected as u32);
            if *found != expected {
                return Err(RosterError::Gap { expected, found: *found });
            }
        }

        Ok(Self { ids: sorted })
    }

    /// Roster `0..count`.
    pub fn with_count(count: u32) -> Result<Self, RosterError> {
        let ids: Vec<ParticipantId> = (0..count).map(ParticipantId).collect();
        Self::new(&ids)
    }

    /// Participants in ascending order.
    pub fn ids(&self) -> &[ParticipantId] {
        &self.ids
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always false for a validated roster.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Hash of the roster, used in commitments and auxiliary seed entropy.
    pub fn fingerprint(&self) -> StateHash {
        let mut hasher = StateHasher::new(b"MARBLE_RACE_ROSTER_V1");
        hasher.update_u32(self.ids.len() as u32);
        for id in &self.ids {
            hasher.update_u32(id.0);
        }
        hasher.finalize()
    }
}

impl TryFrom<Vec<ParticipantId>> for Roster {
    type Error = RosterError;

    fn try_from(ids: Vec<ParticipantId>) -> Result<Self, Self::Error> {
        Self::new(&ids)
    }
}

impl From<Roster> for Vec<ParticipantId> {
    fn from(roster: Roster) -> Self {
        roster.ids
    }
}
