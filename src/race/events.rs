//! Race Events
//!
//! Notable things that happened during a tick, for observers, logs and
//! transcripts. Events are derived output only; nothing reads them back
//! into the simulation.

use serde::{Serialize, Deserialize};

use crate::core::fixed::Fixed;
use crate::race::resolver::ResolutionReason;
use crate::race::roster::ParticipantId;
use crate::race::scheduler::{EventKind, EventRecord};

/// Race event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceEventData {
    /// A boost, crash or fall-off started.
    EventStarted {
        /// Event kind.
        kind: EventKind,
        /// Speed multiplier while active.
        multiplier: Fixed,
        /// First tick without the event.
        expiry_tick: u32,
        /// Immediate progress loss (fall-off only).
        penalty: Fixed,
    },

    /// An event ran out; recovery begins.
    EventExpired {
        /// Event kind.
        kind: EventKind,
        /// Recovery lasts until this tick (exclusive).
        recovery_until: u32,
    },

    /// Participant crossed the finish line.
    Finished,

    /// Race resolved.
    Resolved {
        /// Winning participant.
        winner: ParticipantId,
        /// Finish or timeout.
        reason: ResolutionReason,
    },

    /// Race aborted.
    Aborted,
}

/// A race event with timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceEvent {
    /// Tick when event occurred.
    pub tick: u32,

    /// Participant involved, if any.
    pub participant: Option<ParticipantId>,

    /// Event data.
    pub data: RaceEventData,
}

impl RaceEvent {
    /// Lane event started.
    pub fn event_started(tick: u32, participant: ParticipantId, record: &EventRecord, penalty: Fixed) -> Self {
        Self {
            tick,
            participant: Some(participant),
            data: RaceEventData::EventStarted {
                kind: record.kind,
                multiplier: record.multiplier,
                expiry_tick: record.expiry_tick,
                penalty,
            },
        }
    }

    /// Lane event expired.
    pub fn event_expired(tick: u32, participant: ParticipantId, kind: EventKind, recovery_until: u32) -> Self {
        Self {
            tick,
            participant: Some(participant),
            data: RaceEventData::EventExpired { kind, recovery_until },
        }
    }

    /// Participant finished.
    pub fn finished(tick: u32, participant: ParticipantId) -> Self {
        Self {
            tick,
            participant: Some(participant),
            data: RaceEventData::Finished,
        }
    }

    /// Race resolved.
    pub fn resolved(tick: u32, winner: ParticipantId, reason: ResolutionReason) -> Self {
        Self {
            tick,
            participant: Some(winner),
            data: RaceEventData::Resolved { winner, reason },
        }
    }

    /// Race aborted.
    pub fn aborted(tick: u32) -> Self {
        Self {
            tick,
            participant: None,
            data: RaceEventData::Aborted,
        }
    }

    /// Is this a race-level (not lane-level) event?
    pub fn is_terminal(&self) -> bool {
        matches!(self.data, RaceEventData::Resolved { .. } | RaceEventData::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let record = EventRecord {
            kind: EventKind::Boost,
            multiplier: 100_000,
            started_tick: 4,
            expiry_tick: 16,
        };
        let event = RaceEvent::event_started(4, ParticipantId(1), &record, 0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["tick"], 4);
        assert_eq!(json["participant"], 1);
        assert_eq!(json["data"]["event_started"]["kind"], "boost");
        assert_eq!(json["data"]["event_started"]["expiry_tick"], 16);
    }

    #[test]
    fn test_terminal_events() {
        assert!(RaceEvent::aborted(3).is_terminal());
        assert!(RaceEvent::resolved(9, ParticipantId(0), ResolutionReason::Finish).is_terminal());
        assert!(!RaceEvent::finished(9, ParticipantId(0)).is_terminal());
        assert_eq!(RaceEvent::aborted(3).participant, None);
    }
}
