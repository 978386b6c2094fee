//! Event Scheduler
//!
//! Decides, per participant and tick, whether a boost, crash or fall-off
//! begins. Every decision is a pure function of
//! `(seed, participant, tick, own progress)`; the scheduler never looks at
//! another lane.
//!
//! ```text
//! digest = SHA-256(EVENT_DOMAIN || seed || id || tick || progress)
//!          ├─ bytes 0..8  → roll = word % 10000 → event kind (or none)
//!          └─ bytes 8..16 → DeterministicRng → duration, multiplier, penalty
//! ```

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::fixed::{
    Fixed,
    BOOST_MULT_MIN, BOOST_MULT_MAX,
    CRASH_MULT_MIN, CRASH_MULT_MAX,
    FALL_OFF_MULT, FALL_OFF_PENALTY_MIN, FALL_OFF_PENALTY_MAX,
};
use crate::core::hash::{derive_lane_digest, EVENT_DOMAIN};
use crate::core::rng::{digest_word, DeterministicRng};
use crate::core::seed::Seed;
use crate::race::config::{EventTiers, BPS_SCALE};
use crate::race::roster::ParticipantId;

/// Boost duration range in ticks (inclusive).
pub const BOOST_DURATION: (i32, i32) = (10, 20);

/// Crash duration range in ticks (inclusive).
pub const CRASH_DURATION: (i32, i32) = (20, 40);

/// Fall-off duration range in ticks (inclusive).
pub const FALL_OFF_DURATION: (i32, i32) = (8, 14);

/// Kind of perturbation event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EventKind {
    /// Speed ×1.5–1.8, short.
    Boost = 0,
    /// Speed ×0.3–0.4, medium.
    Crash = 1,
    /// Speed ×0.1 plus a one-time progress penalty.
    FallOff = 2,
}

impl EventKind {
    /// Inclusive duration range in ticks.
    pub fn duration_range(self) -> (i32, i32) {
        match self {
            EventKind::Boost => BOOST_DURATION,
            EventKind::Crash => CRASH_DURATION,
            EventKind::FallOff => FALL_OFF_DURATION,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Boost => "boost",
            EventKind::Crash => "crash",
            EventKind::FallOff => "fall_off",
        };
        f.write_str(name)
    }
}

/// An event attached to one lane.
///
/// Active on ticks `[started_tick, expiry_tick)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event kind.
    pub kind: EventKind,
    /// Speed multiplier while active.
    pub multiplier: Fixed,
    /// First tick the event applies.
    pub started_tick: u32,
    /// First tick the event no longer applies.
    pub expiry_tick: u32,
}

impl EventRecord {
    /// Is the event in effect at `tick`?
    #[inline]
    pub fn is_active(&self, tick: u32) -> bool {
        tick >= self.started_tick && tick < self.expiry_tick
    }

    /// Duration in ticks.
    pub fn duration(&self) -> u32 {
        self.expiry_tick - self.started_tick
    }
}

/// A freshly triggered event plus its one-time effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledEvent {
    /// The record to attach to the lane.
    pub record: EventRecord,
    /// Progress removed immediately (fall-off only, otherwise 0).
    pub penalty: Fixed,
}

/// Map a roll in `[0, 10000)` to an event kind using cumulative tiers.
pub fn classify_roll(roll: u32, tiers: &EventTiers) -> Option<EventKind> {
    let boost = tiers.boost_bps;
    let crash = boost.saturating_add(tiers.crash_bps);
    let fall_off = crash.saturating_add(tiers.fall_off_bps);

    if roll < boost {
        Some(EventKind::Boost)
    } else if roll < crash {
        Some(EventKind::Crash)
    } else if roll < fall_off {
        Some(EventKind::FallOff)
    } else {
        None
    }
}

/// Roll for a new event on one lane at one tick.
///
/// Only called for lanes with no active event. `progress` is the lane's
/// progress before this tick's movement.
pub fn roll_event(
    seed: &Seed,
    participant: ParticipantId,
    tick: u32,
    progress: Fixed,
    tiers: &EventTiers,
) -> Option<ScheduledEvent> {
    let digest = derive_lane_digest(seed, EVENT_DOMAIN, participant.0, tick, progress);
    let roll = (digest_word(&digest, 0) % BPS_SCALE as u64) as u32;
    let kind = classify_roll(roll, tiers)?;

    // Draw order is fixed: duration, multiplier, penalty
    let mut rng = DeterministicRng::from_digest(&digest, 8);
    let (min_ticks, max_ticks) = kind.duration_range();
    let duration = rng.next_int_range(min_ticks, max_ticks) as u32;

    let multiplier = match kind {
        EventKind::Boost => rng.next_fixed_range(BOOST_MULT_MIN, BOOST_MULT_MAX),
        EventKind::Crash => rng.next_fixed_range(CRASH_MULT_MIN, CRASH_MULT_MAX),
        EventKind::FallOff => FALL_OFF_MULT,
    };

    let penalty = match kind {
        EventKind::FallOff => rng.next_fixed_range(FALL_OFF_PENALTY_MIN, FALL_OFF_PENALTY_MAX),
        _ => 0,
    };

    Some(ScheduledEvent {
        record: EventRecord {
            kind,
            multiplier,
            started_tick: tick,
            expiry_tick: tick.saturating_add(duration),
        },
        penalty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{to_fixed, FIXED_ONE};

    fn always(kind: EventKind) -> EventTiers {
        match kind {
            EventKind::Boost => EventTiers { boost_bps: BPS_SCALE, crash_bps: 0, fall_off_bps: 0 },
            EventKind::Crash => EventTiers { boost_bps: 0, crash_bps: BPS_SCALE, fall_off_bps: 0 },
            EventKind::FallOff => EventTiers { boost_bps: 0, crash_bps: 0, fall_off_bps: BPS_SCALE },
        }
    }

    #[test]
    fn test_classify_roll_tiers() {
        let tiers = EventTiers { boost_bps: 100, crash_bps: 50, fall_off_bps: 25 };
        assert_eq!(classify_roll(0, &tiers), Some(EventKind::Boost));
        assert_eq!(classify_roll(99, &tiers), Some(EventKind::Boost));
        assert_eq!(classify_roll(100, &tiers), Some(EventKind::Crash));
        assert_eq!(classify_roll(149, &tiers), Some(EventKind::Crash));
        assert_eq!(classify_roll(150, &tiers), Some(EventKind::FallOff));
        assert_eq!(classify_roll(174, &tiers), Some(EventKind::FallOff));
        assert_eq!(classify_roll(175, &tiers), None);
        assert_eq!(classify_roll(9999, &EventTiers::NONE), None);
    }

    #[test]
    fn test_no_events_when_tiers_empty() {
        let seed = Seed::from_bytes([3; 32]);
        for tick in 1..500 {
            assert!(roll_event(&seed, ParticipantId(0), tick, 0, &EventTiers::NONE).is_none());
        }
    }

    #[test]
    fn test_event_bounds() {
        let seed = Seed::from_bytes([9; 32]);
        for kind in [EventKind::Boost, EventKind::Crash, EventKind::FallOff] {
            let tiers = always(kind);
            for tick in 1..200 {
                let event = roll_event(&seed, ParticipantId(tick % 5), tick, to_fixed(10.0), &tiers)
                    .expect("tier covers every roll");
                let record = event.record;
                let (lo, hi) = kind.duration_range();

                assert_eq!(record.kind, kind);
                assert_eq!(record.started_tick, tick);
                assert!(record.duration() >= lo as u32 && record.duration() <= hi as u32);
                assert!(record.is_active(tick));
                assert!(!record.is_active(record.expiry_tick));

                match kind {
                    EventKind::Boost => {
                        assert!(record.multiplier >= BOOST_MULT_MIN && record.multiplier < BOOST_MULT_MAX);
                        assert!(record.multiplier > FIXED_ONE);
                        assert_eq!(event.penalty, 0);
                    }
                    EventKind::Crash => {
                        assert!(record.multiplier >= CRASH_MULT_MIN && record.multiplier < CRASH_MULT_MAX);
                        assert_eq!(event.penalty, 0);
                    }
                    EventKind::FallOff => {
                        assert_eq!(record.multiplier, FALL_OFF_MULT);
                        assert!(event.penalty >= FALL_OFF_PENALTY_MIN && event.penalty < FALL_OFF_PENALTY_MAX);
                    }
                }
            }
        }
    }

    #[test]
    fn test_roll_is_pure() {
        let seed = Seed::from_bytes([1; 32]);
        let tiers = EventTiers { boost_bps: 3000, crash_bps: 3000, fall_off_bps: 3000 };
        for tick in 1..100 {
            let a = roll_event(&seed, ParticipantId(2), tick, to_fixed(50.0), &tiers);
            let b = roll_event(&seed, ParticipantId(2), tick, to_fixed(50.0), &tiers);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_progress_feeds_the_roll() {
        let seed = Seed::from_bytes([5; 32]);
        let tiers = EventTiers { boost_bps: 5000, crash_bps: 0, fall_off_bps: 0 };
        let differs = (0..64).any(|p| {
            roll_event(&seed, ParticipantId(0), 10, p * FIXED_ONE, &tiers).is_some()
                != roll_event(&seed, ParticipantId(0), 10, 0, &tiers).is_some()
        });
        assert!(differs, "progress must influence the event roll");
    }

    #[test]
    fn test_event_kind_display_and_serde() {
        assert_eq!(EventKind::FallOff.to_string(), "fall_off");
        assert_eq!(serde_json::to_string(&EventKind::Boost).unwrap(), "\"boost\"");
    }
}
