//! Trajectory Engine
//!
//! The numeric core: how far one lane moves on one tick.
//!
//! ```text
//! speed      = max(0, base_speed(seed, id) + jitter(seed, id, tick))
//! multiplier = active event | recovery | 1.0
//! converge   = leader slowdown | catch-up | 1.0      (previous tick's leader)
//! progress'  = clamp(progress + speed × multiplier × converge − penalty, 0, track)
//! ```
//!
//! [`step_lane`] reads only the lane's own state, the seed, the parameters
//! and the previous tick's [`LeaderSummary`], so every lane of every tick
//! can be recomputed in isolation.

use crate::core::fixed::{Fixed, FIXED_ONE, clamp_wide, fixed_mul, fixed_scale_u64};
use crate::core::hash::{derive_lane_digest, BASE_SPEED_DOMAIN, JITTER_DOMAIN};
use crate::core::rng::digest_word;
use crate::core::seed::Seed;
use crate::race::config::EngineParams;
use crate::race::roster::ParticipantId;
use crate::race::scheduler::{roll_event, EventKind, EventRecord};
use crate::race::state::{LaneState, LeaderSummary};

/// Base speed in `[speed_min, speed_max)`, fixed for the whole race.
pub fn base_speed(seed: &Seed, participant: ParticipantId, params: &EngineParams) -> Fixed {
    let digest = derive_lane_digest(seed, BASE_SPEED_DOMAIN, participant.0, 0, 0);
    let span = params.speed_max - params.speed_min;
    params.speed_min + fixed_scale_u64(digest_word(&digest, 0), span)
}

/// Per-tick jitter in `[-jitter, +jitter]`.
pub fn jitter(seed: &Seed, participant: ParticipantId, tick: u32, params: &EngineParams) -> Fixed {
    if params.jitter <= 0 {
        return 0;
    }
    let digest = derive_lane_digest(seed, JITTER_DOMAIN, participant.0, tick, 0);
    let span = params.jitter.saturating_mul(2).saturating_add(1);
    fixed_scale_u64(digest_word(&digest, 0), span) - params.jitter
}

/// Unmodified speed for one tick, never negative.
#[inline]
pub fn tick_speed(base: Fixed, jitter: Fixed) -> Fixed {
    base.saturating_add(jitter).max(0)
}

/// Event or recovery multiplier for a lane at `tick`.
pub fn event_multiplier(lane: &LaneState, tick: u32, params: &EngineParams) -> Fixed {
    match lane.event {
        Some(event) if event.is_active(tick) => event.multiplier,
        _ if lane.is_recovering(tick) => params.recovery_multiplier,
        _ => FIXED_ONE,
    }
}

/// Late-race convergence multiplier.
///
/// Off until the leader passes the threshold. Then the leader slows down
/// and only trailers within the catch-up window speed up, so a large lead
/// is never handed back.
pub fn convergence_multiplier(
    participant: ParticipantId,
    progress: Fixed,
    leader: Option<&LeaderSummary>,
    params: &EngineParams,
) -> Fixed {
    let Some(leader) = leader else {
        return FIXED_ONE;
    };
    if leader.progress < params.convergence_progress {
        return FIXED_ONE;
    }
    if participant == leader.leader {
        return params.leader_slowdown;
    }
    let gap = leader.progress as i64 - progress as i64;
    if gap <= params.catch_up_window as i64 {
        params.catch_up
    } else {
        FIXED_ONE
    }
}

/// Outcome of advancing one lane by one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneStep {
    /// New lane state.
    pub lane: LaneState,
    /// Event that started this tick.
    pub started: Option<EventRecord>,
    /// Kind of the event that expired this tick.
    pub expired: Option<EventKind>,
    /// Progress removed by a fall-off this tick.
    pub penalty: Fixed,
    /// Lane crossed the finish line this tick.
    pub finished: bool,
}

impl LaneStep {
    fn frozen(lane: LaneState) -> Self {
        Self {
            lane,
            started: None,
            expired: None,
            penalty: 0,
            finished: false,
        }
    }
}

/// Advance one lane to `tick`.
///
/// `base` is the participant's [`base_speed`]; `leader` is the summary of
/// the state at `tick - 1`.
pub fn step_lane(
    seed: &Seed,
    participant: ParticipantId,
    tick: u32,
    base: Fixed,
    lane: &LaneState,
    leader: Option<&LeaderSummary>,
    params: &EngineParams,
) -> LaneStep {
    // Finished lanes no longer move
    if lane.has_finished(params.track_length) {
        return LaneStep::frozen(*lane);
    }

    let mut next = *lane;
    let mut expired = None;
    let mut started = None;
    let mut penalty = 0;

    // 1. Expire
    if let Some(event) = next.event {
        if event.expiry_tick <= tick {
            next.event = None;
            next.recovery_until = tick.saturating_add(params.recovery_ticks);
            expired = Some(event.kind);
        }
    }

    // 2. Roll (not on the tick an event expired, so recovery gets a turn)
    if lane.event.is_none() {
        if let Some(scheduled) = roll_event(seed, participant, tick, lane.progress, &params.tiers) {
            next.event = Some(scheduled.record);
            started = Some(scheduled.record);
            penalty = scheduled.penalty;
        }
    }

    // 3. Move
    let speed = tick_speed(base, jitter(seed, participant, tick, params));
    let multiplier = event_multiplier(&next, tick, params);
    let converge = convergence_multiplier(participant, lane.progress, leader, params);
    let delta = fixed_mul(fixed_mul(speed, multiplier), converge);

    let wide = lane.progress as i64 + delta as i64 - penalty as i64;
    next.progress = clamp_wide(wide, 0, params.track_length);

    let finished = next.has_finished(params.track_length);
    if finished {
        next.event = None;
    }

    LaneStep {
        lane: next,
        started,
        expired,
        penalty,
        finished,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{to_fixed, FALL_OFF_MULT};
    use crate::race::config::{EventTiers, RaceConfig};

    fn quiet_params() -> EngineParams {
        let mut config = RaceConfig::default();
        config.event_probability_tiers = EventTiers::NONE;
        config.params().unwrap()
    }

    #[test]
    fn test_base_speed_in_range() {
        let params = EngineParams::default();
        for byte in 0..16u8 {
            let seed = Seed::from_bytes([byte; 32]);
            for id in 0..8 {
                let speed = base_speed(&seed, ParticipantId(id), &params);
                assert!(speed >= params.speed_min && speed < params.speed_max);
            }
        }
    }

    #[test]
    fn test_base_speed_differs_per_participant() {
        let params = EngineParams::default();
        let seed = Seed::from_bytes([0; 32]);
        let speeds: Vec<Fixed> = (0..5).map(|id| base_speed(&seed, ParticipantId(id), &params)).collect();
        assert!(speeds.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_jitter_bounded() {
        let params = EngineParams::default();
        let seed = Seed::from_bytes([4; 32]);
        for tick in 1..1000 {
            let j = jitter(&seed, ParticipantId(tick % 3), tick, &params);
            assert!(j >= -params.jitter && j <= params.jitter);
        }

        let mut still = params;
        still.jitter = 0;
        assert_eq!(jitter(&seed, ParticipantId(0), 5, &still), 0);
    }

    #[test]
    fn test_tick_speed_never_negative() {
        assert_eq!(tick_speed(FIXED_ONE, -2 * FIXED_ONE), 0);
        assert_eq!(tick_speed(FIXED_ONE, FIXED_ONE), 2 * FIXED_ONE);
    }

    #[test]
    fn test_event_multiplier_precedence() {
        let params = EngineParams::default();
        let mut lane = LaneState { recovery_until: 20, ..LaneState::default() };
        assert_eq!(event_multiplier(&lane, 10, &params), params.recovery_multiplier);
        assert_eq!(event_multiplier(&lane, 20, &params), FIXED_ONE);

        lane.event = Some(EventRecord {
            kind: EventKind::FallOff,
            multiplier: FALL_OFF_MULT,
            started_tick: 8,
            expiry_tick: 16,
        });
        assert_eq!(event_multiplier(&lane, 10, &params), FALL_OFF_MULT);
    }

    #[test]
    fn test_convergence_rule() {
        let params = EngineParams::default();
        let leader = LeaderSummary { leader: ParticipantId(2), progress: to_fixed(185.0) };

        assert_eq!(
            convergence_multiplier(ParticipantId(2), leader.progress, Some(&leader), &params),
            params.leader_slowdown
        );
        assert_eq!(
            convergence_multiplier(ParticipantId(0), to_fixed(170.0), Some(&leader), &params),
            params.catch_up
        );
        // 40 units behind is outside the 20 unit window
        assert_eq!(
            convergence_multiplier(ParticipantId(1), to_fixed(145.0), Some(&leader), &params),
            FIXED_ONE
        );

        let early = LeaderSummary { leader: ParticipantId(2), progress: to_fixed(100.0) };
        assert_eq!(
            convergence_multiplier(ParticipantId(0), to_fixed(99.0), Some(&early), &params),
            FIXED_ONE
        );
        assert_eq!(convergence_multiplier(ParticipantId(0), 0, None, &params), FIXED_ONE);
    }

    #[test]
    fn test_quiet_lane_moves_by_speed() {
        let params = quiet_params();
        let seed = Seed::from_bytes([2; 32]);
        let id = ParticipantId(1);
        let base = base_speed(&seed, id, &params);

        let step = step_lane(&seed, id, 1, base, &LaneState::default(), None, &params);
        let expected = tick_speed(base, jitter(&seed, id, 1, &params));
        assert_eq!(step.lane.progress, expected);
        assert!(step.started.is_none() && step.expired.is_none());
        assert!(!step.finished);
    }

    #[test]
    fn test_finished_lane_is_frozen() {
        let params = EngineParams::default();
        let seed = Seed::from_bytes([2; 32]);
        let lane = LaneState { progress: params.track_length, ..LaneState::default() };
        let step = step_lane(&seed, ParticipantId(0), 50, FIXED_ONE, &lane, None, &params);
        assert_eq!(step.lane, lane);
        assert!(!step.finished);
    }

    #[test]
    fn test_progress_clamped_at_track_end() {
        let params = quiet_params();
        let seed = Seed::from_bytes([2; 32]);
        let lane = LaneState { progress: params.track_length - 1, ..LaneState::default() };
        let step = step_lane(&seed, ParticipantId(0), 50, FIXED_ONE, &lane, None, &params);
        assert_eq!(step.lane.progress, params.track_length);
        assert!(step.finished);
    }

    #[test]
    fn test_fall_off_at_start_clamps_to_zero() {
        let mut params = EngineParams::default();
        params.tiers = EventTiers { boost_bps: 0, crash_bps: 0, fall_off_bps: 10_000 };
        let seed = Seed::from_bytes([6; 32]);

        let step = step_lane(&seed, ParticipantId(0), 1, params.speed_min, &LaneState::default(), None, &params);
        assert_eq!(step.started.map(|e| e.kind), Some(EventKind::FallOff));
        assert!(step.penalty > 0);
        assert_eq!(step.lane.progress, 0);
    }

    #[test]
    fn test_expiry_starts_recovery() {
        let params = quiet_params();
        let seed = Seed::from_bytes([2; 32]);
        let lane = LaneState {
            progress: to_fixed(50.0),
            event: Some(EventRecord {
                kind: EventKind::Crash,
                multiplier: to_fixed(0.3),
                started_tick: 10,
                expiry_tick: 30,
            }),
            recovery_until: 0,
        };

        let during = step_lane(&seed, ParticipantId(0), 29, FIXED_ONE, &lane, None, &params);
        assert!(during.expired.is_none());
        assert!(during.lane.event.is_some());

        let after = step_lane(&seed, ParticipantId(0), 30, FIXED_ONE, &lane, None, &params);
        assert_eq!(after.expired, Some(EventKind::Crash));
        assert!(after.lane.event.is_none());
        assert_eq!(after.lane.recovery_until, 30 + params.recovery_ticks);
        assert!(after.lane.progress > during.lane.progress);
    }
}
