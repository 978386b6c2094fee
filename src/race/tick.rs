//! Authoritative Race Tick
//!
//! The race loop that must be 100% deterministic.
//! This is what auditors replay.

use crate::core::fixed::Fixed;
use crate::core::hash::StateHash;
use crate::core::seed::Seed;
use crate::race::config::{ConfigError, EngineParams, RaceConfig};
use crate::race::events::RaceEvent;
use crate::race::resolver::{OutcomeResolver, RaceOutcome, RaceResult, RaceStatus, TerminalRecord};
use crate::race::roster::{ParticipantId, Roster, RosterError};
use crate::race::state::{RaceState, TickSnapshot};
use crate::race::trajectory::{base_speed, step_lane};

/// Race errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RaceError {
    /// Roster rejected.
    #[error("invalid roster: {0}")]
    Roster(#[from] RosterError),

    /// Config rejected.
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    /// Step or abort after the race ended.
    #[error("race already {status} at tick {tick}")]
    AlreadyTerminal {
        /// Last processed tick.
        tick: u32,
        /// `"resolved"` or `"aborted"`.
        status: &'static str,
    },

    /// State holds a lane the rules were not built for.
    #[error("no base speed for participant {0}")]
    UnknownParticipant(ParticipantId),
}

/// Result of a tick.
#[derive(Debug, Clone)]
pub struct TickResult {
    /// Tick just processed.
    pub tick: u32,
    /// State after the tick.
    pub snapshot: TickSnapshot,
    /// Events generated this tick
    pub events: Vec<RaceEvent>,
    /// Outcome, if the race resolved this tick
    pub outcome: Option<RaceOutcome>,
}

impl TickResult {
    /// Did the race resolve this tick?
    pub fn resolved(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Immutable inputs of one race: everything a tick may read besides state.
#[derive(Clone, Debug)]
pub struct RaceRules {
    seed: Seed,
    params: EngineParams,
    /// Indexed by participant ordinal.
    base_speeds: Vec<Fixed>,
    resolver: OutcomeResolver,
}

impl RaceRules {
    /// Resolve rules for a roster. Base speeds are derived once here.
    pub fn new(seed: Seed, roster: &Roster, params: EngineParams) -> Self {
        let base_speeds = roster
            .ids()
            .iter()
            .map(|id| base_speed(&seed, *id, &params))
            .collect();

        Self {
            seed,
            params,
            base_speeds,
            resolver: OutcomeResolver::new(params.track_length, params.timeout_ticks),
        }
    }

    /// Committed seed.
    pub fn seed(&self) -> &Seed {
        &self.seed
    }

    /// Engine parameters.
    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Base speed of one participant.
    pub fn base_speed(&self, id: ParticipantId) -> Option<Fixed> {
        self.base_speeds.get(id.0 as usize).copied()
    }

    /// Outcome resolver.
    pub fn resolver(&self) -> &OutcomeResolver {
        &self.resolver
    }
}

/// Run one race tick.
///
/// # Determinism
///
/// This function is 100% deterministic:
/// - Uses BTreeMap for iteration order
/// - Uses fixed-point math only
/// - Derives every random draw from the seed by hashing
/// - No system calls, no floating point
pub fn tick(state: &mut RaceState, rules: &RaceRules) -> Result<TickResult, RaceError> {
    if state.is_terminal() {
        return Err(RaceError::AlreadyTerminal {
            tick: state.tick,
            status: state.status.name(),
        });
    }

    if let Some(id) = state.lanes.keys().find(|id| rules.base_speed(**id).is_none()) {
        return Err(RaceError::UnknownParticipant(*id));
    }

    let next_tick = state.tick + 1;
    let leader = state.leader();
    let mut events = Vec::new();

    // Each lane reads only itself and the previous tick's leader
    for (id, lane) in state.lanes.iter_mut() {
        let base = rules.base_speeds[id.0 as usize];
        let step = step_lane(&rules.seed, *id, next_tick, base, lane, leader.as_ref(), &rules.params);

        if let Some(kind) = step.expired {
            events.push(RaceEvent::event_expired(next_tick, *id, kind, step.lane.recovery_until));
        }
        if let Some(record) = step.started {
            events.push(RaceEvent::event_started(next_tick, *id, &record, step.penalty));
        }
        if step.finished {
            events.push(RaceEvent::finished(next_tick, *id));
        }

        *lane = step.lane;
    }

    state.tick = next_tick;

    let outcome = rules.resolver.evaluate(state)?;
    if let Some(outcome) = outcome {
        events.push(RaceEvent::resolved(next_tick, outcome.winner, outcome.resolution_reason));
    }

    Ok(TickResult {
        tick: next_tick,
        snapshot: state.snapshot(),
        events,
        outcome,
    })
}

// =============================================================================
// ENGINE
// =============================================================================

/// Exclusive owner of one race's state.
///
/// Nothing else mutates the [`RaceState`]; observers get snapshots.
#[derive(Clone, Debug)]
pub struct RaceEngine {
    roster: Roster,
    config: RaceConfig,
    rules: RaceRules,
    state: RaceState,
    history: Vec<TickSnapshot>,
}

impl RaceEngine {
    /// Validate config and build the engine at tick 0.
    pub fn new(roster: Roster, seed: Seed, config: RaceConfig) -> Result<Self, RaceError> {
        let params = config.params()?;
        let rules = RaceRules::new(seed, &roster, params);
        let state = RaceState::new(&roster);
        let history = vec![state.snapshot()];

        Ok(Self {
            roster,
            config,
            rules,
            state,
            history,
        })
    }

    /// Validate a raw id list, then build.
    pub fn from_ids(ids: &[ParticipantId], seed: Seed, config: RaceConfig) -> Result<Self, RaceError> {
        Self::new(Roster::new(ids)?, seed, config)
    }

    /// Advance exactly one tick.
    pub fn step(&mut self) -> Result<TickResult, RaceError> {
        let result = tick(&mut self.state, &self.rules)?;
        self.history.push(result.snapshot.clone());
        Ok(result)
    }

    /// Cancel the race. No winner will ever be declared.
    pub fn abort(&mut self) -> Result<TerminalRecord, RaceError> {
        let tick = self.rules.resolver.abort(&mut self.state)?;
        Ok(TerminalRecord::aborted(tick))
    }

    /// Batch mode: step until terminal.
    pub fn run_to_completion(&mut self) -> Result<TerminalRecord, RaceError> {
        while !self.state.is_terminal() {
            self.step()?;
        }
        self.terminal_record().ok_or(RaceError::AlreadyTerminal {
            tick: self.state.tick,
            status: self.state.status.name(),
        })
    }

    /// Terminal record, once the race has ended.
    pub fn terminal_record(&self) -> Option<TerminalRecord> {
        match self.state.status {
            RaceStatus::Pending => None,
            RaceStatus::Resolved(outcome) => Some(TerminalRecord::Resolved(RaceResult {
                winner: outcome.winner,
                final_tick: outcome.final_tick,
                resolution_reason: outcome.resolution_reason,
                history: self.history.clone(),
            })),
            RaceStatus::Aborted { tick } => Some(TerminalRecord::aborted(tick)),
        }
    }

    /// Current state.
    pub fn state(&self) -> &RaceState {
        &self.state
    }

    /// Current tick.
    pub fn current_tick(&self) -> u32 {
        self.state.tick
    }

    /// Has the race ended?
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Committed seed.
    pub fn seed(&self) -> &Seed {
        self.rules.seed()
    }

    /// Roster.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Config the race was started with.
    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    /// Immutable inputs.
    pub fn rules(&self) -> &RaceRules {
        &self.rules
    }

    /// Snapshots from tick 0 to the current tick.
    pub fn history(&self) -> &[TickSnapshot] {
        &self.history
    }

    /// Most recent snapshot.
    pub fn latest_snapshot(&self) -> Option<&TickSnapshot> {
        self.history.last()
    }

    /// Hash of the current state.
    pub fn state_hash(&self) -> StateHash {
        self.state.compute_hash(self.rules.seed())
    }
}

/// Replay a race from its public inputs.
///
/// `(seed, roster, config)` is the whole audit contract: the returned record
/// is byte-identical to the one produced live.
pub fn replay_race(roster: &Roster, seed: Seed, config: &RaceConfig) -> Result<TerminalRecord, RaceError> {
    let mut engine = RaceEngine::new(roster.clone(), seed, config.clone())?;
    engine.run_to_completion()
}
