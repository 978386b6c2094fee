//! Race Logic Module
//!
//! All race simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `roster`: Participant ids and roster validation
//! - `config`: Race configuration and fixed-point engine parameters
//! - `state`: Race state, lane state, tick snapshots
//! - `trajectory`: Base speed, jitter, multipliers, per-lane step
//! - `scheduler`: Seed-derived boost/crash/fall-off events
//! - `resolver`: Finish, timeout and abort transitions
//! - `tick`: Authoritative race loop and replay
//! - `events`: Race events for observers and transcripts

pub mod roster;
pub mod config;
pub mod state;
pub mod trajectory;
pub mod scheduler;
pub mod resolver;
pub mod tick;
pub mod events;

// Re-export key types
pub use roster::{ParticipantId, Roster, RosterError};
pub use config::{RaceConfig, EventTiers, RecoveryConfig, ConvergenceConfig, ConfigError, EngineParams};
pub use state::{RaceState, LaneState, TickSnapshot};
pub use scheduler::{EventKind, EventRecord};
pub use resolver::{OutcomeResolver, RaceOutcome, RaceResult, RaceStatus, ResolutionReason, TerminalRecord};
pub use tick::{RaceEngine, RaceError, TickResult, replay_race};
pub use events::{RaceEvent, RaceEventData};
