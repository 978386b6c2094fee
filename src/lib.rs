//! # Marble Race Engine
//!
//! Provably-fair race outcome engine. A committed seed, a roster and a
//! config fully determine every tick and the winner, so anyone holding the
//! revealed seed can replay the race and check the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MARBLE RACE ENGINE                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Q16.16 fixed-point arithmetic             │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  ├── hash.rs     - State hashing and lane digests            │
//! │  └── seed.rs     - Seed generation and commitment            │
//! │                                                              │
//! │  race/           - Race logic (deterministic)                │
//! │  ├── roster.rs   - Participants                              │
//! │  ├── config.rs   - Race configuration                        │
//! │  ├── state.rs    - Race, lane and snapshot state             │
//! │  ├── trajectory.rs - Speeds and per-lane step                │
//! │  ├── scheduler.rs- Boost, crash and fall-off events          │
//! │  ├── resolver.rs - Finish, timeout and abort                 │
//! │  └── tick.rs     - Authoritative race loop                   │
//! │                                                              │
//! │  harness/        - Plumbing (non-deterministic)              │
//! │  ├── session.rs  - Paced and batch runs, abort, observers     │
//! │  ├── observer.rs - View adapters                             │
//! │  ├── payout.rs   - Pot split and payment hand-off            │
//! │  └── protocol.rs - Message types                             │
//! │                                                              │
//! │  proof/          - Commitment, transcript, audit replay      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `race/` modules are **100% deterministic**:
//! - No floating-point arithmetic in race logic
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness derived from the seed by SHA-256
//!
//! Given identical seed, roster and config, the race produces
//! **identical results** on any platform, in paced or batch mode.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod race;
pub mod harness;
pub mod proof;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use core::rng::DeterministicRng;
pub use core::seed::{Seed, SeedGenerator};
pub use race::{ParticipantId, Roster, RaceConfig, RaceEngine, RaceError, TerminalRecord, TickSnapshot, replay_race};
pub use harness::{start_race, RaceHandle};
pub use proof::{audit_race, verify_result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tick duration in paced mode (ms)
pub const DEFAULT_TICK_DURATION_MS: u64 = 50;
