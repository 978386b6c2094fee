//! Race Harness
//!
//! Non-deterministic plumbing around the deterministic core: pacing,
//! cancellation, observers, wire messages and payout hand-off.
//!
//! ## Module Structure
//!
//! - `session`: `start_race`, `RaceHandle` (paced and batch modes)
//! - `observer`: Read-only view adapters and the profile directory
//! - `payout`: Pot split and payment collaborator
//! - `protocol`: JSON messages for observers

pub mod session;
pub mod observer;
pub mod payout;
pub mod protocol;

pub use session::{start_race, start_race_with, AbortSignal, HarnessConfig, RaceHandle, SessionState};
pub use observer::{DisplayProfile, FrameInterpolator, LaneView, ProfileDirectory, StaticProfiles};
pub use payout::{settle, PaymentCollaborator, PayoutError, PayoutInstruction, PotConfig};
pub use protocol::RaceMessage;
