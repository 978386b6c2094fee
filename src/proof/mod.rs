//! Race Proof System
//!
//! Provides verifiable race outcomes through:
//! - Pre-race commitment to seed, roster and config
//! - Race transcript recording
//! - Merkle tree commitments over the tick history
//! - Verification by deterministic replay
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF SYSTEM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  commitment.rs   - Pre-race commit / post-race reveal       │
//! │  transcript.rs   - Checkpoints, events, history root        │
//! │  merkle.rs       - Binary Merkle tree for commitments       │
//! │  verify.rs       - Audit and verification by replay         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod merkle;
pub mod transcript;
pub mod commitment;
pub mod verify;

// Re-export key types
pub use merkle::{MerkleTree, MerkleProof};
pub use transcript::{
    RaceTranscript, RaceMetadata, StateCheckpoint,
    TranscriptOutcome, TranscriptResult, TranscriptError,
    CHECKPOINT_INTERVAL, TRANSCRIPT_VERSION,
};
pub use commitment::{RaceCommitment, RaceReveal, CommitmentError};
pub use verify::{
    audit_race, verify_result, verify_transcript,
    VerificationResult, VerificationError, CheckpointResult,
};
