//! State Hashing for Verification
//!
//! Provides deterministic hashing for:
//! - Per-lane randomness derived from the committed seed
//! - Race state checkpoints in transcripts
//! - Commitments and replay validation

use sha2::{Sha256, Digest};

use super::fixed::Fixed;
use super::seed::Seed;

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Domain separator for base speed derivation.
pub const BASE_SPEED_DOMAIN: &[u8] = b"MARBLE_RACE_BASE_SPEED_V1";

/// Domain separator for per-tick jitter.
pub const JITTER_DOMAIN: &[u8] = b"MARBLE_RACE_JITTER_V1";

/// Domain separator for event rolls.
pub const EVENT_DOMAIN: &[u8] = b"MARBLE_RACE_EVENT_V1";

/// Deterministic hasher for race state.
///
/// Wraps SHA-256 with helpers for fixed-point types.
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for race state.
    pub fn for_race_state() -> Self {
        Self::new(b"MARBLE_RACE_STATE_V1")
    }

    /// Create hasher for race configuration.
    pub fn for_config() -> Self {
        Self::new(b"MARBLE_RACE_CONFIG_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an i32 value (little-endian).
    #[inline]
    pub fn update_i32(&mut self, value: i32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a Fixed value.
    #[inline]
    pub fn update_fixed(&mut self, value: Fixed) {
        self.update_i32(value);
    }

    /// Update with an f64 via its IEEE-754 bit pattern.
    #[inline]
    pub fn update_f64(&mut self, value: f64) {
        self.update_u64(value.to_bits());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Derive the digest behind one random draw for one participant.
///
/// Layout: `domain || seed || participant (u32 LE) || tick (u32 LE) || salt (i32 LE)`.
/// This is the only way the simulation turns the seed into randomness, so
/// the layout is part of the audit contract and must never change.
pub fn derive_lane_digest(
    seed: &Seed,
    domain: &[u8],
    participant: u32,
    tick: u32,
    salt: i32,
) -> StateHash {
    let mut hasher = StateHasher::new(domain);
    hasher.update_bytes(seed.as_bytes());
    hasher.update_u32(participant);
    hasher.update_u32(tick);
    hasher.update_i32(salt);
    hasher.finalize()
}

/// Compute state hash for race verification.
///
/// This function is called by `RaceState::compute_hash()`.
/// The parameter is a closure that adds state-specific data.
pub fn compute_state_hash<F>(tick: u32, seed: &Seed, add_state: F) -> StateHash
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::for_race_state();

    // Always hash tick and seed first
    hasher.update_u32(tick);
    hasher.update_bytes(seed.as_bytes());

    add_state(&mut hasher);

    hasher.finalize()
}

// =============================================================================
// TESTS
// =============================================================================
