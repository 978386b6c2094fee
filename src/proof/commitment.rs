//! Race Commitment Protocol
//!
//! Commit to the seed, roster and config before the first tick.
//! Reveal and verify after the race to prove nothing was swapped.
//!
//! ```text
//! commitment_hash = SHA-256(COMMIT_DOMAIN || race_id || H(seed) || H(roster) || H(config))
//! ```
//!
//! Only `H(seed)` is published up front; the seed itself stays secret until
//! the reveal, so nobody can precompute the outcome.

use sha2::{Sha256, Digest};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::hash::StateHash;
use crate::core::seed::Seed;
use crate::race::config::RaceConfig;
use crate::race::roster::Roster;

/// Domain separator for commitments.
const COMMITMENT_DOMAIN: &[u8] = b"MARBLE_RACE_COMMIT_V1";

/// Pre-race commitment, published before tick 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceCommitment {
    /// Race identifier.
    pub race_id: Uuid,

    /// Commitment hash over everything below.
    pub commitment_hash: StateHash,

    /// Hash of the secret seed.
    pub seed_commitment: StateHash,

    /// Hash of the roster.
    pub roster_fingerprint: StateHash,

    /// Hash of the race config.
    pub config_hash: StateHash,

    /// Unix milliseconds at commit time (informational, not hashed).
    pub committed_at_ms: i64,
}

impl RaceCommitment {
    /// Commit to a race's inputs.
    pub fn new(race_id: Uuid, seed: &Seed, roster: &Roster, config: &RaceConfig) -> Self {
        let seed_commitment = seed.commitment();
        let roster_fingerprint = roster.fingerprint();
        let config_hash = config.config_hash();

        Self {
            race_id,
            commitment_hash: compute_commitment_hash(race_id, &seed_commitment, &roster_fingerprint, &config_hash),
            seed_commitment,
            roster_fingerprint,
            config_hash,
            committed_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Short hex form for logs and UI.
    pub fn short_hash(&self) -> String {
        hex::encode(&self.commitment_hash[..8])
    }

    /// Check that revealed inputs match this commitment.
    pub fn verify_inputs(
        &self,
        race_id: Uuid,
        seed: &Seed,
        roster: &Roster,
        config: &RaceConfig,
    ) -> Result<(), CommitmentError> {
        if race_id != self.race_id {
            return Err(CommitmentError::RaceIdMismatch {
                expected: self.race_id,
                got: race_id,
            });
        }
        if seed.commitment() != self.seed_commitment {
            return Err(CommitmentError::SeedMismatch);
        }
        if roster.fingerprint() != self.roster_fingerprint {
            return Err(CommitmentError::RosterMismatch);
        }
        if config.config_hash() != self.config_hash {
            return Err(CommitmentError::ConfigMismatch);
        }

        let recomputed = compute_commitment_hash(
            self.race_id,
            &self.seed_commitment,
            &self.roster_fingerprint,
            &self.config_hash,
        );
        if recomputed != self.commitment_hash {
            return Err(CommitmentError::HashMismatch);
        }
        Ok(())
    }
}

/// Compute commitment hash from its components.
fn compute_commitment_hash(
    race_id: Uuid,
    seed_commitment: &StateHash,
    roster_fingerprint: &StateHash,
    config_hash: &StateHash,
) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(COMMITMENT_DOMAIN);
    hasher.update(race_id.as_bytes());
    hasher.update(seed_commitment);
    hasher.update(roster_fingerprint);
    hasher.update(config_hash);
    hasher.finalize().into()
}

/// Reveal structure (published after the race ends).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceReveal {
    /// Race identifier.
    pub race_id: Uuid,
    /// The secret seed.
    pub seed: Seed,
    /// Roster.
    pub roster: Roster,
    /// Config.
    pub config: RaceConfig,
}

impl RaceReveal {
    /// Create a new reveal.
    pub fn new(race_id: Uuid, seed: Seed, roster: Roster, config: RaceConfig) -> Self {
        Self { race_id, seed, roster, config }
    }

    /// Verify reveal against commitment.
    pub fn verify(&self, commitment: &RaceCommitment) -> Result<(), CommitmentError> {
        commitment.verify_inputs(self.race_id, &self.seed, &self.roster, &self.config)
    }
}

/// Errors that can occur during commitment verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitmentError {
    /// Reveal is for a different race.
    #[error("race id mismatch: committed {expected}, revealed {got}")]
    RaceIdMismatch {
        /// Committed race id.
        expected: Uuid,
        /// Revealed race id.
        got: Uuid,
    },

    /// Revealed seed does not hash to the committed value.
    #[error("revealed seed does not match commitment")]
    SeedMismatch,

    /// Revealed roster differs.
    #[error("revealed roster does not match commitment")]
    RosterMismatch,

    /// Revealed config differs.
    #[error("revealed config does not match commitment")]
    ConfigMismatch,

    /// Commitment hash inconsistent with its components.
    #[error("commitment hash does not match its components")]
    HashMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Uuid, Seed, Roster, RaceConfig) {
        (
            Uuid::from_bytes([1; 16]),
            Seed::from_bytes([2; 32]),
            Roster::with_count(5).unwrap(),
            RaceConfig::default(),
        )
    }

    #[test]
    fn test_commitment_determinism() {
        let (id, seed, roster, config) = fixture();
        let a = RaceCommitment::new(id, &seed, &roster, &config);
        let b = RaceCommitment::new(id, &seed, &roster, &config);
        assert_eq!(a.commitment_hash, b.commitment_hash);
        assert_eq!(a.seed_commitment, seed.commitment());
        assert_eq!(a.short_hash().len(), 16);
    }

    #[test]
    fn test_reveal_verifies() {
        let (id, seed, roster, config) = fixture();
        let commitment = RaceCommitment::new(id, &seed, &roster, &config);
        let reveal = RaceReveal::new(id, seed, roster, config);
        assert_eq!(reveal.verify(&commitment), Ok(()));
    }

    #[test]
    fn test_swapped_seed_fails() {
        let (id, seed, roster, config) = fixture();
        let commitment = RaceCommitment::new(id, &seed, &roster, &config);
        let reveal = RaceReveal::new(id, Seed::from_bytes([3; 32]), roster, config);
        assert_eq!(reveal.verify(&commitment), Err(CommitmentError::SeedMismatch));
    }

    #[test]
    fn test_changed_inputs_fail() {
        let (id, seed, roster, config) = fixture();
        let commitment = RaceCommitment::new(id, &seed, &roster, &config);

        let other_roster = Roster::with_count(4).unwrap();
        assert_eq!(
            commitment.verify_inputs(id, &seed, &other_roster, &config),
            Err(CommitmentError::RosterMismatch)
        );

        let mut other_config = config.clone();
        other_config.race_timeout_ticks += 1;
        assert_eq!(
            commitment.verify_inputs(id, &seed, &roster, &other_config),
            Err(CommitmentError::ConfigMismatch)
        );

        assert!(matches!(
            commitment.verify_inputs(Uuid::from_bytes([9; 16]), &seed, &roster, &config),
            Err(CommitmentError::RaceIdMismatch { .. })
        ));
    }

    #[test]
    fn test_forged_hash_fails() {
        let (id, seed, roster, config) = fixture();
        let mut commitment = RaceCommitment::new(id, &seed, &roster, &config);
        commitment.commitment_hash[0] ^= 0xFF;
        assert_eq!(
            commitment.verify_inputs(id, &seed, &roster, &config),
            Err(CommitmentError::HashMismatch)
        );
    }
}
