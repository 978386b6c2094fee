//! Race Seed and Seed Generation
//!
//! The [`Seed`] is the single root of randomness for one race. It is drawn
//! once by [`SeedGenerator`], committed (hashed and published) before tick 1,
//! and never mutated afterwards.

use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::error;

use super::hash::{hash_with_domain, StateHash, StateHasher};

/// Seed length in bytes.
pub const SEED_LEN: usize = 32;

/// Domain separator for seed commitments.
const SEED_COMMIT_DOMAIN: &[u8] = b"MARBLE_RACE_SEED_COMMIT_V1";

/// Domain separator for auxiliary entropy folding.
const AUX_ENTROPY_DOMAIN: &[u8] = b"MARBLE_RACE_AUX_ENTROPY_V1";

/// Errors raised while producing or parsing a seed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeedError {
    /// No cryptographically secure random source is available.
    #[error("secure entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// Seed hex string contained a non-hex character.
    #[error("invalid seed hex: {0}")]
    InvalidHex(String),

    /// Seed had the wrong number of bytes.
    #[error("seed must be {expected} bytes, got {got}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Length provided.
        got: usize,
    },
}

// =============================================================================
// SEED
// =============================================================================

/// 32-byte committed race seed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Seed([u8; SEED_LEN]);

impl Seed {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from 64 hex characters (optional `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self, SeedError> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| SeedError::InvalidHex(e.to_string()))?;
        if bytes.len() != SEED_LEN {
            return Err(SeedError::InvalidLength {
                expected: SEED_LEN,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; SEED_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Lowercase hex encoding (64 characters, no prefix).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    /// Hash published before the race starts.
    ///
    /// Revealing the seed later lets anyone check it against this value.
    pub fn commitment(&self) -> StateHash {
        hash_with_domain(SEED_COMMIT_DOMAIN, &self.0)
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed({}..)", hex::encode(&self.0[..4]))
    }
}

impl Serialize for Seed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Seed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Seed::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// ENTROPY SOURCES
// =============================================================================

/// Where the primary bytes of a seed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedProvenance {
    /// Operating-system CSPRNG.
    Secure,
    /// Non-secure fallback. Only reachable in test builds.
    InsecureTestOnly,
}

impl fmt::Display for SeedProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secure => write!(f, "secure"),
            Self::InsecureTestOnly => write!(f, "INSECURE-TEST-ONLY"),
        }
    }
}

/// A source of primary seed bytes.
pub trait EntropySource: Send {
    /// Fill `buf` completely or fail.
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), SeedError>;

    /// Provenance tag attached to seeds drawn from this source.
    fn provenance(&self) -> SeedProvenance;
}

/// Operating-system CSPRNG (`getrandom` under the hood).
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), SeedError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| SeedError::EntropyUnavailable(e.to_string()))
    }

    fn provenance(&self) -> SeedProvenance {
        SeedProvenance::Secure
    }
}

/// Clock-seeded Xorshift fallback. Only exists in test builds.
#[cfg(test)]
#[derive(Debug, Default, Clone, Copy)]
pub struct InsecureEntropy;

#[cfg(test)]
impl EntropySource for InsecureEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), SeedError> {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
        let mut rng = super::rng::DeterministicRng::new(nanos ^ monotonic_nanos());
        for chunk in buf.chunks_mut(8) {
            let word = rng.next_u64().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        Ok(())
    }

    fn provenance(&self) -> SeedProvenance {
        SeedProvenance::InsecureTestOnly
    }
}

// =============================================================================
// SEED GENERATOR
// =============================================================================

/// A freshly generated seed with its provenance tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSeed {
    /// The seed itself.
    pub seed: Seed,
    /// Where the primary entropy came from.
    pub provenance: SeedProvenance,
}

impl GeneratedSeed {
    /// True when the primary bytes came from a secure source.
    pub fn is_secure(&self) -> bool {
        self.provenance == SeedProvenance::Secure
    }
}

/// Produces race seeds.
///
/// Primary bytes come from the configured [`EntropySource`]; wall-clock
/// time, a monotonic clock reading and the roster fingerprint are folded in
/// with XOR. The auxiliary inputs harden a weak primary source, they never
/// replace it.
pub struct SeedGenerator {
    primary: Box<dyn EntropySource>,
    #[cfg(test)]
    fallback: Option<Box<dyn EntropySource>>,
}

impl Default for SeedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SeedGenerator {
    /// Generator backed by the operating-system CSPRNG.
    pub fn new() -> Self {
        Self::with_source(Box::new(OsEntropy))
    }

    /// Generator backed by a custom primary source.
    pub fn with_source(primary: Box<dyn EntropySource>) -> Self {
        Self {
            primary,
            #[cfg(test)]
            fallback: None,
        }
    }

    /// Allow the clock-seeded fallback when the primary source fails.
    #[cfg(test)]
    pub fn with_insecure_fallback(mut self) -> Self {
        self.fallback = Some(Box::new(InsecureEntropy));
        self
    }

    /// Draw a new seed.
    ///
    /// `roster_fingerprint` binds the auxiliary entropy to the entrants.
    /// Fails with [`SeedError::EntropyUnavailable`] when no secure source is
    /// available; that error is fatal for the race.
    pub fn generate(&mut self, roster_fingerprint: &StateHash) -> Result<GeneratedSeed, SeedError> {
        let mut bytes = [0u8; SEED_LEN];
        let provenance = self.fill_primary(&mut bytes)?;

        let aux = auxiliary_entropy(roster_fingerprint);
        for (b, a) in bytes.iter_mut().zip(aux.iter()) {
            *b ^= a;
        }

        Ok(GeneratedSeed {
            seed: Seed(bytes),
            provenance,
        })
    }

    #[cfg(test)]
    fn fill_primary(&mut self, buf: &mut [u8]) -> Result<SeedProvenance, SeedError> {
        match self.primary.fill(buf) {
            Ok(()) => Ok(self.primary.provenance()),
            Err(err) => match self.fallback.as_mut() {
                Some(fallback) => {
                    tracing::warn!(%err, "primary entropy failed, using INSECURE test fallback");
                    fallback.fill(buf)?;
                    Ok(fallback.provenance())
                }
                None => {
                    error!(%err, "no secure entropy source available");
                    Err(err)
                }
            },
        }
    }

    #[cfg(not(test))]
    fn fill_primary(&mut self, buf: &mut [u8]) -> Result<SeedProvenance, SeedError> {
        self.primary.fill(buf).map_err(|err| {
            error!(%err, "no secure entropy source available");
            err
        })?;
        Ok(self.primary.provenance())
    }
}

/// Nanoseconds since the first call in this process.
fn monotonic_nanos() -> u64 {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    ANCHOR.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

fn auxiliary_entropy(roster_fingerprint: &StateHash) -> StateHash {
    let mut hasher = StateHasher::new(AUX_ENTROPY_DOMAIN);
    hasher.update_u64(chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64);
    hasher.update_u64(monotonic_nanos());
    hasher.update_bytes(roster_fingerprint);
    hasher.finalize()
}

// =============================================================================
// TESTS
// =============================================================================
