//! Race Configuration
//!
//! Human-facing tuning values (floats, JSON-friendly) and the Q16.16
//! [`EngineParams`] they resolve to. Floats are converted exactly once, in
//! [`RaceConfig::params`]; the tick loop only ever sees fixed-point values.

use std::path::Path;
use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, fixed_mul, to_fixed};
use crate::core::hash::{StateHash, StateHasher};

/// Basis points in one whole (100%).
pub const BPS_SCALE: u32 = 10_000;

/// Longest track that leaves Q16.16 headroom for a full tick of movement.
pub const MAX_TRACK_LENGTH: f64 = 16_384.0;

/// Fastest per-tick speed accepted in `speed_range`.
pub const MAX_SPEED: f64 = 256.0;

/// Configuration rejected before tick 0.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A numeric field is out of range or not finite.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field path, e.g. `speed_range`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Event tiers add up to more than 100%.
    #[error("event probability tiers sum to {0} bps, max is {BPS_SCALE}")]
    TiersExceedWhole(u32),

    /// JSON could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// Config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(String),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.into() }
}

// =============================================================================
// CONFIG SECTIONS
// =============================================================================

/// Per-tick event trigger probabilities in basis points.
///
/// Tiers are cumulative: a roll `r` in `[0, 10000)` starts a boost when
/// `r < boost_bps`, a crash when `r < boost_bps + crash_bps`, a fall-off when
/// `r < boost_bps + crash_bps + fall_off_bps`, and nothing otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventTiers {
    /// Boost probability per tick.
    pub boost_bps: u32,
    /// Crash probability per tick.
    pub crash_bps: u32,
    /// Fall-off probability per tick.
    pub fall_off_bps: u32,
}

impl Default for EventTiers {
    fn default() -> Self {
        Self {
            boost_bps: 150,
            crash_bps: 80,
            fall_off_bps: 40,
        }
    }
}

impl EventTiers {
    /// No events at all.
    pub const NONE: EventTiers = EventTiers { boost_bps: 0, crash_bps: 0, fall_off_bps: 0 };

    /// Sum of all tiers.
    pub fn total_bps(&self) -> u32 {
        self.boost_bps
            .saturating_add(self.crash_bps)
            .saturating_add(self.fall_off_bps)
    }
}

/// Post-event recovery.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Speed multiplier while recovering (>= 1.0).
    pub multiplier: f64,
    /// Ticks of recovery after an event expires.
    pub ticks: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { multiplier: 1.15, ticks: 10 }
    }
}

/// Late-race convergence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// Leader progress fraction that switches the rule on.
    pub threshold: f64,
    /// Multiplier applied to the leader (<= 1.0).
    pub leader_slowdown: f64,
    /// Multiplier applied to close trailers (>= 1.0).
    pub catch_up: f64,
    /// Trailers within this fraction of the track behind the leader catch up.
    /// Anyone further back gets no help.
    pub window: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            leader_slowdown: 0.95,
            catch_up: 1.10,
            window: 0.1,
        }
    }
}

// =============================================================================
// RACE CONFIG
// =============================================================================

/// Complete race configuration.
///
/// Part of the audit contract: `(seed, roster, config)` reproduces a race.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    /// Track length in track units.
    pub track_length: f64,
    /// Nominal tick duration in paced mode.
    pub tick_duration_ms: u64,
    /// Tick at which the timeout rule resolves the race.
    pub race_timeout_ticks: u32,
    /// `[S_min, S_max]` base speed in track units per tick.
    pub speed_range: [f64; 2],
    /// Per-tick jitter bound (uniform in `[-jitter, +jitter]`).
    pub jitter: f64,
    /// Event trigger probabilities.
    pub event_probability_tiers: EventTiers,
    /// Post-event recovery.
    pub recovery: RecoveryConfig,
    /// Late-race convergence.
    pub convergence: ConvergenceConfig,
}

impl Default for RaceConfig {
    fn default() -> Self {
        // Mean base speed 1.3/tick over 200 units: ~155 ticks (~8 s at 50 ms)
        Self {
            track_length: 200.0,
            tick_duration_ms: crate::DEFAULT_TICK_DURATION_MS,
            race_timeout_ticks: 400,
            speed_range: [1.0, 1.6],
            jitter: 0.2,
            event_probability_tiers: EventTiers::default(),
            recovery: RecoveryConfig::default(),
            convergence: ConvergenceConfig::default(),
        }
    }
}

impl RaceConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Nominal tick duration.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.tick_duration_ms)
    }

    /// Check every field. Called by [`RaceConfig::params`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = |field: &'static str, value: f64| {
            if value.is_finite() {
                Ok(())
            } else {
                Err(invalid(field, "must be finite"))
            }
        };

        finite("track_length", self.track_length)?;
        if self.track_length <= 0.0 || self.track_length > MAX_TRACK_LENGTH {
            return Err(invalid(
                "track_length",
                format!("must be in (0, {}], got {}", MAX_TRACK_LENGTH, self.track_length),
            ));
        }
        if self.tick_duration_ms == 0 {
            return Err(invalid("tick_duration_ms", "must be > 0"));
        }
        if self.race_timeout_ticks == 0 {
            return Err(invalid("race_timeout_ticks", "must be > 0"));
        }

        let [s_min, s_max] = self.speed_range;
        finite("speed_range", s_min)?;
        finite("speed_range", s_max)?;
        if s_min <= 0.0 || s_min > s_max || s_max > MAX_SPEED {
            return Err(invalid(
                "speed_range",
                format!("need 0 < min <= max <= {}, got [{}, {}]", MAX_SPEED, s_min, s_max),
            ));
        }

        finite("jitter", self.jitter)?;
        if self.jitter < 0.0 || self.jitter > MAX_SPEED {
            return Err(invalid("jitter", format!("must be in [0, {}]", MAX_SPEED)));
        }

        let total = self.event_probability_tiers.total_bps();
        if total > BPS_SCALE {
            return Err(ConfigError::TiersExceedWhole(total));
        }

        let recovery = &self.recovery;
        finite("recovery.multiplier", recovery.multiplier)?;
        if !(1.0..=2.0).contains(&recovery.multiplier) {
            return Err(invalid("recovery.multiplier", "must be in [1.0, 2.0]"));
        }

        let conv = &self.convergence;
        finite("convergence.threshold", conv.threshold)?;
        finite("convergence.leader_slowdown", conv.leader_slowdown)?;
        finite("convergence.catch_up", conv.catch_up)?;
        finite("convergence.window", conv.window)?;
        if conv.threshold <= 0.0 || conv.threshold > 1.0 {
            return Err(invalid("convergence.threshold", "must be in (0, 1]"));
        }
        if conv.leader_slowdown <= 0.0 || conv.leader_slowdown > 1.0 {
            return Err(invalid("convergence.leader_slowdown", "must be in (0, 1]"));
        }
        if !(1.0..=2.0).contains(&conv.catch_up) {
            return Err(invalid("convergence.catch_up", "must be in [1.0, 2.0]"));
        }
        if !(0.0..=1.0).contains(&conv.window) {
            return Err(invalid("convergence.window", "must be in [0, 1]"));
        }

        Ok(())
    }

    /// Validate and resolve to fixed-point engine parameters.
    pub fn params(&self) -> Result<EngineParams, ConfigError> {
        self.validate()?;
        Ok(self.resolve())
    }

    fn resolve(&self) -> EngineParams {
        let track = to_fixed(self.track_length);
        let conv = &self.convergence;

        EngineParams {
            track_length: track,
            timeout_ticks: self.race_timeout_ticks,
            speed_min: to_fixed(self.speed_range[0]),
            speed_max: to_fixed(self.speed_range[1]),
            jitter: to_fixed(self.jitter),
            tiers: self.event_probability_tiers,
            recovery_multiplier: to_fixed(self.recovery.multiplier),
            recovery_ticks: self.recovery.ticks,
            convergence_progress: fixed_mul(track, to_fixed(conv.threshold)),
            leader_slowdown: to_fixed(conv.leader_slowdown),
            catch_up: to_fixed(conv.catch_up),
            catch_up_window: fixed_mul(track, to_fixed(conv.window)),
        }
    }

    /// Domain-separated hash of every field, bound into race commitments.
    pub fn config_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_config();
        hasher.update_f64(self.track_length);
        hasher.update_u64(self.tick_duration_ms);
        hasher.update_u32(self.race_timeout_ticks);
        hasher.update_f64(self.speed_range[0]);
        hasher.update_f64(self.speed_range[1]);
        hasher.update_f64(self.jitter);
        hasher.update_u32(self.event_probability_tiers.boost_bps);
        hasher.update_u32(self.event_probability_tiers.crash_bps);
        hasher.update_u32(self.event_probability_tiers.fall_off_bps);
        hasher.update_f64(self.recovery.multiplier);
        hasher.update_u32(self.recovery.ticks);
        hasher.update_f64(self.convergence.threshold);
        hasher.update_f64(self.convergence.leader_slowdown);
        hasher.update_f64(self.convergence.catch_up);
        hasher.update_f64(self.convergence.window);
        hasher.finalize()
    }
}

// =============================================================================
// ENGINE PARAMS
// =============================================================================

/// Fixed-point parameters consumed by the tick loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineParams {
    /// Track length.
    pub track_length: Fixed,
    /// Timeout tick.
    pub timeout_ticks: u32,
    /// Base speed lower bound.
    pub speed_min: Fixed,
    /// Base speed upper bound.
    pub speed_max: Fixed,
    /// Jitter bound.
    pub jitter: Fixed,
    /// Event tiers.
    pub tiers: EventTiers,
    /// Recovery multiplier.
    pub recovery_multiplier: Fixed,
    /// Recovery length.
    pub recovery_ticks: u32,
    /// Absolute leader progress that enables convergence.
    pub convergence_progress: Fixed,
    /// Leader multiplier.
    pub leader_slowdown: Fixed,
    /// Trailer multiplier.
    pub catch_up: Fixed,
    /// Absolute distance behind the leader that still catches up.
    pub catch_up_window: Fixed,
}

impl Default for EngineParams {
    fn default() -> Self {
        RaceConfig::default().resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::FIXED_ONE;

    #[test]
    fn test_default_config_is_valid() {
        let config = RaceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.params().unwrap(), EngineParams::default());
        assert_eq!(config.tick_duration(), Duration::from_millis(50));
    }

    #[test]
    fn test_default_params_values() {
        let params = EngineParams::default();
        assert_eq!(params.track_length, 200 * FIXED_ONE);
        assert_eq!(params.speed_min, 65536);
        assert_eq!(params.speed_max, 104857);
        assert_eq!(params.jitter, 13107);
        assert_eq!(params.recovery_multiplier, 75366);
        assert_eq!(params.convergence_progress, 200 * 58982);
        assert_eq!(params.catch_up_window, 200 * 6553);
    }

    #[test]
    fn test_rejects_bad_track() {
        let mut config = RaceConfig::default();
        config.track_length = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "track_length", .. })));

        config.track_length = f64::NAN;
        assert!(config.validate().is_err());

        config.track_length = MAX_TRACK_LENGTH * 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_speed_range() {
        let mut config = RaceConfig::default();
        config.speed_range = [2.0, 1.0];
        assert!(matches!(config.params(), Err(ConfigError::Invalid { field: "speed_range", .. })));
    }

    #[test]
    fn test_rejects_zero_timeout_and_tick() {
        let mut config = RaceConfig::default();
        config.race_timeout_ticks = 0;
        assert!(config.validate().is_err());

        let mut config = RaceConfig::default();
        config.tick_duration_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tiers_over_whole() {
        let mut config = RaceConfig::default();
        config.event_probability_tiers = EventTiers {
            boost_bps: 5000,
            crash_bps: 4000,
            fall_off_bps: 2000,
        };
        assert_eq!(config.validate(), Err(ConfigError::TiersExceedWhole(11_000)));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = RaceConfig::from_json_str(
            r#"{"track_length": 100.0, "event_probability_tiers": {"boost_bps": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.track_length, 100.0);
        assert_eq!(config.tick_duration_ms, 50);
        assert_eq!(config.event_probability_tiers.boost_bps, 10);
        assert_eq!(config.event_probability_tiers.crash_bps, 80);
    }

    #[test]
    fn test_bad_json_and_missing_file() {
        assert!(matches!(RaceConfig::from_json_str("{"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            RaceConfig::from_path("/definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_config_hash_tracks_every_change() {
        let base = RaceConfig::default();
        assert_eq!(base.config_hash(), RaceConfig::default().config_hash());

        let mut changed = base.clone();
        changed.convergence.window = 0.2;
        assert_ne!(base.config_hash(), changed.config_hash());

        let mut changed = base.clone();
        changed.event_probability_tiers.fall_off_bps += 1;
        assert_ne!(base.config_hash(), changed.config_hash());
    }
}
