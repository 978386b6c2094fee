//! Q16.16 Fixed-Point Arithmetic
//!
//! Deterministic fixed-point math for the race simulation.
//! All per-tick operations use integer arithmetic only - floats are
//! confined to the configuration boundary and snapshot output.
//!
//! ## Format: Q16.16
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bit Layout: Q16.16 (32-bit signed integer)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  [S][IIIIIIIIIIIIIIII][FFFFFFFFFFFFFFFF]                    │
//! │   │  └──── 16 bits ────┘└──── 16 bits ────┘                 │
//! │   └─ Sign bit                                               │
//! │                                                             │
//! │  Range: -32768.0 to +32767.99998 (approx)                   │
//! │  Precision: 1/65536 ≈ 0.000015 track units                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every Q16.16 value converts to `f64` exactly, so positions published in
//! tick snapshots are bit-identical across platforms.

/// Q16.16 fixed-point number stored as i32.
/// 16 bits integer, 16 bits fractional.
pub type Fixed = i32;

/// Number of fractional bits (16)
pub const FIXED_SCALE: i32 = 16;

/// 1.0 in fixed-point (65536)
pub const FIXED_ONE: Fixed = 1 << FIXED_SCALE; // 65536

/// 0.5 in fixed-point (32768)
pub const FIXED_HALF: Fixed = FIXED_ONE >> 1; // 32768

// =============================================================================
// EVENT CONSTANTS (All as integer literals - NO float conversion!)
// =============================================================================

/// Boost multiplier lower bound: 1.5 = 98304
pub const BOOST_MULT_MIN: Fixed = 98304;

/// Boost multiplier upper bound (exclusive): 1.8 = floor(117964.8)
pub const BOOST_MULT_MAX: Fixed = 117964;

/// Crash multiplier lower bound: 0.3 = floor(19660.8)
pub const CRASH_MULT_MIN: Fixed = 19660;

/// Crash multiplier upper bound (exclusive): 0.4 = floor(26214.4)
pub const CRASH_MULT_MAX: Fixed = 26214;

/// Fall-off multiplier: 0.1 = floor(6553.6)
pub const FALL_OFF_MULT: Fixed = 6553;

/// Fall-off one-time penalty lower bound: 2.0 track units
pub const FALL_OFF_PENALTY_MIN: Fixed = 131072;

/// Fall-off one-time penalty upper bound (exclusive): 5.0 track units
pub const FALL_OFF_PENALTY_MAX: Fixed = 327680;

// =============================================================================
// CORE OPERATIONS
// =============================================================================

/// Convert a float to fixed-point.
///
/// # Warning
/// Only use at compile-time or when resolving configuration. NEVER in the tick loop.
/// Truncates toward zero and saturates at the i32 bounds.
///
/// # Example
/// ```
/// use marble_race::core::fixed::{to_fixed, FIXED_ONE};
/// const MY_VALUE: i32 = to_fixed(2.5);
/// assert_eq!(MY_VALUE, FIXED_ONE * 2 + FIXED_ONE / 2);
/// ```
#[inline]
pub const fn to_fixed(f: f64) -> Fixed {
    (f * (FIXED_ONE as f64)) as Fixed
}

/// Convert fixed-point to float for snapshots and rendering.
///
/// Exact for every Q16.16 value. Never feed the result back into the simulation.
#[inline]
pub fn to_float(f: Fixed) -> f64 {
    f as f64 / FIXED_ONE as f64
}

/// Multiply two fixed-point numbers.
///
/// Uses i64 intermediate to prevent overflow, then truncates
/// (arithmetic shift, rounds toward negative infinity).
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    let wide = (a as i64) * (b as i64);
    (wide >> FIXED_SCALE) as Fixed
}

/// Clamp a widened (i64) intermediate into `[min, max]`.
///
/// Progress updates are summed in i64 so no transient value can wrap
/// before the clamp is applied.
#[inline]
pub fn clamp_wide(value: i64, min: Fixed, max: Fixed) -> Fixed {
    value.max(min as i64).min(max as i64) as Fixed
}

/// Map the upper 32 bits of a random word into `[0, max)`.
///
/// Returns 0 for non-positive `max`. Same scaling as
/// [`DeterministicRng::next_fixed`](crate::core::rng::DeterministicRng::next_fixed).
#[inline]
pub fn fixed_scale_u64(word: u64, max: Fixed) -> Fixed {
    if max <= 0 {
        return 0;
    }
    let raw = (word >> 32) as i64;
    ((raw * max as i64) >> 32) as Fixed
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_constants() {
        assert_eq!(FIXED_ONE, 65536);
        assert_eq!(FIXED_HALF, 32768);
        assert_eq!(FIXED_SCALE, 16);
    }

    #[test]
    fn test_to_fixed() {
        assert_eq!(to_fixed(1.0), FIXED_ONE);
        assert_eq!(to_fixed(0.5), FIXED_HALF);
        assert_eq!(to_fixed(200.0), 200 * FIXED_ONE);
        assert_eq!(to_fixed(-1.0), -FIXED_ONE);
        // Truncates toward zero
        assert_eq!(to_fixed(1.6), 104857);
    }

    #[test]
    fn test_to_float_is_exact() {
        assert_eq!(to_float(FIXED_ONE), 1.0);
        assert_eq!(to_float(FIXED_HALF), 0.5);
        assert_eq!(to_float(1), 1.0 / 65536.0);
        assert_eq!(to_fixed(to_float(13_107_199)), 13_107_199);
    }

    #[test]
    fn test_fixed_mul() {
        assert_eq!(fixed_mul(to_fixed(2.0), to_fixed(3.0)), to_fixed(6.0));
        assert_eq!(fixed_mul(FIXED_HALF, FIXED_HALF), to_fixed(0.25));
        assert_eq!(fixed_mul(to_fixed(-2.0), to_fixed(3.0)), to_fixed(-6.0));
    }

    #[test]
    fn test_event_constants() {
        assert_eq!(BOOST_MULT_MIN, to_fixed(1.5));
        assert_eq!(BOOST_MULT_MAX, to_fixed(1.8));
        assert_eq!(CRASH_MULT_MIN, to_fixed(0.3));
        assert_eq!(CRASH_MULT_MAX, to_fixed(0.4));
        assert_eq!(FALL_OFF_MULT, to_fixed(0.1));
        assert_eq!(FALL_OFF_PENALTY_MIN, 2 * FIXED_ONE);
        assert_eq!(FALL_OFF_PENALTY_MAX, 5 * FIXED_ONE);
    }

    #[test]
    fn test_clamp_wide() {
        assert_eq!(clamp_wide(-5, 0, 100), 0);
        assert_eq!(clamp_wide(50, 0, 100), 50);
        assert_eq!(clamp_wide(i64::MAX, 0, 100), 100);
    }

    #[test]
    fn test_fixed_scale_u64_bounds() {
        assert_eq!(fixed_scale_u64(0, FIXED_ONE), 0);
        assert!(fixed_scale_u64(u64::MAX, FIXED_ONE) < FIXED_ONE);
        assert_eq!(fixed_scale_u64(u64::MAX, 0), 0);
        assert_eq!(fixed_scale_u64(1 << 63, FIXED_ONE), FIXED_HALF);
    }
}
