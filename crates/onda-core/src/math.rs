//! Level conversions.
//!
//! Decibel helpers for code and tests that express signal levels in dB.
//! Allocation-free and `no_std`-clean via `libm`.

use libm::{log10f, powf};

/// Linear gain for a level in decibels.
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    powf(10.0, db / 20.0)
}

/// Level in decibels for a linear gain.
///
/// The input is floored at 1e-10, so silence maps to -200 dB rather than
/// negative infinity.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    20.0 * log10f(linear.max(1e-10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_levels() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-6);
        assert!((linear_to_db(1.0)).abs() < 1e-6);
        assert!((linear_to_db(0.5) + 6.0206).abs() < 1e-3);
    }

    #[test]
    fn db_round_trip() {
        for &db in &[-60.0, -12.0, -6.0, 0.0, 6.0, 12.0] {
            let back = linear_to_db(db_to_linear(db));
            assert!((back - db).abs() < 0.01, "{db} dB round-tripped to {back}");
        }
    }

    #[test]
    fn zero_gain_is_floored() {
        assert!(linear_to_db(0.0) <= -190.0);
        assert!(linear_to_db(-1.0) <= -190.0);
    }
}
