//! Numeric conversion helpers centralizing money and unit casts.

use num_traits::cast::cast;

/// Convert a dollar amount to whole cents, rounding half away from zero.
/// Non-finite input yields 0; out-of-range input saturates.
#[must_use]
pub fn dollars_to_cents(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let cents = (value * 100.0).round();
    let min = cast::<i64, f64>(i64::MIN).unwrap_or(f64::MIN);
    let max = cast::<i64, f64>(i64::MAX).unwrap_or(f64::MAX);
    cast::<f64, i64>(cents.clamp(min, max)).unwrap_or(0)
}

/// Convert cents back to dollars, allowing precision loss in a single location.
#[must_use]
pub fn cents_to_dollars(cents: i64) -> f64 {
    cast::<i64, f64>(cents).unwrap_or(0.0) / 100.0
}

/// Ceil a f64 and clamp it to the u32 range, returning 0 for non-finite values.
#[must_use]
pub fn ceil_f64_to_u32(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    let max = f64::from(u32::MAX);
    cast::<f64, u32>(value.ceil().clamp(0.0, max)).unwrap_or(0)
}

/// Floor a f64 and clamp it to the u32 range, returning 0 for non-finite values.
#[must_use]
pub fn floor_f64_to_u32(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    let max = f64::from(u32::MAX);
    cast::<f64, u32>(value.floor().clamp(0.0, max)).unwrap_or(0)
}

/// Absolute-difference comparison used for player-entered figures.
#[must_use]
pub fn approx_eq(left: f64, right: f64, tolerance: f64) -> bool {
    (left - right).abs() <= tolerance
}
