//! Exponential backoff with jitter
//!
//! Pure functions of the attempt number and [`RetrySettings`]; the RNG is
//! supplied by the caller so results are reproducible with a seeded RNG.

use std::time::Duration;

use rand::Rng;

use crate::config::RetrySettings;

/// Delay before the retry that follows `attempt` (1-based), without jitter
///
/// `min(max_delay, base_delay * multiplier^(attempt - 1))`
pub fn base_delay_for(attempt: u32, settings: &RetrySettings) -> Duration {
    let exponent = attempt.max(1) - 1;
    let base = settings.base_delay.as_secs_f64();
    let max = settings.max_delay.as_secs_f64();
    if base <= 0.0 {
        return Duration::ZERO;
    }

    let raw = base * settings.multiplier.max(0.0).powi(exponent.min(i32::MAX as u32) as i32);
    // Overflow to infinity or NaN from huge exponents collapses to the cap
    let capped = if raw.is_finite() { raw.min(max) } else { max };

    Duration::from_secs_f64(capped.max(0.0))
}

/// Delay before the retry that follows `attempt` (1-based), with jitter
///
/// Jitter is uniform in `[-jitter_fraction, +jitter_fraction] * delay`. The
/// result is clamped to `[0, max_delay]`.
pub fn delay<R: Rng + ?Sized>(attempt: u32, settings: &RetrySettings, rng: &mut R) -> Duration {
    let capped = base_delay_for(attempt, settings).as_secs_f64();
    let fraction = settings.jitter_fraction.clamp(0.0, 1.0);

    let jittered = if fraction > 0.0 && capped > 0.0 {
        let range = capped * fraction;
        capped + rng.gen_range(-range..=range)
    } else {
        capped
    };

    let max = settings.max_delay.as_secs_f64();
    Duration::from_secs_f64(jittered.clamp(0.0, max.max(0.0)))
}
