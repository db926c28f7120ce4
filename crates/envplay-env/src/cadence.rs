//! Tick cadence arithmetic.

use std::time::Duration;

/// Shortest delay ever scheduled between ticks.
pub const MIN_DELAY: Duration = Duration::from_millis(1);

/// Delay until the next tick, given the nominal `interval` and the time
/// already `elapsed` since the last tick fired.
///
/// Time spent waiting on the previous step is subtracted so ticks keep an
/// approximately fixed wall-clock cadence. Never shorter than [`MIN_DELAY`].
///
/// ```
/// use std::time::Duration;
/// use envplay_env::cadence::next_delay;
///
/// let ms = Duration::from_millis;
/// assert_eq!(next_delay(ms(100), ms(30)), ms(70));
/// assert_eq!(next_delay(ms(100), ms(250)), ms(1));
/// ```
pub fn next_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed).max(MIN_DELAY)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
