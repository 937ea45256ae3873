//! Age evaluation for files observed in a monitored directory.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

const SECONDS_PER_HOUR: u64 = 60 * 60;

/// How old a file may get before it counts as stalled.
///
/// Configured as a whole number of hours; the constructor is the only
/// way in, so a threshold is always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgeThreshold {
    hours: u64,
}

impl AgeThreshold {
    /// Threshold of `hours` whole hours.
    pub fn from_hours(hours: u64) -> Self {
        Self { hours }
    }

    /// Configured number of hours.
    pub fn hours(&self) -> u64 {
        self.hours
    }

    /// Threshold as a std duration, saturating on overflow.
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.hours.saturating_mul(SECONDS_PER_HOUR))
    }

    fn as_time_delta(&self) -> TimeDelta {
        // Clamp to what chrono can represent; anything larger is
        // effectively "never stalls".
        i64::try_from(self.hours.saturating_mul(SECONDS_PER_HOUR))
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

impl fmt::Display for AgeThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h", self.hours)
    }
}

/// Returns `true` when `now - created` is strictly greater than the
/// threshold. A creation time in the future never counts as stalled.
pub fn is_stalled(
    created: DateTime<Utc>,
    now: DateTime<Utc>,
    threshold: AgeThreshold,
) -> bool {
    let elapsed = now.signed_duration_since(created);
    if elapsed < TimeDelta::zero() {
        return false;
    }
    elapsed > threshold.as_time_delta()
}

/// Elapsed age as a std duration, zero for timestamps in the future.
pub fn elapsed_since(created: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(created)
        .to_std()
        .unwrap_or(Duration::ZERO)
}
