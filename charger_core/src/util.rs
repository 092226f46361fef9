//! Small time helpers shared by the phases and the dispatcher.

use std::time::{Duration, Instant};

pub const SECS_PER_MIN: u64 = 60;
pub const SECS_PER_HOUR: u64 = 3_600;

#[inline]
pub const fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * SECS_PER_MIN)
}

#[inline]
pub const fn hours(n: u64) -> Duration {
    Duration::from_secs(n * SECS_PER_HOUR)
}

/// Time left until `deadline`, zero once it has passed.
#[inline]
pub fn until(deadline: Instant, now: Instant) -> Duration {
    deadline.saturating_duration_since(now)
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
#[inline]
pub fn as_millis_u64(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_helpers() {
        assert_eq!(minutes(20), Duration::from_secs(1200));
        assert_eq!(hours(11), Duration::from_secs(39_600));
        assert_eq!(as_millis_u64(Duration::from_secs(2)), 2000);
    }

    #[test]
    fn until_saturates() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(5);
        assert_eq!(until(later, t0), Duration::from_secs(5));
        assert_eq!(until(t0, later), Duration::ZERO);
    }
}
