//! Rational presentation timestamps

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Nanosecond timescale used by the host clock
pub const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// A presentation timestamp expressed as `value / timescale` seconds.
///
/// Two timestamps with different timescales compare by their exact rational
/// value, so `1/2` sorts before `1/1`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: u32,
}

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime { value: 0, timescale: 1 };

    /// Create a timestamp. A zero timescale is treated as 1.
    pub const fn new(value: i64, timescale: u32) -> Self {
        let timescale = if timescale == 0 { 1 } else { timescale };
        Self { value, timescale }
    }

    /// Convert a duration to a nanosecond timestamp
    pub fn from_duration(duration: Duration) -> Self {
        let nanos = duration.as_nanos().min(i64::MAX as u128) as i64;
        Self::new(nanos, NANOS_PER_SECOND)
    }

    /// Convert seconds to a nanosecond timestamp
    pub fn from_seconds(seconds: f64) -> Self {
        Self::new((seconds * NANOS_PER_SECOND as f64).round() as i64, NANOS_PER_SECOND)
    }

    pub fn seconds(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Signed distance from `origin` to `self`, in seconds
    pub fn seconds_since(&self, origin: MediaTime) -> f64 {
        self.seconds() - origin.seconds()
    }

    fn scaled(&self, other_timescale: u32) -> i128 {
        self.value as i128 * other_timescale as i128
    }
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.scaled(other.timescale).cmp(&other.scaled(self.timescale))
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_across_timescales() {
        assert!(MediaTime::new(1, 2) < MediaTime::new(1, 1));
        assert!(MediaTime::new(3, 2) > MediaTime::new(1, 1));
        assert_eq!(MediaTime::new(30, 60), MediaTime::new(1, 2));
    }

    #[test]
    fn test_zero_timescale_is_normalized() {
        let t = MediaTime::new(5, 0);
        assert_eq!(t.timescale, 1);
        assert_eq!(t.seconds(), 5.0);
    }

    #[test]
    fn test_from_duration() {
        let t = MediaTime::from_duration(Duration::from_millis(1500));
        assert_eq!(t, MediaTime::new(3, 2));
        assert!((t.seconds() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_seconds_since() {
        let origin = MediaTime::new(10, 1);
        let t = MediaTime::new(25, 2);
        assert!((t.seconds_since(origin) - 2.5).abs() < 1e-9);
        assert!(origin.seconds_since(t) < 0.0);
    }
}
