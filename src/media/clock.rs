//! Host clock used to stamp captured samples
//!
//! Every capture source reads the same monotonic origin, so presentation
//! times from different tracks can be compared directly.

use super::time::MediaTime;
use std::sync::OnceLock;
use std::time::Instant;

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Current host time, in nanoseconds since the first call in this process
pub fn host_time_now() -> MediaTime {
    let origin = ORIGIN.get_or_init(Instant::now);
    MediaTime::from_duration(origin.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_time_is_monotonic() {
        let a = host_time_now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = host_time_now();
        assert!(b > a);
    }
}
