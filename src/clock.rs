//! Monotonic microsecond clock.
//!
//! All latency measurements in this crate are taken with `CLOCK_MONOTONIC`
//! via `libc::clock_gettime`, the same primitive the teacher's latency
//! collectors (`task_wakeup.rs`, `collector.rs`) use for nanosecond timing.
//! We report in microseconds since that is the unit the histogram and the
//! output contract both use.

/// Read the monotonic clock, in microseconds.
pub fn now_us() -> u64 {
    let ts = unsafe {
        let mut ts = std::mem::zeroed::<libc::timespec>();
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        ts
    };
    (ts.tv_sec as u64) * 1_000_000 + (ts.tv_nsec as u64) / 1_000
}

/// `now - start`, clamped to zero on a negative delta.
pub fn delta_us(now: u64, start: u64) -> u64 {
    now.saturating_sub(start)
}

/// `now - start`, or `None` if `now < start`.
///
/// Clock anomalies (a sample that appears to have happened before its own
/// start time, which can occur under NTP step adjustments or heavy scheduler
/// skew) are never fatal: callers drop the sample entirely on `None` rather
/// than recording a clamped zero, per the "no sample recorded" rule.
pub fn checked_delta_us(now: u64, start: u64) -> Option<u64> {
    now.checked_sub(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_us_is_monotonic_nondecreasing() {
        let a = now_us();
        let b = now_us();
        assert!(b >= a);
    }

    #[test]
    fn delta_clamps_negative_to_zero() {
        assert_eq!(delta_us(5, 10), 0);
        assert_eq!(delta_us(10, 5), 5);
        assert_eq!(delta_us(10, 10), 0);
    }

    #[test]
    fn checked_delta_distinguishes_anomaly_from_real_zero() {
        assert_eq!(checked_delta_us(10, 10), Some(0));
        assert_eq!(checked_delta_us(10, 5), Some(5));
        assert_eq!(checked_delta_us(5, 10), None);
    }
}
