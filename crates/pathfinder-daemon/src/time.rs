//! Conversion between the monotonic [`Instant`] the domain reasons in and the
//! wall-clock Unix timestamps the wire protocol carries.
//!
//! [`pathfinder_core::Domain`] is deliberately tested and driven with
//! `Instant` (see its module docs): `Instant` supports clean arithmetic
//! (`now + Duration`) without the DST/leap-second concerns of `SystemTime`,
//! which makes orphan-deadline tests straightforward. The wire protocol,
//! though, reports `orphan-since` as a timestamp a client can log or display.
//! `TimeAnchor` bridges the two by recording one `(Instant, unix-seconds)`
//! pair at startup and translating any later `Instant` relative to it.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy)]
pub struct TimeAnchor {
    instant: Instant,
    unix_secs: u64,
}

impl TimeAnchor {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            unix_secs: system_time_to_unix(SystemTime::now()),
        }
    }

    /// Convert an `Instant` taken after this anchor's `now()` call into Unix
    /// seconds. Instants from before the anchor saturate to the anchor's own
    /// timestamp rather than underflowing.
    pub fn to_unix(&self, at: Instant) -> u64 {
        if at >= self.instant {
            self.unix_secs + (at - self.instant).as_secs()
        } else {
            self.unix_secs.saturating_sub((self.instant - at).as_secs())
        }
    }
}

pub fn system_time_to_unix(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn later_instant_advances_unix_seconds() {
        let anchor = TimeAnchor::now();
        let later = anchor.instant + Duration::from_secs(42);
        assert_eq!(anchor.to_unix(later), anchor.unix_secs + 42);
    }

    #[test]
    fn earlier_instant_does_not_panic() {
        let anchor = TimeAnchor {
            instant: Instant::now(),
            unix_secs: 10,
        };
        let earlier = anchor.instant - Duration::from_secs(100);
        assert_eq!(anchor.to_unix(earlier), 0);
    }
}
