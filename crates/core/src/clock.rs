//! Wall-clock source and result identity minting.

use std::sync::{Arc, Mutex};

use time::{Duration, OffsetDateTime};

pub use foursight_storage::timestamp::{format_uuid, parse_timestamp, parse_uuid};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> OffsetDateTime;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to. Lets tests walk a check's history
/// forward in controlled steps.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drop sub-microsecond precision so an instant survives a trip through the
/// UUID format unchanged.
pub fn truncate_to_micros(at: OffsetDateTime) -> OffsetDateTime {
    at - Duration::nanoseconds(i64::from(at.nanosecond() % 1_000))
}

/// Mints result UUIDs that strictly increase within this process.
///
/// When the clock has not advanced past the previous UUID (same microsecond,
/// or a clock step backwards) the next UUID is the previous one plus one
/// microsecond. This is the per-worker monotonic counter that keeps a chained
/// action's UUID above the UUID of the check that produced it.
pub struct IdMinter {
    clock: Arc<dyn Clock>,
    last: Mutex<Option<OffsetDateTime>>,
}

impl IdMinter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        IdMinter {
            clock,
            last: Mutex::new(None),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now_utc()
    }

    /// The next identity instant.
    pub fn mint_instant(&self) -> OffsetDateTime {
        let now = truncate_to_micros(self.clock.now_utc());
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let next = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }

    /// The next UUID, `YYYY-MM-DDTHH:MM:SS.ffffff`.
    pub fn mint(&self) -> String {
        format_uuid(self.mint_instant())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::datetime;

    #[test]
    fn frozen_clock_still_yields_increasing_ids() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-02-01 12:00 UTC)));
        let ids = IdMinter::new(clock.clone());
        assert_eq!(ids.mint(), "2024-02-01T12:00:00.000000");
        assert_eq!(ids.mint(), "2024-02-01T12:00:00.000001");
        assert_eq!(ids.mint(), "2024-02-01T12:00:00.000002");

        clock.advance(Duration::minutes(1));
        assert_eq!(ids.mint(), "2024-02-01T12:01:00.000000");
    }

    #[test]
    fn clock_stepping_back_does_not_reuse_ids() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-02-01 12:00 UTC)));
        let ids = IdMinter::new(clock.clone());
        let first = ids.mint();
        clock.set(datetime!(2024-02-01 11:00 UTC));
        let second = ids.mint();
        assert!(second > first);
    }

    #[test]
    fn nanoseconds_are_dropped() {
        let at = datetime!(2024-02-01 12:00:00.123456789 UTC);
        assert_eq!(truncate_to_micros(at), datetime!(2024-02-01 12:00:00.123456 UTC));
    }

    proptest! {
        #[test]
        fn minted_ids_strictly_increase(steps in proptest::collection::vec(-5_000i64..5_000, 1..64)) {
            let clock = Arc::new(ManualClock::new(datetime!(2024-02-01 12:00 UTC)));
            let ids = IdMinter::new(clock.clone());
            let mut previous = ids.mint();
            for step in steps {
                clock.advance(Duration::microseconds(step));
                let next = ids.mint();
                prop_assert!(next > previous, "{} !> {}", next, previous);
                previous = next;
            }
        }

        #[test]
        fn minted_ids_parse_back_to_their_instant(offset in 0i64..4_000_000_000_000) {
            let clock = Arc::new(ManualClock::new(
                datetime!(2000-01-01 00:00 UTC) + Duration::microseconds(offset),
            ));
            let ids = IdMinter::new(clock);
            let instant = ids.mint_instant();
            prop_assert_eq!(parse_uuid(&format_uuid(instant)), Some(instant));
        }
    }
}
