//! Page-view timing across load, virtual navigation and unload.
//!
//! A single document can pass through many logical page views without a
//! reload. The clock keeps the time of the most recent boundary so each
//! boundary report can carry the dwell interval of the view it ends.

use std::cell::Cell;
use std::rc::Rc;

use trackkit_core::WallClock;

/// `pageInTime` / `pageOutTime` of one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub page_in_time: Option<i64>,
    pub page_out_time: i64,
}

pub struct SessionClock {
    clock: Rc<dyn WallClock>,
    last_boundary: Cell<Option<i64>>,
}

impl SessionClock {
    pub fn new(clock: Rc<dyn WallClock>) -> Self {
        Self {
            clock,
            last_boundary: Cell::new(None),
        }
    }

    /// Record now as the start of the next view.
    pub fn mark_boundary(&self) {
        self.last_boundary.set(Some(self.clock.now_millis()));
    }

    /// Interval from the last boundary to now. Callers re-mark right after
    /// reporting so the next interval starts at this report.
    pub fn snapshot(&self) -> Interval {
        Interval {
            page_in_time: self.last_boundary.get(),
            page_out_time: self.clock.now_millis(),
        }
    }

    pub fn last_boundary(&self) -> Option<i64> {
        self.last_boundary.get()
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackkit_core::ManualClock;

    #[test]
    fn test_no_boundary_before_load() {
        let clock = Rc::new(ManualClock::new(500));
        let session = SessionClock::new(clock);
        let interval = session.snapshot();
        assert_eq!(interval.page_in_time, None);
        assert_eq!(interval.page_out_time, 500);
    }

    #[test]
    fn test_snapshot_right_after_mark_is_zero_length() {
        let clock = Rc::new(ManualClock::new(1_000));
        let session = SessionClock::new(clock);
        session.mark_boundary();
        let interval = session.snapshot();
        assert_eq!(interval.page_in_time, Some(interval.page_out_time));
    }

    #[test]
    fn test_intervals_chain_across_boundaries() {
        let clock = Rc::new(ManualClock::new(1_000));
        let session = SessionClock::new(clock.clone());
        session.mark_boundary();

        clock.advance(400);
        let first = session.snapshot();
        session.mark_boundary();

        clock.advance(250);
        let second = session.snapshot();

        assert_eq!(first, Interval { page_in_time: Some(1_000), page_out_time: 1_400 });
        assert_eq!(second, Interval { page_in_time: Some(1_400), page_out_time: 1_650 });
    }
}
