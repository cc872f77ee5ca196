use chrono::{Local, NaiveDate};

use crate::model::Ms;

/// Source of "today" and "now" for the booking path.
pub trait Clock: Send + Sync {
    /// The local calendar date; bookings strictly before it are rejected.
    fn today(&self) -> NaiveDate;
    fn now_ms(&self) -> Ms;
}

/// Wall clock in the host's local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now_ms(&self) -> Ms {
        Local::now().timestamp_millis()
    }
}

/// A clock pinned to one instant, for tests and simulations.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub today: NaiveDate,
    pub now_ms: Ms,
}

impl FixedClock {
    pub fn on(today: NaiveDate) -> Self {
        Self { today, now_ms: 0 }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }

    fn now_ms(&self) -> Ms {
        self.now_ms
    }
}
