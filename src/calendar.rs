//! Session calendar: maps UTC timestamps to trading session dates.
//!
//! A trading session is labeled by the calendar date it closes on. The close
//! boundary is configurable per weekday (forex-style 22:00 UTC by default).
//! A bar before Monday's boundary belongs to Monday's session; a bar at or
//! after the boundary belongs to Tuesday's session. Weekend bars belong to
//! the following Monday.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Session close boundary for one weekday, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBoundary {
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
}

impl Default for SessionBoundary {
    fn default() -> Self {
        Self { hour: 22, minute: 0 }
    }
}

impl SessionBoundary {
    fn minute_of_day(&self) -> u32 {
        self.hour * 60 + self.minute
    }
}

/// Per-weekday session close schedule. Saturday and Sunday are not keyed;
/// weekend bars are attributed to the following Monday session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSchedule {
    pub monday: SessionBoundary,
    pub tuesday: SessionBoundary,
    pub wednesday: SessionBoundary,
    pub thursday: SessionBoundary,
    pub friday: SessionBoundary,
}

impl Default for SessionSchedule {
    fn default() -> Self {
        Self {
            monday: SessionBoundary::default(),
            tuesday: SessionBoundary::default(),
            wednesday: SessionBoundary::default(),
            thursday: SessionBoundary::default(),
            friday: SessionBoundary::default(),
        }
    }
}

impl SessionSchedule {
    /// Boundary for a weekday. Weekend days have no boundary of their own.
    pub fn boundary(&self, weekday: Weekday) -> Option<SessionBoundary> {
        match weekday {
            Weekday::Mon => Some(self.monday),
            Weekday::Tue => Some(self.tuesday),
            Weekday::Wed => Some(self.wednesday),
            Weekday::Thu => Some(self.thursday),
            Weekday::Fri => Some(self.friday),
            Weekday::Sat | Weekday::Sun => None,
        }
    }
}

/// Assign a session date (close-day) to a UTC timestamp.
pub fn session_date(ts: DateTime<Utc>, schedule: &SessionSchedule) -> NaiveDate {
    let weekday = ts.weekday();

    // Weekend bars roll forward to Monday
    match weekday {
        Weekday::Sat => return ts.date_naive() + Duration::days(2),
        Weekday::Sun => return ts.date_naive() + Duration::days(1),
        _ => {}
    }

    let boundary = schedule.boundary(weekday).unwrap_or_default();
    let minute_of_day = ts.hour() * 60 + ts.minute();

    if minute_of_day < boundary.minute_of_day() {
        ts.date_naive()
    } else {
        next_trading_day(ts.date_naive())
    }
}

/// The next non-weekend calendar date after `date`.
fn next_trading_day(date: NaiveDate) -> NaiveDate {
    let next = date + Duration::days(1);
    match next.weekday() {
        Weekday::Sat => next + Duration::days(2),
        Weekday::Sun => next + Duration::days(1),
        _ => next,
    }
}
