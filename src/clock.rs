use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Datelike, Local, Months, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};

/// Calendar month containing an instant, as a half-open `[start, end)` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RateWindow {
    // Month boundaries are taken in `now`'s own timezone
    pub fn containing<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let tz = now.timezone();
        let date = now.date_naive();
        let first = date.with_day(1).unwrap_or(date);
        // the last representable month has no successor
        let end = match first.checked_add_months(Months::new(1)) {
            Some(next) => local_midnight(&tz, next),
            None => DateTime::<Utc>::MAX_UTC,
        };

        Self {
            start: local_midnight(&tz, first),
            end,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        // midnight skipped by a DST jump: the day starts an hour later
        .or_else(|| {
            tz.from_local_datetime(&(midnight + TimeDelta::hours(1)))
                .earliest()
        })
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn current_window(&self) -> RateWindow {
        RateWindow::containing(&self.now())
    }
}

// Wall clock; windows follow the host's local calendar
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn current_window(&self) -> RateWindow {
        RateWindow::containing(&Local::now())
    }
}

/// Settable clock with UTC month windows.
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn advance(&self, by: TimeDelta) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::Relaxed)).unwrap_or_default()
    }
}
