use chrono::{Local, NaiveDate, NaiveDateTime};

/// Wall-clock source for "today" and scheduler ticks.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Local time of the host, read as a naive wall-clock value.
///
/// Reminder slots are naive "HH:MM" values, so the host zone is assumed to
/// have no DST shifts: run the bot with a fixed-offset `TZ`. If the clock
/// does step back, the recurring loop still never repeats a boundary it has
/// fired, and a slot skipped by a forward jump is delivered by catch-up.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[cfg(test)]
pub struct FixedClock(std::sync::Mutex<NaiveDateTime>);

#[cfg(test)]
impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        FixedClock(std::sync::Mutex::new(now))
    }

    pub fn at(date: &str, time: &str) -> Self {
        let now = NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%Y-%m-%d %H:%M").unwrap();
        Self::new(now)
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.0.lock().unwrap() = now;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}
