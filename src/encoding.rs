//! Day-of-week sets, reminder clock times and intake slots, plus the single
//! eligibility rule shared by the form summary, the reminder scheduler and the
//! progress aggregator.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const DAY_NAMES: [&str; 7] = ["Пн", "Вт", "Ср", "Чт", "Пт", "Сб", "Вс"];

const MONTHS_GENITIVE: [&str; 12] = [
    "января", "февраля", "марта", "апреля", "мая", "июня",
    "июля", "августа", "сентября", "октября", "ноября", "декабря",
];

/// Stored slot value for schedules without explicit reminder times.
pub const WHOLE_DAY_SLOT: &str = "all-day";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("time must look like HH:MM: {0}")]
    InvalidTime(String),

    #[error("minutes must be 00 or 30: {0}")]
    InvalidMinutes(String),

    #[error("day index out of range: {0}")]
    InvalidDay(i64),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid slot: {0}")]
    InvalidSlot(String),
}

/// Set of weekday indices, Monday = 0. An empty set means every day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaySet(BTreeSet<u8>);

impl DaySet {
    pub fn every_day() -> Self {
        DaySet(BTreeSet::new())
    }

    pub fn from_indices<I>(indices: I) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = i64>,
    {
        let mut set = BTreeSet::new();
        for index in indices {
            set.insert(day_index(index)?);
        }
        Ok(DaySet(set))
    }

    /// Flips membership of one day. Returns the new membership.
    pub fn toggle(&mut self, day: u8) -> Result<bool, ParseError> {
        let day = day_index(i64::from(day))?;
        if self.0.remove(&day) {
            Ok(false)
        } else {
            self.0.insert(day);
            Ok(true)
        }
    }

    pub fn contains(&self, day: u8) -> bool {
        self.0.contains(&day)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ascending indices, the wire order.
    pub fn indices(&self) -> Vec<u8> {
        self.0.iter().copied().collect()
    }

    pub fn includes_weekday(&self, date: NaiveDate) -> bool {
        self.0.is_empty() || self.0.contains(&weekday_index(date))
    }

    /// "каждый день" for the empty and the full set, otherwise short day names.
    pub fn describe(&self) -> String {
        if self.0.is_empty() || self.0.len() == 7 {
            return "каждый день".to_string();
        }
        self.0
            .iter()
            .map(|d| DAY_NAMES[*d as usize])
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Serialize for DaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.indices().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<Vec<i64>>::deserialize(deserializer)?.unwrap_or_default();
        DaySet::from_indices(raw).map_err(serde::de::Error::custom)
    }
}

fn day_index(index: i64) -> Result<u8, ParseError> {
    if (0..=6).contains(&index) {
        Ok(index as u8)
    } else {
        Err(ParseError::InvalidDay(index))
    }
}

pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

/// A reminder clock time on the half-hour grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReminderTime(NaiveTime);

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?:[01]\d|2[0-3]):[0-5]\d$").expect("valid time regex"))
}

impl ReminderTime {
    pub fn parse(token: &str) -> Result<Self, ParseError> {
        let token = token.trim();
        if !time_pattern().is_match(token) {
            return Err(ParseError::InvalidTime(token.to_string()));
        }
        let (hours, minutes) = token
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidTime(token.to_string()))?;
        if minutes != "00" && minutes != "30" {
            return Err(ParseError::InvalidMinutes(token.to_string()));
        }
        let hours: u32 = hours
            .parse()
            .map_err(|_| ParseError::InvalidTime(token.to_string()))?;
        let minutes: u32 = minutes
            .parse()
            .map_err(|_| ParseError::InvalidTime(token.to_string()))?;
        NaiveTime::from_hms_opt(hours, minutes, 0)
            .map(ReminderTime)
            .ok_or_else(|| ParseError::InvalidTime(token.to_string()))
    }

    /// Same hour and minute as `now`, seconds ignored.
    pub fn matches(&self, now: NaiveTime) -> bool {
        self.0.hour() == now.hour() && self.0.minute() == now.minute()
    }

    pub fn is_before(&self, now: NaiveTime) -> bool {
        (self.0.hour(), self.0.minute()) < (now.hour(), now.minute())
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for ReminderTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReminderTime::parse(s)
    }
}

impl Serialize for ReminderTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReminderTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ReminderTime::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parses a comma-separated list of reminder times, keeping entry order and
/// dropping repeats.
pub fn parse_reminder_times(input: &str) -> Result<Vec<ReminderTime>, ParseError> {
    let mut times: Vec<ReminderTime> = Vec::new();
    for token in input.split(',') {
        let time = ReminderTime::parse(token)?;
        if !times.contains(&time) {
            times.push(time);
        }
    }
    Ok(times)
}

/// One expected intake occurrence on a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    At(ReminderTime),
    WholeDay,
}

impl Slot {
    pub fn as_storage(&self) -> String {
        match self {
            Slot::At(time) => time.to_string(),
            Slot::WholeDay => WHOLE_DAY_SLOT.to_string(),
        }
    }

    pub fn from_storage(raw: &str) -> Result<Self, ParseError> {
        if raw == WHOLE_DAY_SLOT || raw.is_empty() {
            return Ok(Slot::WholeDay);
        }
        ReminderTime::parse(raw)
            .map(Slot::At)
            .map_err(|_| ParseError::InvalidSlot(raw.to_string()))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::At(time) => write!(f, "{}", time),
            Slot::WholeDay => write!(f, "весь день"),
        }
    }
}

/// Accepts `YYYY-MM-DD` and `DD.MM.YYYY`.
pub fn parse_date(input: &str) -> Result<NaiveDate, ParseError> {
    let input = input.trim();
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(input, "%d.%m.%Y"))
        .map_err(|_| ParseError::InvalidDate(input.to_string()))
}

/// Eligibility: inside the date range and on a selected weekday.
pub fn is_active_on(
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    days: &DaySet,
    date: NaiveDate,
) -> bool {
    start_date <= date && end_date.map_or(true, |end| end >= date) && days.includes_weekday(date)
}

/// "6 июля 2025"
pub fn format_date_ru(date: NaiveDate) -> String {
    format!(
        "{} {} {}",
        date.day(),
        MONTHS_GENITIVE[date.month0() as usize],
        date.year()
    )
}
