use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::encoding::{self, format_date_ru, DaySet, ReminderTime, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Any,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
        TimeOfDay::Any,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Any => "any",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        TimeOfDay::ALL.into_iter().find(|t| t.as_str() == raw)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "Утро",
            TimeOfDay::Afternoon => "День",
            TimeOfDay::Evening => "Вечер",
            TimeOfDay::Any => "Любое время",
        }
    }

    pub fn button_label(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "🌅 Утро",
            TimeOfDay::Afternoon => "🌤 День",
            TimeOfDay::Evening => "🌙 Вечер",
            TimeOfDay::Any => "🕓 Любое время",
        }
    }
}

/// A recurring intake definition ("добавка").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub dosage: String,
    pub time_of_day: TimeOfDay,
    pub with_food: bool,
    pub days: DaySet,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub reminder_times: Vec<ReminderTime>,
    pub reminder_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        encoding::is_active_on(self.start_date, self.end_date, &self.days, date)
    }

    /// Expected slots for one eligible day: the reminder times, or a single
    /// whole-day slot when reminders are off or empty.
    pub fn slots(&self) -> Vec<Slot> {
        if self.reminder_enabled && !self.reminder_times.is_empty() {
            self.reminder_times.iter().copied().map(Slot::At).collect()
        } else {
            vec![Slot::WholeDay]
        }
    }

    pub fn reminders_text(&self) -> String {
        if !self.reminder_enabled {
            return "отключены".to_string();
        }
        if self.reminder_times.is_empty() {
            return "—".to_string();
        }
        self.reminder_times
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Detail card for the schedule list.
    pub fn info_text(&self) -> String {
        let end_date = self
            .end_date
            .map(format_date_ru)
            .unwrap_or_else(|| "бессрочно".to_string());

        format!(
            "💊 Добавка: {}\n\
            Дозировка: {}\n\
            Время приёма: {}\n\
            Дни приёма: {}\n\
            С едой: {}\n\
            Дата начала: {}\n\
            Дата окончания: {}\n\
            Напоминания: {}",
            self.name,
            self.dosage,
            self.time_of_day.label(),
            self.days.describe(),
            if self.with_food { "Да" } else { "Нет" },
            format_date_ru(self.start_date),
            end_date,
            self.reminders_text()
        )
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn schedule(user_id: Uuid, name: &str, start_date: NaiveDate, times: &[&str]) -> Schedule {
        let reminder_times: Vec<ReminderTime> = times
            .iter()
            .map(|t| ReminderTime::parse(t).unwrap())
            .collect();
        Schedule {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            dosage: "1 капсула".to_string(),
            time_of_day: TimeOfDay::Morning,
            with_food: true,
            days: DaySet::every_day(),
            start_date,
            end_date: None,
            reminder_enabled: !reminder_times.is_empty(),
            reminder_times,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_time_of_day_payloads() {
        for t in TimeOfDay::ALL {
            assert_eq!(TimeOfDay::parse(t.as_str()), Some(t));
        }
        assert_eq!(TimeOfDay::parse("night"), None);
    }

    #[test]
    fn test_slots_fall_back_to_whole_day() {
        let mut s = fixtures::schedule(Uuid::new_v4(), "D3", date(2025, 7, 1), &["08:00", "13:30"]);
        assert_eq!(s.slots().len(), 2);

        s.reminder_enabled = false;
        assert_eq!(s.slots(), vec![Slot::WholeDay]);

        let none = fixtures::schedule(Uuid::new_v4(), "Mg", date(2025, 7, 1), &[]);
        assert_eq!(none.slots(), vec![Slot::WholeDay]);
    }

    #[test]
    fn test_info_text_mentions_every_field() {
        let mut s = fixtures::schedule(Uuid::new_v4(), "Витамин D", date(2025, 7, 6), &["08:00"]);
        s.end_date = Some(date(2025, 8, 3));
        let text = s.info_text();
        assert!(text.contains("Витамин D"));
        assert!(text.contains("Утро"));
        assert!(text.contains("каждый день"));
        assert!(text.contains("6 июля 2025"));
        assert!(text.contains("3 августа 2025"));
        assert!(text.contains("08:00"));
    }
}
