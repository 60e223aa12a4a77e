use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::conversation::Step;
use crate::encoding::{DaySet, ReminderTime};
use crate::models::{Schedule, TimeOfDay};

/// Fields collected so far by the add-schedule form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleDraft {
    pub name: String,
    pub dosage: String,
    pub time_of_day: Option<TimeOfDay>,
    pub with_food: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub days: DaySet,
    pub reminder_times: Vec<ReminderTime>,
    pub reminder_enabled: bool,
}

impl ScheduleDraft {
    pub fn summary(&self) -> String {
        let start = self
            .start_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "—".to_string());
        let end = self
            .end_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "бессрочно".to_string());
        let reminders = if self.reminder_enabled {
            format!(
                "• Время напоминания: {}",
                self.reminder_times
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        } else {
            "• Напоминания отключены".to_string()
        };

        format!(
            "🩺 Вот что я записал:\n\
            • Название: {}\n\
            • Дозировка: {}\n\
            • Время приёма: {}\n\
            • Принимать с едой: {}\n\
            • Дни недели: {}\n\
            • Дата начала: {}\n\
            • Дата окончания: {}\n\
            {}",
            self.name,
            self.dosage,
            self.time_of_day.unwrap_or(TimeOfDay::Any).label(),
            if self.with_food { "да" } else { "нет" },
            self.days.describe(),
            start,
            end,
            reminders
        )
    }

    pub fn into_schedule(self, user_id: Uuid, today: NaiveDate) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            user_id,
            name: self.name,
            dosage: self.dosage,
            time_of_day: self.time_of_day.unwrap_or(TimeOfDay::Any),
            with_food: self.with_food,
            days: self.days,
            start_date: self.start_date.unwrap_or(today),
            end_date: self.end_date,
            reminder_enabled: self.reminder_enabled && !self.reminder_times.is_empty(),
            reminder_times: if self.reminder_enabled {
                self.reminder_times
            } else {
                Vec::new()
            },
            created_at: Utc::now(),
        }
    }
}

/// Per-user in-progress form. Lives only in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    pub step: Step,
    pub draft: ScheduleDraft,
    /// Toggled on the weekday keyboard; copied into the draft on "done".
    pub selected_days: DaySet,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            step: Step::Name,
            draft: ScheduleDraft::default(),
            selected_days: DaySet::every_day(),
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_reminders_drop_times() {
        let draft = ScheduleDraft {
            name: "Омега-3".to_string(),
            dosage: "1000 мг".to_string(),
            reminder_times: vec![ReminderTime::parse("08:00").unwrap()],
            reminder_enabled: false,
            ..Default::default()
        };
        let today = NaiveDate::from_ymd_opt(2025, 7, 6).unwrap();
        let schedule = draft.into_schedule(Uuid::new_v4(), today);
        assert!(!schedule.reminder_enabled);
        assert!(schedule.reminder_times.is_empty());
        assert_eq!(schedule.start_date, today);
        assert_eq!(schedule.time_of_day, TimeOfDay::Any);
    }

    #[test]
    fn test_summary_treats_empty_days_as_every_day() {
        let draft = ScheduleDraft {
            name: "Цинк".to_string(),
            ..Default::default()
        };
        let summary = draft.summary();
        assert!(summary.contains("Дни недели: каждый день"));
        assert!(summary.contains("бессрочно"));
        assert!(summary.contains("Напоминания отключены"));
    }
}
