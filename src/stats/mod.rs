//! Adherence statistics over a seven-day window.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use uuid::Uuid;

use crate::database::Storage;
use crate::encoding::Slot;
use crate::error::BotResult;
use crate::models::{IntakeLog, Schedule, User};
use crate::scheduler::Notifier;

const WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// The seven days ending today.
    Rolling,
    /// Monday to Sunday of the week before today's.
    PreviousWeek,
}

impl Window {
    pub fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Window::Rolling => (today - Duration::days(WINDOW_DAYS - 1), today),
            Window::PreviousWeek => {
                let this_monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
                let start = this_monday - Duration::days(WINDOW_DAYS);
                (start, this_monday - Duration::days(1))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayStatus {
    /// Every expected slot taken.
    Full,
    Partial,
    /// Slots were expected and none was taken.
    Missed,
    /// Nothing was scheduled.
    Empty,
}

impl DayStatus {
    fn classify(expected: usize, taken: usize) -> Self {
        if expected == 0 {
            DayStatus::Empty
        } else if taken >= expected {
            DayStatus::Full
        } else if taken > 0 {
            DayStatus::Partial
        } else {
            DayStatus::Missed
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            DayStatus::Full => "🟩",
            DayStatus::Partial => "🟨",
            DayStatus::Missed => "🟥",
            DayStatus::Empty => "⬜",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub expected: usize,
    pub taken: usize,
    pub status: DayStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekReport {
    pub window: Window,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<DaySummary>,
}

impl WeekReport {
    pub fn completed_days(&self) -> usize {
        self.days.iter().filter(|d| d.status == DayStatus::Full).count()
    }

    /// Share of window days fully completed, rounded down.
    pub fn percent(&self) -> u32 {
        if self.days.is_empty() {
            return 0;
        }
        (self.completed_days() * 100 / self.days.len()) as u32
    }

    pub fn has_eligible_slots(&self) -> bool {
        self.days.iter().any(|d| d.expected > 0)
    }

    pub fn render(&self) -> String {
        let title = match self.window {
            Window::Rolling => "📈 Статистика за последние 7 дней",
            Window::PreviousWeek => "📈 Твоя статистика за прошлую неделю",
        };
        let mut out = format!(
            "{} ({} – {}):\n\n",
            title,
            self.start.format("%d.%m"),
            self.end.format("%d.%m")
        );
        for day in &self.days {
            out.push_str(&format!(
                "{} {} {}/{}\n",
                day.status.emoji(),
                day.date.format("%d.%m"),
                day.taken,
                day.expected
            ));
        }
        out.push_str(&format!(
            "\nПолностью выполнено дней: {} из {} ({}%)",
            self.completed_days(),
            self.days.len(),
            self.percent()
        ));
        out
    }
}

/// One expected slot on one date and whether it was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub schedule_id: Uuid,
    pub schedule_name: String,
    pub dosage: String,
    pub slot: Slot,
    pub taken: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayLog {
    pub date: NaiveDate,
    pub slots: Vec<SlotStatus>,
}

impl DayLog {
    pub fn taken(&self) -> usize {
        self.slots.iter().filter(|s| s.taken).count()
    }

    pub fn status(&self) -> DayStatus {
        DayStatus::classify(self.slots.len(), self.taken())
    }

    pub fn render(&self) -> String {
        if self.slots.is_empty() {
            return "📈 На сегодня приёмов не запланировано.".to_string();
        }
        let expected = self.slots.len();
        let taken = self.taken();
        let mut out = format!("📈 Статус на {}:\n\n", self.date.format("%d.%m.%Y"));
        for slot in &self.slots {
            let mark = if slot.taken { "✅" } else { "⬜" };
            out.push_str(&format!("{} {} · {}\n", mark, slot.schedule_name, slot.slot));
        }
        out.push_str(&format!(
            "\n{} Принято: {} из {} ({}%)",
            self.status().emoji(),
            taken,
            expected,
            taken * 100 / expected
        ));
        out
    }
}

/// Expected slots of `schedules` on `date`, each marked by the logs.
fn slots_on(schedules: &[Schedule], taken: &HashSet<(Uuid, NaiveDate, Slot)>, date: NaiveDate) -> Vec<SlotStatus> {
    schedules
        .iter()
        .filter(|s| s.is_active_on(date))
        .flat_map(|schedule| {
            schedule.slots().into_iter().map(move |slot| SlotStatus {
                schedule_id: schedule.id,
                schedule_name: schedule.name.clone(),
                dosage: schedule.dosage.clone(),
                slot,
                taken: taken.contains(&(schedule.id, date, slot)),
            })
        })
        .collect()
}

fn taken_keys(logs: &[IntakeLog]) -> HashSet<(Uuid, NaiveDate, Slot)> {
    logs.iter()
        .filter(|log| log.taken)
        .map(|log| (log.schedule_id, log.intake_date, log.slot))
        .collect()
}

/// Builds the per-day summaries of a window from already-loaded rows.
pub fn summarize(schedules: &[Schedule], logs: &[IntakeLog], start: NaiveDate, end: NaiveDate) -> Vec<DaySummary> {
    let taken = taken_keys(logs);
    start
        .iter_days()
        .take_while(|date| *date <= end)
        .map(|date| {
            let slots = slots_on(schedules, &taken, date);
            let expected = slots.len();
            let done = slots.iter().filter(|s| s.taken).count();
            DaySummary {
                date,
                expected,
                taken: done,
                status: DayStatus::classify(expected, done),
            }
        })
        .collect()
}

pub struct ProgressAggregator {
    storage: Arc<dyn Storage>,
}

impl ProgressAggregator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn report(&self, user: &User, window: Window, today: NaiveDate) -> BotResult<WeekReport> {
        let (start, end) = window.range(today);
        let schedules = self.storage.find_schedules_by_user(user.id).await?;
        let logs = self.storage.find_intake_logs(user.id, start, end).await?;

        Ok(WeekReport {
            window,
            start,
            end,
            days: summarize(&schedules, &logs, start, end),
        })
    }

    /// Today's expected slots with their taken marks.
    pub async fn day_log(&self, user: &User, date: NaiveDate) -> BotResult<DayLog> {
        let schedules = self.storage.find_schedules_by_user(user.id).await?;
        let logs = self.storage.find_intake_logs(user.id, date, date).await?;
        Ok(DayLog {
            date,
            slots: slots_on(&schedules, &taken_keys(&logs), date),
        })
    }

    /// Previous-week reports for every user with something scheduled in
    /// that week. A user whose data fails to load is skipped.
    pub async fn weekly_digest(&self, today: NaiveDate) -> BotResult<Vec<(User, String)>> {
        let users = self.storage.find_all_users().await?;
        let mut digest = Vec::new();

        for user in users {
            match self.report(&user, Window::PreviousWeek, today).await {
                Ok(report) if report.has_eligible_slots() => digest.push((user, report.render())),
                Ok(_) => log::debug!("No eligible slots last week for user {}", user.telegram_id),
                Err(e) => log::warn!("⚠️ Skipping weekly report for user {}: {}", user.telegram_id, e),
            }
        }
        Ok(digest)
    }

    pub async fn send_weekly_reports(&self, today: NaiveDate, notifier: &dyn Notifier) -> usize {
        let digest = match self.weekly_digest(today).await {
            Ok(digest) => digest,
            Err(e) => {
                log::error!("❌ Error building weekly reports: {}", e);
                return 0;
            }
        };

        let mut sent = 0;
        for (user, text) in digest {
            match notifier.send_report(user.telegram_id, &text).await {
                Ok(()) => sent += 1,
                Err(e) => log::error!("❌ Error sending weekly report to {}: {}", user.telegram_id, e),
            }
        }
        log::info!("📈 Weekly reports sent: {}", sent);
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStorage;
    use crate::encoding::{DaySet, ReminderTime};
    use crate::models::schedule::fixtures;
    use crate::scheduler::testing::RecordingNotifier;

    fn day(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    fn at(time: &str) -> Slot {
        Slot::At(ReminderTime::parse(time).unwrap())
    }

    async fn user_with(storage: &MemoryStorage, telegram_id: i64) -> User {
        storage.create_user(User::new(telegram_id, "Тест")).await.unwrap()
    }

    async fn take(storage: &MemoryStorage, user: &User, schedule: &Schedule, date: NaiveDate, slot: Slot) {
        storage
            .upsert_intake_log(IntakeLog::new(user.id, schedule.id, date, slot, true))
            .await
            .unwrap();
    }

    #[test]
    fn test_window_ranges() {
        let wednesday = day("2025-07-16");
        assert_eq!(Window::Rolling.range(wednesday), (day("2025-07-10"), wednesday));
        assert_eq!(
            Window::PreviousWeek.range(wednesday),
            (day("2025-07-07"), day("2025-07-13"))
        );
        let monday = day("2025-07-14");
        assert_eq!(
            Window::PreviousWeek.range(monday),
            (day("2025-07-07"), day("2025-07-13"))
        );
    }

    #[tokio::test]
    async fn test_fully_acknowledged_week_is_complete() {
        let storage = Arc::new(MemoryStorage::new());
        let user = user_with(&storage, 1).await;
        let schedule = storage
            .create_schedule(fixtures::schedule(user.id, "D3", day("2025-07-01"), &["08:00", "20:00"]))
            .await
            .unwrap();
        for date in day("2025-07-07").iter_days().take(7) {
            take(&storage, &user, &schedule, date, at("08:00")).await;
            take(&storage, &user, &schedule, date, at("20:00")).await;
        }

        let aggregator = ProgressAggregator::new(storage.clone());
        let report = aggregator
            .report(&user, Window::PreviousWeek, day("2025-07-14"))
            .await
            .unwrap();

        assert_eq!(report.completed_days(), 7);
        assert_eq!(report.percent(), 100);
        assert!(report.days.iter().all(|d| d.status == DayStatus::Full && d.expected == 2));
        assert!(report.render().contains("7 из 7 (100%)"));
    }

    #[tokio::test]
    async fn test_partial_missed_and_empty_days() {
        let storage = Arc::new(MemoryStorage::new());
        let user = user_with(&storage, 1).await;
        let mut weekdays = fixtures::schedule(user.id, "Магний", day("2025-07-07"), &["08:00", "20:00"]);
        weekdays.days = DaySet::from_indices([0, 1, 2, 3, 4]).unwrap();
        let schedule = storage.create_schedule(weekdays).await.unwrap();

        take(&storage, &user, &schedule, day("2025-07-07"), at("08:00")).await;
        take(&storage, &user, &schedule, day("2025-07-07"), at("20:00")).await;
        take(&storage, &user, &schedule, day("2025-07-08"), at("08:00")).await;
        // A log outside the window does not count.
        take(&storage, &user, &schedule, day("2025-07-14"), at("08:00")).await;

        let aggregator = ProgressAggregator::new(storage.clone());
        let report = aggregator
            .report(&user, Window::PreviousWeek, day("2025-07-14"))
            .await
            .unwrap();

        let statuses: Vec<DayStatus> = report.days.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![
                DayStatus::Full,
                DayStatus::Partial,
                DayStatus::Missed,
                DayStatus::Missed,
                DayStatus::Missed,
                DayStatus::Empty,
                DayStatus::Empty,
            ]
        );
        assert_eq!(report.completed_days(), 1);
        assert_eq!(report.percent(), 14);
    }

    #[tokio::test]
    async fn test_reminderless_schedule_counts_whole_day_slot() {
        let storage = Arc::new(MemoryStorage::new());
        let user = user_with(&storage, 1).await;
        let schedule = storage
            .create_schedule(fixtures::schedule(user.id, "Цинк", day("2025-07-10"), &[]))
            .await
            .unwrap();
        take(&storage, &user, &schedule, day("2025-07-16"), Slot::WholeDay).await;

        let aggregator = ProgressAggregator::new(storage.clone());
        let today = aggregator.day_log(&user, day("2025-07-16")).await.unwrap();
        assert_eq!(today.slots.len(), 1);
        assert_eq!(today.status(), DayStatus::Full);
        let rendered = today.render();
        assert!(rendered.contains("✅ Цинк · весь день"));
        assert!(rendered.contains("Принято: 1 из 1 (100%)"));

        let report = aggregator.report(&user, Window::Rolling, day("2025-07-16")).await.unwrap();
        assert_eq!(report.completed_days(), 1);
        assert_eq!(report.days.iter().filter(|d| d.status == DayStatus::Missed).count(), 6);
    }

    #[tokio::test]
    async fn test_weekly_digest_skips_users_without_slots() {
        let storage = Arc::new(MemoryStorage::new());
        let active = user_with(&storage, 1).await;
        let idle = user_with(&storage, 2).await;
        let late = user_with(&storage, 3).await;
        storage
            .create_schedule(fixtures::schedule(active.id, "D3", day("2025-07-01"), &["08:00"]))
            .await
            .unwrap();
        // Starts after the reported week.
        storage
            .create_schedule(fixtures::schedule(late.id, "D3", day("2025-07-14"), &["08:00"]))
            .await
            .unwrap();

        let aggregator = ProgressAggregator::new(storage.clone());
        let notifier = RecordingNotifier::default();
        let sent = aggregator.send_weekly_reports(day("2025-07-14"), &notifier).await;

        assert_eq!(sent, 1);
        let reports = notifier.reports.lock().await;
        assert_eq!(reports[0].0, active.telegram_id);
        assert!(reports[0].1.contains("0 из 7 (0%)"));
        assert!(!reports.iter().any(|(id, _)| *id == idle.telegram_id));
    }

    #[tokio::test]
    async fn test_day_log_render_without_schedules() {
        let storage = Arc::new(MemoryStorage::new());
        let user = user_with(&storage, 1).await;
        let aggregator = ProgressAggregator::new(storage.clone());
        let log = aggregator.day_log(&user, day("2025-07-16")).await.unwrap();
        assert_eq!(log.status(), DayStatus::Empty);
        assert!(log.render().contains("не запланировано"));
    }
}
