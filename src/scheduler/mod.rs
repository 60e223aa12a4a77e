//! Reminder delivery: which schedule slots are due on a tick, and how a
//! "taken" acknowledgement is recorded.

pub mod timer;

pub use timer::{spawn_reminder_loop, spawn_weekly_report_loop};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::database::Storage;
use crate::encoding::{ReminderTime, Slot};
use crate::error::{BotError, BotResult};
use crate::models::{IntakeLog, Schedule, User};

/// Identifies the slot a "taken" button acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckAction {
    pub schedule_id: Uuid,
    pub date: NaiveDate,
    pub slot: Slot,
}

impl AckAction {
    /// `<schedule uuid>|<YYYY-MM-DD>|<slot>`. Fits in Telegram's 64-byte
    /// callback data together with a short prefix.
    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}",
            self.schedule_id,
            self.date.format("%Y-%m-%d"),
            self.slot.as_storage()
        )
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, '|');
        let schedule_id = Uuid::parse_str(parts.next()?).ok()?;
        let date = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;
        let slot = Slot::from_storage(parts.next()?).ok()?;
        Some(Self {
            schedule_id,
            date,
            slot,
        })
    }
}

/// A reminder ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub telegram_id: i64,
    pub schedule_name: String,
    pub text: String,
    pub ack: AckAction,
}

impl Delivery {
    fn new(user: &User, schedule: &Schedule, date: NaiveDate, time: ReminderTime) -> Self {
        Self {
            telegram_id: user.telegram_id,
            schedule_name: schedule.name.clone(),
            text: format!(
                "⏰ Напоминание! Не забудь принять: {} ({})\nВы просили напомнить в {}",
                schedule.name, schedule.dosage, time
            ),
            ack: AckAction {
                schedule_id: schedule.id,
                date,
                slot: Slot::At(time),
            },
        }
    }
}

/// Outbound side of the scheduler, implemented by the chat transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_reminder(&self, delivery: &Delivery) -> BotResult<()>;

    async fn send_report(&self, telegram_id: i64, text: &str) -> BotResult<()>;
}

pub struct ReminderScheduler {
    storage: Arc<dyn Storage>,
}

impl ReminderScheduler {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Computes every reminder due at `now`.
    ///
    /// A slot is due when its time equals `now` to the minute, or is earlier
    /// today and still has no "taken" record (catch-up). Schedules whose
    /// lookups fail are skipped for this tick; the rest still go out.
    pub async fn tick(&self, now: NaiveDateTime) -> Vec<Delivery> {
        let schedules = match self.storage.find_all_active_schedules().await {
            Ok(schedules) => schedules,
            Err(e) => {
                log::error!("❌ Error loading active schedules: {}", e);
                return Vec::new();
            }
        };

        let today = now.date();
        let mut users: HashMap<Uuid, Option<User>> = HashMap::new();
        let mut deliveries = Vec::new();

        for schedule in schedules.iter().filter(|s| s.is_active_on(today)) {
            match self.due_for(schedule, today, now.time(), &mut users).await {
                Ok(mut due) => deliveries.append(&mut due),
                Err(e) => log::warn!("⚠️ Skipping schedule {} this tick: {}", schedule.id, e),
            }
        }

        if !deliveries.is_empty() {
            log::info!("⏰ {} reminder(s) due at {}", deliveries.len(), now.format("%Y-%m-%d %H:%M"));
        }
        deliveries
    }

    async fn due_for(
        &self,
        schedule: &Schedule,
        today: NaiveDate,
        now: NaiveTime,
        users: &mut HashMap<Uuid, Option<User>>,
    ) -> BotResult<Vec<Delivery>> {
        let due: Vec<ReminderTime> = schedule
            .reminder_times
            .iter()
            .copied()
            .filter(|t| t.matches(now) || t.is_before(now))
            .collect();
        if due.is_empty() {
            return Ok(Vec::new());
        }

        if !users.contains_key(&schedule.user_id) {
            let user = self.storage.find_user(schedule.user_id).await?;
            users.insert(schedule.user_id, user);
        }
        let Some(user) = users.get(&schedule.user_id).cloned().flatten() else {
            log::debug!("Schedule {} has no owner, skipping", schedule.id);
            return Ok(Vec::new());
        };

        let mut deliveries = Vec::new();
        for time in due {
            let log = self
                .storage
                .find_intake_log(user.id, schedule.id, today, Slot::At(time))
                .await?;
            if log.map_or(false, |l| l.taken) {
                continue;
            }
            deliveries.push(Delivery::new(&user, schedule, today, time));
        }
        Ok(deliveries)
    }

    /// Records the slot as taken for the Telegram user. Repeated presses keep
    /// a single record.
    pub async fn acknowledge(&self, telegram_id: i64, ack: &AckAction) -> BotResult<IntakeLog> {
        let user = self
            .storage
            .find_user_by_telegram_id(telegram_id)
            .await?
            .ok_or(BotError::UserNotFound)?;

        let schedule = self
            .storage
            .find_schedule(ack.schedule_id)
            .await?
            .filter(|s| s.user_id == user.id)
            .ok_or(BotError::ScheduleNotFound)?;

        let log = self
            .storage
            .upsert_intake_log(IntakeLog::new(user.id, schedule.id, ack.date, ack.slot, true))
            .await?;
        log::info!(
            "✅ Intake of '{}' acknowledged by {} for {} {}",
            schedule.name,
            telegram_id,
            ack.date,
            ack.slot
        );
        Ok(log)
    }

    /// Delivers every due reminder; a failed send does not stop the rest.
    pub async fn run_tick(&self, now: NaiveDateTime, notifier: &dyn Notifier) -> usize {
        let mut sent = 0;
        for delivery in self.tick(now).await {
            match notifier.send_reminder(&delivery).await {
                Ok(()) => sent += 1,
                Err(e) => log::error!(
                    "❌ Error sending reminder for '{}' to {}: {}",
                    delivery.schedule_name,
                    delivery.telegram_id,
                    e
                ),
            }
        }
        sent
    }
}
