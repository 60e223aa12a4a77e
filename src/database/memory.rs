use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::Storage;
use crate::encoding::Slot;
use crate::error::{BotError, BotResult};
use crate::models::{IntakeLog, Schedule, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LogKey {
    schedule_id: Uuid,
    intake_date: NaiveDate,
    slot: Slot,
}

impl LogKey {
    fn of(log: &IntakeLog) -> Self {
        LogKey {
            schedule_id: log.schedule_id,
            intake_date: log.intake_date,
            slot: log.slot,
        }
    }
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    schedules: Vec<Schedule>,
    logs: HashMap<LogKey, IntakeLog>,
}

/// In-process storage for tests. One mutex over all tables serializes upserts.
#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
    fail_log_lookups_for: Mutex<Option<Uuid>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn log_count(&self) -> usize {
        self.tables.lock().await.logs.len()
    }

    pub async fn schedule_count(&self) -> usize {
        self.tables.lock().await.schedules.len()
    }

    /// Makes `find_intake_log` fail for one schedule.
    pub async fn fail_log_lookups_for(&self, schedule_id: Uuid) {
        *self.fail_log_lookups_for.lock().await = Some(schedule_id);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn find_user_by_telegram_id(&self, telegram_id: i64) -> BotResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.telegram_id == telegram_id).cloned())
    }

    async fn find_user(&self, id: Uuid) -> BotResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, user: User) -> BotResult<User> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.users.iter().find(|u| u.telegram_id == user.telegram_id) {
            return Ok(existing.clone());
        }
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update_user_name(&self, id: Uuid, name: &str) -> BotResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == id) {
            user.name = name.to_string();
        }
        Ok(())
    }

    async fn find_all_users(&self) -> BotResult<Vec<User>> {
        Ok(self.tables.lock().await.users.clone())
    }

    async fn find_schedules_by_user(&self, user_id: Uuid) -> BotResult<Vec<Schedule>> {
        let tables = self.tables.lock().await;
        Ok(tables.schedules.iter().filter(|s| s.user_id == user_id).cloned().collect())
    }

    async fn create_schedule(&self, schedule: Schedule) -> BotResult<Schedule> {
        let mut tables = self.tables.lock().await;
        if !tables.users.iter().any(|u| u.id == schedule.user_id) {
            return Err(BotError::UserNotFound);
        }
        tables.schedules.push(schedule.clone());
        Ok(schedule)
    }

    async fn find_schedule(&self, id: Uuid) -> BotResult<Option<Schedule>> {
        let tables = self.tables.lock().await;
        Ok(tables.schedules.iter().find(|s| s.id == id).cloned())
    }

    async fn delete_schedule(&self, user_id: Uuid, name: &str) -> BotResult<u64> {
        let mut tables = self.tables.lock().await;
        let removed: Vec<Uuid> = tables
            .schedules
            .iter()
            .filter(|s| s.user_id == user_id && s.name == name)
            .map(|s| s.id)
            .collect();
        tables.schedules.retain(|s| !removed.contains(&s.id));
        tables.logs.retain(|key, _| !removed.contains(&key.schedule_id));
        Ok(removed.len() as u64)
    }

    async fn find_all_active_schedules(&self) -> BotResult<Vec<Schedule>> {
        let tables = self.tables.lock().await;
        Ok(tables.schedules.iter().filter(|s| s.reminder_enabled).cloned().collect())
    }

    async fn find_intake_log(
        &self,
        user_id: Uuid,
        schedule_id: Uuid,
        date: NaiveDate,
        slot: Slot,
    ) -> BotResult<Option<IntakeLog>> {
        if *self.fail_log_lookups_for.lock().await == Some(schedule_id) {
            return Err(BotError::ScheduleNotFound);
        }
        let tables = self.tables.lock().await;
        let key = LogKey {
            schedule_id,
            intake_date: date,
            slot,
        };
        Ok(tables.logs.get(&key).filter(|log| log.user_id == user_id).cloned())
    }

    async fn find_intake_logs(&self, user_id: Uuid, from: NaiveDate, to: NaiveDate) -> BotResult<Vec<IntakeLog>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .logs
            .values()
            .filter(|log| log.user_id == user_id && log.intake_date >= from && log.intake_date <= to)
            .cloned()
            .collect())
    }

    async fn upsert_intake_log(&self, log: IntakeLog) -> BotResult<IntakeLog> {
        let mut tables = self.tables.lock().await;
        let entry = tables.logs.entry(LogKey::of(&log)).or_insert_with(|| log.clone());
        entry.taken = entry.taken || log.taken;
        Ok(entry.clone())
    }
}
