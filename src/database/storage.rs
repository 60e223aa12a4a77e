use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::encoding::Slot;
use crate::error::BotResult;
use crate::models::{IntakeLog, Schedule, User};

/// Key-based persistence used by the form, the scheduler and the aggregator.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn find_user_by_telegram_id(&self, telegram_id: i64) -> BotResult<Option<User>>;

    async fn find_user(&self, id: Uuid) -> BotResult<Option<User>>;

    /// Inserts the user, or returns the existing row for the same Telegram ID.
    async fn create_user(&self, user: User) -> BotResult<User>;

    async fn update_user_name(&self, id: Uuid, name: &str) -> BotResult<()>;

    async fn find_all_users(&self) -> BotResult<Vec<User>>;

    async fn find_schedules_by_user(&self, user_id: Uuid) -> BotResult<Vec<Schedule>>;

    async fn create_schedule(&self, schedule: Schedule) -> BotResult<Schedule>;

    async fn find_schedule(&self, id: Uuid) -> BotResult<Option<Schedule>>;

    /// Deletes by owner and name, cascading to intake logs. Returns rows removed.
    async fn delete_schedule(&self, user_id: Uuid, name: &str) -> BotResult<u64>;

    /// Schedules with reminders enabled.
    async fn find_all_active_schedules(&self) -> BotResult<Vec<Schedule>>;

    async fn find_intake_log(
        &self,
        user_id: Uuid,
        schedule_id: Uuid,
        date: NaiveDate,
        slot: Slot,
    ) -> BotResult<Option<IntakeLog>>;

    /// Logs of one user with `from <= intake_date <= to`.
    async fn find_intake_logs(&self, user_id: Uuid, from: NaiveDate, to: NaiveDate) -> BotResult<Vec<IntakeLog>>;

    /// Creates the row for (schedule, date, slot) if absent. An existing row
    /// keeps `taken = true` once set.
    async fn upsert_intake_log(&self, log: IntakeLog) -> BotResult<IntakeLog>;
}
