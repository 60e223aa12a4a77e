pub mod storage;

#[cfg(test)]
pub mod memory;

pub use storage::Storage;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::time::Duration;
use uuid::Uuid;

use crate::encoding::{DaySet, ReminderTime, Slot};
use crate::error::BotResult;
use crate::models::{IntakeLog, Schedule, TimeOfDay, User};

const SCHEDULE_COLUMNS: &str = "id, user_id, name, dosage, intake_time, with_food, days_of_week, \
    start_date, end_date, reminder_times, reminder_enabled, created_at";

const LOG_COLUMNS: &str = "id, user_id, supplement_id, intake_date, intake_time, taken, created_at";

#[derive(Clone, Debug)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> BotResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        Ok(Database { pool })
    }

    pub async fn init(&self) -> BotResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                telegram_id BIGINT NOT NULL UNIQUE,
                name TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Дни недели и время напоминаний хранятся как JSON-массивы
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS supplements (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                dosage TEXT NOT NULL DEFAULT '',
                intake_time TEXT NOT NULL DEFAULT 'any',
                with_food BOOLEAN NOT NULL DEFAULT false,
                days_of_week JSONB NOT NULL DEFAULT '[]',
                start_date DATE NOT NULL,
                end_date DATE,
                reminder_times JSONB NOT NULL DEFAULT '[]',
                reminder_enabled BOOLEAN NOT NULL DEFAULT true,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS intake_logs (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
                supplement_id UUID NOT NULL REFERENCES supplements (id) ON DELETE CASCADE,
                intake_date DATE NOT NULL,
                intake_time TEXT NOT NULL,
                taken BOOLEAN NOT NULL DEFAULT false,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                UNIQUE (supplement_id, intake_date, intake_time)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_supplements_user_id ON supplements (user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_supplements_reminder_enabled ON supplements (reminder_enabled)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_intake_logs_user_date ON intake_logs (user_id, intake_date)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn user_from_row(row: &PgRow) -> BotResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        telegram_id: row.try_get("telegram_id")?,
        name: row.try_get("name")?,
        created_at: row
            .try_get::<Option<DateTime<Utc>>, _>("created_at")?
            .unwrap_or_else(Utc::now),
    })
}

fn schedule_from_row(row: &PgRow) -> BotResult<Schedule> {
    let raw_time: String = row.try_get("intake_time")?;
    let time_of_day = TimeOfDay::parse(&raw_time).unwrap_or_else(|| {
        log::warn!("⚠️ Unknown intake_time '{}', falling back to 'any'", raw_time);
        TimeOfDay::Any
    });

    let days: Json<DaySet> = row.try_get("days_of_week")?;
    let reminder_times: Json<Vec<ReminderTime>> = row.try_get("reminder_times")?;

    Ok(Schedule {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        dosage: row.try_get("dosage")?,
        time_of_day,
        with_food: row.try_get("with_food")?,
        days: days.0,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        reminder_times: reminder_times.0,
        reminder_enabled: row.try_get("reminder_enabled")?,
        created_at: row
            .try_get::<Option<DateTime<Utc>>, _>("created_at")?
            .unwrap_or_else(Utc::now),
    })
}

fn log_from_row(row: &PgRow) -> BotResult<IntakeLog> {
    let raw_slot: String = row.try_get("intake_time")?;
    let slot = Slot::from_storage(&raw_slot).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(IntakeLog {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        schedule_id: row.try_get("supplement_id")?,
        intake_date: row.try_get("intake_date")?,
        slot,
        taken: row.try_get("taken")?,
        created_at: row
            .try_get::<Option<DateTime<Utc>>, _>("created_at")?
            .unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl Storage for Database {
    async fn find_user_by_telegram_id(&self, telegram_id: i64) -> BotResult<Option<User>> {
        let row = sqlx::query("SELECT id, telegram_id, name, created_at FROM users WHERE telegram_id = $1")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user(&self, id: Uuid) -> BotResult<Option<User>> {
        let row = sqlx::query("SELECT id, telegram_id, name, created_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_user(&self, user: User) -> BotResult<User> {
        // При гонке двух /start возвращается уже существующая строка
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, telegram_id, name, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (telegram_id)
            DO UPDATE SET updated_at = NOW()
            RETURNING id, telegram_id, name, created_at
            "#,
        )
        .bind(user.id)
        .bind(user.telegram_id)
        .bind(&user.name)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?;

        user_from_row(&row)
    }

    async fn update_user_name(&self, id: Uuid, name: &str) -> BotResult<()> {
        sqlx::query("UPDATE users SET name = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_all_users(&self) -> BotResult<Vec<User>> {
        let rows = sqlx::query("SELECT id, telegram_id, name, created_at FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn find_schedules_by_user(&self, user_id: Uuid) -> BotResult<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM supplements WHERE user_id = $1 ORDER BY created_at",
            SCHEDULE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(schedule_from_row).collect()
    }

    async fn create_schedule(&self, schedule: Schedule) -> BotResult<Schedule> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO supplements ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            SCHEDULE_COLUMNS, SCHEDULE_COLUMNS
        ))
        .bind(schedule.id)
        .bind(schedule.user_id)
        .bind(&schedule.name)
        .bind(&schedule.dosage)
        .bind(schedule.time_of_day.as_str())
        .bind(schedule.with_food)
        .bind(Json(&schedule.days))
        .bind(schedule.start_date)
        .bind(schedule.end_date)
        .bind(Json(&schedule.reminder_times))
        .bind(schedule.reminder_enabled)
        .bind(schedule.created_at)
        .fetch_one(&self.pool)
        .await?;

        schedule_from_row(&row)
    }

    async fn find_schedule(&self, id: Uuid) -> BotResult<Option<Schedule>> {
        let row = sqlx::query(&format!("SELECT {} FROM supplements WHERE id = $1", SCHEDULE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn delete_schedule(&self, user_id: Uuid, name: &str) -> BotResult<u64> {
        let result = sqlx::query("DELETE FROM supplements WHERE user_id = $1 AND name = $2")
            .bind(user_id)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_all_active_schedules(&self) -> BotResult<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM supplements WHERE reminder_enabled = true",
            SCHEDULE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(schedule_from_row).collect()
    }

    async fn find_intake_log(
        &self,
        user_id: Uuid,
        schedule_id: Uuid,
        date: NaiveDate,
        slot: Slot,
    ) -> BotResult<Option<IntakeLog>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM intake_logs \
             WHERE user_id = $1 AND supplement_id = $2 AND intake_date = $3 AND intake_time = $4",
            LOG_COLUMNS
        ))
        .bind(user_id)
        .bind(schedule_id)
        .bind(date)
        .bind(slot.as_storage())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(log_from_row).transpose()
    }

    async fn find_intake_logs(&self, user_id: Uuid, from: NaiveDate, to: NaiveDate) -> BotResult<Vec<IntakeLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM intake_logs WHERE user_id = $1 AND intake_date BETWEEN $2 AND $3",
            LOG_COLUMNS
        ))
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(log_from_row).collect()
    }

    async fn upsert_intake_log(&self, log: IntakeLog) -> BotResult<IntakeLog> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO intake_logs ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (supplement_id, intake_date, intake_time)
            DO UPDATE SET taken = intake_logs.taken OR EXCLUDED.taken
            RETURNING {}
            "#,
            LOG_COLUMNS, LOG_COLUMNS
        ))
        .bind(log.id)
        .bind(log.user_id)
        .bind(log.schedule_id)
        .bind(log.intake_date)
        .bind(log.slot.as_storage())
        .bind(log.taken)
        .bind(log.created_at)
        .fetch_one(&self.pool)
        .await?;

        log_from_row(&row)
    }
}
