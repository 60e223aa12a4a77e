use std::env;

use chrono::{NaiveTime, Weekday};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
}

impl DbConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.name, self.ssl_mode
        )
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub reminder_interval_minutes: u32,
    pub weekly_report_day: Weekday,
    pub weekly_report_time: NaiveTime,
    pub conversation_ttl_minutes: u64,
}

impl Config {
    /// Reads the process environment. `.env` is expected to be loaded already.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let telegram_token = required("TG_TOKEN")?;

        let database_url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => DbConfig {
                host: required("DB_HOST")?,
                port: required("DB_PORT")?,
                user: required("DB_USER")?,
                password: required("DB_PASSWORD")?,
                name: required("DB_NAME")?,
                ssl_mode: required("DB_SSLMODE")?,
            }
            .url(),
        };

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 20)?;

        let reminder_interval_minutes: u32 = parse_or(&lookup, "REMINDER_INTERVAL_MINUTES", 30)?;
        if reminder_interval_minutes == 0 || 1440 % reminder_interval_minutes != 0 {
            return Err(ConfigError::Invalid {
                key: "REMINDER_INTERVAL_MINUTES",
                value: reminder_interval_minutes.to_string(),
            });
        }

        let weekly_report_day = match lookup("WEEKLY_REPORT_DAY") {
            Some(value) => value.parse::<Weekday>().map_err(|_| ConfigError::Invalid {
                key: "WEEKLY_REPORT_DAY",
                value,
            })?,
            None => Weekday::Mon,
        };

        let weekly_report_time = match lookup("WEEKLY_REPORT_TIME") {
            Some(value) => NaiveTime::parse_from_str(&value, "%H:%M").map_err(|_| ConfigError::Invalid {
                key: "WEEKLY_REPORT_TIME",
                value,
            })?,
            None => NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN),
        };

        let conversation_ttl_minutes = parse_or(&lookup, "CONVERSATION_TTL_MINUTES", 1440)?;

        Ok(Config {
            telegram_token,
            database_url,
            db_max_connections,
            reminder_interval_minutes,
            weekly_report_day,
            weekly_report_time,
            conversation_ttl_minutes,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
