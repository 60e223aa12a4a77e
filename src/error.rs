use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("User not found")]
    UserNotFound,

    #[error("Schedule not found")]
    ScheduleNotFound,
}

pub type BotResult<T> = Result<T, BotError>;
