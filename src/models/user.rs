use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub telegram_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(telegram_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            telegram_id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
