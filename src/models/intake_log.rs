use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::encoding::Slot;

/// Completion record for one (schedule, date, slot). At most one row per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub schedule_id: Uuid,
    pub intake_date: NaiveDate,
    pub slot: Slot,
    pub taken: bool,
    pub created_at: DateTime<Utc>,
}

impl IntakeLog {
    pub fn new(user_id: Uuid, schedule_id: Uuid, intake_date: NaiveDate, slot: Slot, taken: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            schedule_id,
            intake_date,
            slot,
            taken,
            created_at: Utc::now(),
        }
    }
}
