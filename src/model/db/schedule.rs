use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::ScheduleWindow, mongodb::Id};

/// The authoritative voting schedule of an election, one per election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub election_id: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_date: DateTime<Utc>,
    pub auto_open_enabled: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(
        election_id: Id,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        auto_open_enabled: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            election_id,
            start_date,
            end_date,
            auto_open_enabled,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn window(&self) -> Option<ScheduleWindow> {
        ScheduleWindow::new(Some(self.start_date), Some(self.end_date))
    }
}
