use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::{optional_datetime, Id};

/// One voter's participation in one election. Unique per (voter, election).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceCore {
    pub voter_id: Id,
    pub election_id: Id,
    pub flat_number: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub voted: bool,
    #[serde(default, with = "optional_datetime")]
    pub vote_time: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_datetime")]
    pub login_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Once set, the voter can never vote again in this election.
    #[serde(default)]
    pub rejected: bool,
    #[serde(default, with = "optional_datetime")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AttendanceCore {
    /// A fresh record for a voter who has neither logged in nor voted.
    pub fn new(voter_id: Id, election_id: Id, flat_number: impl Into<String>) -> Self {
        Self {
            voter_id,
            election_id,
            flat_number: flat_number.into(),
            name: None,
            voted: false,
            vote_time: None,
            login_time: None,
            ip_address: None,
            user_agent: None,
            rejected: false,
            rejected_at: None,
            updated_at: None,
        }
    }
}

/// An attendance record from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub attendance: AttendanceCore,
}

impl Deref for Attendance {
    type Target = AttendanceCore;

    fn deref(&self) -> &Self::Target {
        &self.attendance
    }
}
