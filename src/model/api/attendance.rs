use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{api::id::ApiId, db::attendance::Attendance};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceView {
    pub id: ApiId,
    pub voter_id: ApiId,
    pub flat_number: String,
    pub name: Option<String>,
    pub voted: bool,
    pub vote_time: Option<DateTime<Utc>>,
    pub login_time: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub rejected: bool,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl From<Attendance> for AttendanceView {
    fn from(record: Attendance) -> Self {
        let a = record.attendance;
        Self {
            id: record.id.into(),
            voter_id: a.voter_id.into(),
            flat_number: a.flat_number,
            name: a.name,
            voted: a.voted,
            vote_time: a.vote_time,
            login_time: a.login_time,
            ip_address: a.ip_address,
            user_agent: a.user_agent,
            rejected: a.rejected,
            rejected_at: a.rejected_at,
        }
    }
}

/// The parts of an attendance record a voter sees about themselves.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub voted: bool,
    pub vote_time: Option<DateTime<Utc>>,
    pub login_time: Option<DateTime<Utc>>,
    pub rejected: bool,
}

impl From<&Attendance> for AttendanceSummary {
    fn from(record: &Attendance) -> Self {
        Self {
            voted: record.voted,
            vote_time: record.vote_time,
            login_time: record.login_time,
            rejected: record.rejected,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceCounts {
    pub total: usize,
    pub voted: usize,
    pub not_voted: usize,
    pub rejected: usize,
}

impl AttendanceCounts {
    pub fn tally(records: &[Attendance]) -> Self {
        let voted = records.iter().filter(|a| a.voted).count();
        Self {
            total: records.len(),
            voted,
            not_voted: records.len() - voted,
            rejected: records.iter().filter(|a| a.rejected).count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReport {
    pub success: bool,
    pub summary: AttendanceCounts,
    pub attendance: Vec<AttendanceView>,
}

impl From<Vec<Attendance>> for AttendanceReport {
    fn from(records: Vec<Attendance>) -> Self {
        Self {
            success: true,
            summary: AttendanceCounts::tally(&records),
            attendance: records.into_iter().map(AttendanceView::from).collect(),
        }
    }
}
