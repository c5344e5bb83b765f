use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    common::{ElectionPhase, ElectionStatus},
    db::{election::Election, schedule::Schedule},
};

/// Parse a date sent by the admin UI: RFC 3339, or a `datetime-local`
/// value (`2024-05-01T09:30`) taken as UTC.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
                .into_iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

/// Manual open/close and auto mode toggle. At least one field must be set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    #[serde(default)]
    pub is_open: Option<bool>,
    #[serde(default)]
    pub auto_open_enabled: Option<bool>,
}

/// A new voting schedule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default = "default_auto_open")]
    pub auto_open_enabled: bool,
}

fn default_auto_open() -> bool {
    true
}

impl ScheduleRequest {
    /// The requested window. Both dates are required and the start must be
    /// strictly before the end.
    pub fn window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let (Some(start), Some(end)) = (self.start_date.as_deref(), self.end_date.as_deref()) else {
            return Err(Error::validation("startDate and endDate are required"));
        };
        let (Some(start), Some(end)) = (parse_date(start), parse_date(end)) else {
            return Err(Error::validation("Invalid startDate or endDate"));
        };
        if start >= end {
            return Err(Error::validation("startDate must be before endDate"));
        }
        Ok((start, end))
    }
}

/// Optional dates to keep on the election after a reset.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl ResetRequest {
    /// Each supplied date must parse; absent dates stay absent.
    pub fn dates(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let parse = |value: &Option<String>| match value.as_deref() {
            None | Some("") => Ok(None),
            Some(value) => parse_date(value)
                .map(Some)
                .ok_or_else(|| Error::validation("Invalid startDate or endDate")),
        };
        Ok((parse(&self.start_date)?, parse(&self.end_date)?))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionView {
    pub id: ApiId,
    pub name: String,
    pub is_open: bool,
    pub auto_open_enabled: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<Election> for ElectionView {
    fn from(election: Election) -> Self {
        Self {
            id: election.id.into(),
            name: election.election.name,
            is_open: election.election.is_open,
            auto_open_enabled: election.election.auto_open_enabled,
            start_date: election.election.start_date,
            end_date: election.election.end_date,
            updated_at: election.election.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    pub election_id: ApiId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub auto_open_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<Schedule> for ScheduleView {
    fn from(schedule: Schedule) -> Self {
        Self {
            election_id: schedule.election_id.into(),
            start_date: schedule.start_date,
            end_date: schedule.end_date,
            auto_open_enabled: schedule.auto_open_enabled,
            updated_at: schedule.updated_at,
        }
    }
}

/// The admin's view of an election: the reconciled record, its schedule, and
/// the derived lifecycle phase.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionStatusView {
    pub success: bool,
    pub election: ElectionView,
    pub schedule: Option<ScheduleView>,
    pub phase: ElectionPhase,
    pub election_status: ElectionStatus,
}

/// The public schedule status shown on the results page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicScheduleStatus {
    pub success: bool,
    pub status: &'static str,
    pub is_open: bool,
    pub auto_open_enabled: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub election_status: ElectionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rfc3339_and_local() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        assert_eq!(parse_date("2024-05-01T09:30:00Z"), Some(expected));
        assert_eq!(parse_date("2024-05-01T15:00:00+05:30"), Some(expected));
        assert_eq!(parse_date("2024-05-01T09:30"), Some(expected));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn schedule_must_be_ordered() {
        let request = |start: &str, end: &str| ScheduleRequest {
            start_date: Some(start.to_string()),
            end_date: Some(end.to_string()),
            auto_open_enabled: true,
        };
        assert!(request("2024-05-01T09:00", "2024-05-01T10:00").window().is_ok());
        assert!(request("2024-05-01T10:00", "2024-05-01T10:00").window().is_err());
        assert!(request("2024-05-01T11:00", "2024-05-01T10:00").window().is_err());
        assert!(request("soon", "2024-05-01T10:00").window().is_err());
    }

    #[test]
    fn schedule_defaults_to_auto() {
        let request: ScheduleRequest = rocket::serde::json::from_str(
            r#"{"startDate": "2024-05-01T09:00", "endDate": "2024-05-01T10:00"}"#,
        )
        .unwrap();
        assert!(request.auto_open_enabled);
    }

    #[test]
    fn reset_dates_are_optional() {
        assert_eq!(ResetRequest::default().dates().unwrap(), (None, None));
        let bad = ResetRequest {
            start_date: Some("nope".to_string()),
            end_date: None,
        };
        assert!(bad.dates().is_err());
    }
}
