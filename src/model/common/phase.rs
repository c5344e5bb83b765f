use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{status::ElectionStatus, window::ScheduleWindow};

/// Where an election is in its lifecycle. This is the single place the
/// `isOpen` flag, the schedule and the results status are combined.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionPhase {
    /// Closed, with no dates set.
    NotScheduled,
    /// Closed, and the scheduled start is still ahead.
    Scheduled,
    /// Accepting votes.
    Open,
    /// Closed, with nothing final yet.
    Closed,
    /// Results published.
    Declared,
    /// Votes rejected and the election stopped.
    Cancelled,
}

impl ElectionPhase {
    /// Derive the phase from the effective open flag (already reconciled with
    /// the schedule), the known voting window, and the results status.
    pub fn derive(
        effective_open: bool,
        window: Option<ScheduleWindow>,
        has_dates: bool,
        status: ElectionStatus,
        now: DateTime<Utc>,
    ) -> Self {
        match status {
            ElectionStatus::Declared => return Self::Declared,
            ElectionStatus::Cancelled => return Self::Cancelled,
            ElectionStatus::Ongoing => {}
        }
        if effective_open {
            return Self::Open;
        }
        match window {
            Some(window) if !window.has_started(now) => Self::Scheduled,
            None if !has_dates => Self::NotScheduled,
            _ => Self::Closed,
        }
    }

    pub fn accepts_votes(self) -> bool {
        self == Self::Open
    }

    /// Results can be declared once voting is over and nothing is final yet.
    pub fn can_declare(self) -> bool {
        matches!(self, Self::NotScheduled | Self::Scheduled | Self::Closed)
    }

    /// Votes can be rejected until results are declared.
    pub fn can_reject(self) -> bool {
        self != Self::Declared
    }

    /// The candidate roster is frozen once results are declared.
    pub fn locks_roster(self) -> bool {
        self == Self::Declared
    }

    /// The coarse phase shown on the public results page.
    pub fn public_name(self) -> &'static str {
        match self {
            Self::NotScheduled | Self::Scheduled => "not_started",
            Self::Open => "ongoing",
            Self::Closed | Self::Cancelled => "ended",
            Self::Declared => "declared",
        }
    }
}
