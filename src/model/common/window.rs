use chrono::{DateTime, Utc};

/// A voting window with inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScheduleWindow {
    /// A window from the given bounds. A window that ends before it starts is
    /// ambiguous and yields `None`, as does a missing bound.
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<Self> {
        match (start, end) {
            (Some(start), Some(end)) if start <= end => Some(Self { start, end }),
            _ => None,
        }
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start <= now
    }
}
