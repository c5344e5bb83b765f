use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{self, doc, serde_helpers::chrono_datetime_as_bson_datetime, Bson, Document};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::ScheduleWindow,
    mongodb::{optional_datetime, Id},
};

/// Core election data. The dates are a cached copy of the election's
/// [`Schedule`](super::schedule::Schedule) and may lag behind it until the
/// synchroniser repairs them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionCore {
    pub name: String,
    pub is_open: bool,
    pub auto_open_enabled: bool,
    #[serde(default, with = "optional_datetime")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_datetime")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ElectionCore {
    /// The voting window according to the cached dates.
    pub fn cached_window(&self) -> Option<ScheduleWindow> {
        ScheduleWindow::new(self.start_date, self.end_date)
    }

    /// Has either date ever been set?
    pub fn has_dates(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }
}

/// An election from the database, with its unique ID. Elections are never
/// deleted, only reset in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Election {
    /// A closed, unscheduled election in manual mode.
    pub fn new(id: Id, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            election: ElectionCore {
                name: name.into(),
                is_open: false,
                auto_open_enabled: false,
                start_date: None,
                end_date: None,
                updated_at: now,
            },
        }
    }
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

/// A partial update of an election. Unset fields are left alone; the
/// modification time is always bumped.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectionUpdate {
    pub is_open: Option<bool>,
    pub auto_open_enabled: Option<bool>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub updated_at: DateTime<Utc>,
}

impl ElectionUpdate {
    /// An update that only touches the modification time.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            is_open: None,
            auto_open_enabled: None,
            start_date: None,
            end_date: None,
            updated_at: now,
        }
    }

    pub fn open(mut self, is_open: bool) -> Self {
        self.is_open = Some(is_open);
        self
    }

    pub fn auto(mut self, auto_open_enabled: bool) -> Self {
        self.auto_open_enabled = Some(auto_open_enabled);
        self
    }

    pub fn start(mut self, start_date: Option<DateTime<Utc>>) -> Self {
        self.start_date = Some(start_date);
        self
    }

    pub fn end(mut self, end_date: Option<DateTime<Utc>>) -> Self {
        self.end_date = Some(end_date);
        self
    }

    /// Does this update change anything besides the modification time?
    pub fn is_empty(&self) -> bool {
        self.is_open.is_none()
            && self.auto_open_enabled.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }

    pub fn apply(&self, election: &mut ElectionCore) {
        if let Some(is_open) = self.is_open {
            election.is_open = is_open;
        }
        if let Some(auto) = self.auto_open_enabled {
            election.auto_open_enabled = auto;
        }
        if let Some(start) = self.start_date {
            election.start_date = start;
        }
        if let Some(end) = self.end_date {
            election.end_date = end;
        }
        election.updated_at = self.updated_at;
    }

    /// The `$set` document performing this update.
    pub fn to_set_doc(&self) -> Document {
        fn date(value: Option<DateTime<Utc>>) -> Bson {
            value
                .map(|dt| Bson::DateTime(bson::DateTime::from_chrono(dt)))
                .unwrap_or(Bson::Null)
        }

        let mut set = doc! {
            "updated_at": bson::DateTime::from_chrono(self.updated_at),
        };
        if let Some(is_open) = self.is_open {
            set.insert("is_open", is_open);
        }
        if let Some(auto) = self.auto_open_enabled {
            set.insert("auto_open_enabled", auto);
        }
        if let Some(start) = self.start_date {
            set.insert("start_date", date(start));
        }
        if let Some(end) = self.end_date {
            set.insert("end_date", date(end));
        }
        set
    }
}
