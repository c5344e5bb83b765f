use std::{collections::BTreeMap, ops::Deref};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::Position, mongodb::Id};

/// A recorded ballot. Immutable once inserted; unique per (voter, election).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub voter_id: Id,
    pub election_id: Id,
    pub flat_number: String,
    /// The chosen candidate for each position voted on, keyed by the
    /// position's display name.
    pub votes: BTreeMap<String, Id>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl VoteCore {
    pub fn new(
        voter_id: Id,
        election_id: Id,
        flat_number: impl Into<String>,
        choices: &BTreeMap<Position, Id>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            voter_id,
            election_id,
            flat_number: flat_number.into(),
            votes: choices
                .iter()
                .map(|(position, candidate)| (position.to_string(), *candidate))
                .collect(),
            timestamp,
        }
    }

    /// The chosen candidates. Entries naming an unknown position are skipped.
    pub fn choices(&self) -> impl Iterator<Item = (Position, Id)> + '_ {
        self.votes
            .iter()
            .filter_map(|(position, candidate)| Some((position.parse().ok()?, *candidate)))
    }
}

/// A ballot without an ID.
pub type NewVote = VoteCore;

/// A ballot from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}
