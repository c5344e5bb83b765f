use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{ElectionStatus, Position},
    mongodb::{optional_datetime, Id},
};

/// Running tally for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub candidate_id: Id,
    pub candidate_name: String,
    pub position: Position,
    pub total_votes: i64,
    /// Flats that voted for this candidate, each at most once.
    #[serde(default)]
    pub voted_by_flats: Vec<String>,
}

impl CandidateResult {
    pub fn new(candidate_id: Id, candidate_name: impl Into<String>, position: Position) -> Self {
        Self {
            candidate_id,
            candidate_name: candidate_name.into(),
            position,
            total_votes: 0,
            voted_by_flats: Vec::new(),
        }
    }

    /// Count one more vote from the given flat.
    pub fn add_vote(&mut self, flat_number: &str) {
        self.total_votes += 1;
        if !self.voted_by_flats.iter().any(|f| f == flat_number) {
            self.voted_by_flats.push(flat_number.to_string());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingStatistics {
    pub total_voters: i64,
    pub total_flats: i64,
    pub total_votes_cast: i64,
    pub voting_percentage: f64,
    pub non_voting_flats: Vec<String>,
    pub rejected_votes: i64,
}

/// Aggregate results of an election, one per election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsCore {
    pub election_id: Id,
    #[serde(default)]
    pub candidate_results: Vec<CandidateResult>,
    #[serde(default)]
    pub voting_statistics: VotingStatistics,
    #[serde(default)]
    pub election_status: ElectionStatus,
    #[serde(default, with = "optional_datetime")]
    pub declared_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ResultsCore {
    /// Empty, ongoing results.
    pub fn fresh(election_id: Id, statistics: VotingStatistics, now: DateTime<Utc>) -> Self {
        Self {
            election_id,
            candidate_results: Vec::new(),
            voting_statistics: statistics,
            election_status: ElectionStatus::Ongoing,
            declared_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Tally entries for one position, most votes first.
    pub fn for_position(&self, position: Position) -> Vec<&CandidateResult> {
        let mut entries = self
            .candidate_results
            .iter()
            .filter(|r| r.position == position)
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| b.total_votes.cmp(&a.total_votes));
        entries
    }
}

/// Results without an ID.
pub type NewResults = ResultsCore;

/// Results from the database, with their unique ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub results: ResultsCore,
}

impl Deref for Results {
    type Target = ResultsCore;

    fn deref(&self) -> &Self::Target {
        &self.results
    }
}
