use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    common::Position,
    db::candidate::{Candidate, CandidateUpdate, NewCandidate},
    mongodb::Id,
};

fn parse_position(value: &str) -> Result<Position> {
    value.parse().map_err(|_| {
        let names = Position::ALL.map(|p| p.as_str()).join(", ");
        Error::validation(format!("Invalid position. Must be one of: {names}"))
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A new candidate. Without an `electionId` the configured election is used.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRequest {
    #[serde(default)]
    pub election_id: Option<ApiId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub flat_number: Option<String>,
    #[serde(default)]
    pub wing: Option<String>,
}

impl CandidateRequest {
    pub fn into_candidate(self, default_election: Id, now: DateTime<Utc>) -> Result<NewCandidate> {
        if self.name.trim().is_empty() || self.position.trim().is_empty() {
            return Err(Error::validation("Name and position are required"));
        }
        Ok(NewCandidate {
            election_id: self.election_id.map(Id::from).unwrap_or(default_election),
            name: self.name.trim().to_string(),
            position: parse_position(&self.position)?,
            flat_number: non_blank(self.flat_number),
            wing: non_blank(self.wing),
            votes: 0,
            created_at: now,
        })
    }
}

/// Candidate edits; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub flat_number: Option<String>,
    #[serde(default)]
    pub wing: Option<String>,
}

impl TryFrom<CandidateEdit> for CandidateUpdate {
    type Error = Error;

    fn try_from(edit: CandidateEdit) -> Result<Self> {
        let name = match edit.name {
            Some(name) if name.trim().is_empty() => {
                return Err(Error::validation("Name must not be empty"))
            }
            name => name.map(|n| n.trim().to_string()),
        };
        Ok(Self {
            name,
            position: edit.position.as_deref().map(parse_position).transpose()?,
            flat_number: non_blank(edit.flat_number),
            wing: non_blank(edit.wing),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateView {
    pub id: ApiId,
    pub election_id: ApiId,
    pub name: String,
    pub position: Position,
    pub flat_number: Option<String>,
    pub wing: Option<String>,
    pub votes: i64,
}

impl From<Candidate> for CandidateView {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.into(),
            election_id: candidate.candidate.election_id.into(),
            name: candidate.candidate.name,
            position: candidate.candidate.position,
            flat_number: candidate.candidate.flat_number,
            wing: candidate.candidate.wing,
            votes: candidate.candidate.votes,
        }
    }
}
