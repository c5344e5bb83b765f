use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, Document};
use serde::{Deserialize, Serialize};

use crate::model::{common::Position, mongodb::Id};

/// A candidate standing for one position in one election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    pub election_id: Id,
    pub name: String,
    pub position: Position,
    #[serde(default)]
    pub flat_number: Option<String>,
    #[serde(default)]
    pub wing: Option<String>,
    /// Running vote counter. Rebuilt from the vote log on declaration.
    #[serde(default)]
    pub votes: i64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}

/// Editable candidate details. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateUpdate {
    pub name: Option<String>,
    pub position: Option<Position>,
    pub flat_number: Option<String>,
    pub wing: Option<String>,
}

impl CandidateUpdate {
    pub fn apply(&self, candidate: &mut CandidateCore) {
        if let Some(ref name) = self.name {
            candidate.name = name.clone();
        }
        if let Some(position) = self.position {
            candidate.position = position;
        }
        if let Some(ref flat) = self.flat_number {
            candidate.flat_number = Some(flat.clone());
        }
        if let Some(ref wing) = self.wing {
            candidate.wing = Some(wing.clone());
        }
    }

    pub fn to_set_doc(&self) -> Document {
        let mut set = Document::new();
        if let Some(ref name) = self.name {
            set.insert("name", name);
        }
        if let Some(position) = self.position {
            set.insert("position", position);
        }
        if let Some(ref flat) = self.flat_number {
            set.insert("flat_number", flat);
        }
        if let Some(ref wing) = self.wing {
            set.insert("wing", wing);
        }
        set
    }
}
