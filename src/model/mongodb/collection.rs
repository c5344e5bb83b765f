use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{
    admin::{Admin, NewAdmin},
    attendance::Attendance,
    candidate::{Candidate, NewCandidate},
    election::Election,
    results::Results,
    schedule::Schedule,
    vote::{NewVote, Vote},
    voter::{NewVoter, Voter},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

const ADMINS: &str = "admins";
impl MongoCollection for Admin {
    const NAME: &'static str = ADMINS;
}
impl MongoCollection for NewAdmin {
    const NAME: &'static str = ADMINS;
}

const VOTERS: &str = "voters";
impl MongoCollection for Voter {
    const NAME: &'static str = VOTERS;
}
impl MongoCollection for NewVoter {
    const NAME: &'static str = VOTERS;
}

const ELECTIONS: &str = "elections";
impl MongoCollection for Election {
    const NAME: &'static str = ELECTIONS;
}

const SCHEDULES: &str = "schedules";
impl MongoCollection for Schedule {
    const NAME: &'static str = SCHEDULES;
}

const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}
impl MongoCollection for NewCandidate {
    const NAME: &'static str = CANDIDATES;
}

const ATTENDANCE: &str = "attendance";
impl MongoCollection for Attendance {
    const NAME: &'static str = ATTENDANCE;
}

const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for NewVote {
    const NAME: &'static str = VOTES;
}

const RESULTS: &str = "results";
impl MongoCollection for Results {
    const NAME: &'static str = RESULTS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();
    let unique_index = |keys| {
        IndexModel::builder()
            .keys(keys)
            .options(unique.clone())
            .build()
    };

    Coll::<Admin>::from_db(db)
        .create_index(unique_index(doc! {"username": 1}), None)
        .await?;
    Coll::<Voter>::from_db(db)
        .create_index(unique_index(doc! {"flat_number": 1}), None)
        .await?;
    Coll::<Schedule>::from_db(db)
        .create_index(unique_index(doc! {"election_id": 1}), None)
        .await?;
    Coll::<Results>::from_db(db)
        .create_index(unique_index(doc! {"election_id": 1}), None)
        .await?;

    // One ballot per voter per election. This is the authoritative guard
    // against double voting.
    Coll::<Vote>::from_db(db)
        .create_index(unique_index(doc! {"voter_id": 1, "election_id": 1}), None)
        .await?;
    Coll::<Attendance>::from_db(db)
        .create_index(unique_index(doc! {"voter_id": 1, "election_id": 1}), None)
        .await?;

    let by_election = IndexModel::builder()
        .keys(doc! {"election_id": 1, "position": 1})
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(by_election, None)
        .await?;

    Ok(())
}
