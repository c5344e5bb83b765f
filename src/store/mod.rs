//! Persistence behind a single object-safe trait, so the lifecycle runs the
//! same against MongoDB and against the in-process store used by tests.

mod memory;
mod mongo;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{
    common::{Position, RequestOrigin},
    db::{
        admin::{Admin, NewAdmin},
        attendance::Attendance,
        candidate::{Candidate, CandidateUpdate, NewCandidate},
        election::{Election, ElectionUpdate},
        results::{CandidateResult, Results},
        schedule::Schedule,
        vote::{NewVote, Vote},
        voter::{NewVoter, Voter},
    },
    mongodb::Id,
};

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// The store as held in Rocket's managed state.
pub type DynStore = Arc<dyn Store>;

/// Document operations used by the server. Every method is atomic on its own;
/// nothing is atomic across calls.
#[rocket::async_trait]
pub trait Store: Send + Sync {
    // Admins.
    async fn admin(&self, id: Id) -> Result<Option<Admin>>;
    async fn admin_by_username(&self, username: &str) -> Result<Option<Admin>>;
    async fn insert_admin(&self, admin: NewAdmin) -> Result<Id>;
    async fn count_admins(&self) -> Result<u64>;

    // Voters.
    async fn voter(&self, id: Id) -> Result<Option<Voter>>;
    async fn voter_by_flat(&self, flat_number: &str) -> Result<Option<Voter>>;
    /// Every registered voter, ordered by flat number.
    async fn voters(&self) -> Result<Vec<Voter>>;
    /// Fails with a validation error if the flat is already registered.
    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter>;

    // Elections.
    async fn election(&self, id: Id) -> Result<Option<Election>>;
    async fn insert_election(&self, election: &Election) -> Result<()>;
    /// Apply the update and return the election as it now is, or `None` if
    /// there is no such election.
    async fn update_election(&self, id: Id, update: &ElectionUpdate) -> Result<Option<Election>>;

    // Schedules.
    async fn schedule(&self, election_id: Id) -> Result<Option<Schedule>>;
    async fn schedules(&self) -> Result<Vec<Schedule>>;
    /// Insert or overwrite the schedule for its election, keeping the
    /// original creation time.
    async fn upsert_schedule(&self, schedule: &Schedule) -> Result<Schedule>;
    async fn delete_schedule(&self, election_id: Id) -> Result<()>;

    // Candidates.
    async fn candidate(&self, id: Id) -> Result<Option<Candidate>>;
    /// Candidates in an election, optionally for one position only.
    async fn candidates(
        &self,
        election_id: Id,
        position: Option<Position>,
    ) -> Result<Vec<Candidate>>;
    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate>;
    async fn update_candidate(
        &self,
        id: Id,
        update: &CandidateUpdate,
    ) -> Result<Option<Candidate>>;
    /// Returns whether a candidate was deleted.
    async fn delete_candidate(&self, id: Id) -> Result<bool>;
    async fn increment_candidate_votes(&self, id: Id, by: i64) -> Result<()>;
    async fn set_candidate_votes(&self, id: Id, votes: i64) -> Result<()>;

    // Attendance.
    async fn attendance(&self, voter_id: Id, election_id: Id) -> Result<Option<Attendance>>;
    async fn attendances(&self, election_id: Id) -> Result<Vec<Attendance>>;
    /// Upsert the voter's record. Login time and origin are only captured
    /// when the record is created.
    async fn record_login(
        &self,
        voter: &Voter,
        election_id: Id,
        origin: &RequestOrigin,
        now: DateTime<Utc>,
    ) -> Result<Attendance>;
    /// Upsert the voter's record as voted. Login time and origin are only
    /// captured when the record is created; the name is left for the caller.
    async fn mark_voted(
        &self,
        voter_id: Id,
        election_id: Id,
        flat_number: &str,
        origin: &RequestOrigin,
        now: DateTime<Utc>,
    ) -> Result<Attendance>;
    async fn set_attendance_name(&self, id: Id, name: &str) -> Result<()>;
    /// Upsert the voter's record as rejected. This is never undone.
    async fn reject_attendance(
        &self,
        voter_id: Id,
        election_id: Id,
        flat_number: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;

    // Votes.
    async fn vote(&self, voter_id: Id, election_id: Id) -> Result<Option<Vote>>;
    /// Every ballot in an election, oldest first.
    async fn votes(&self, election_id: Id) -> Result<Vec<Vote>>;
    async fn count_votes(&self, election_id: Id) -> Result<u64>;
    /// Fails with [`crate::error::Error::already_voted`] if the voter already
    /// has a ballot in this election.
    async fn insert_vote(&self, vote: NewVote) -> Result<Vote>;
    /// Delete the ballots of the given flats, returning what was deleted.
    async fn delete_votes_by_flats(&self, election_id: Id, flats: &[String]) -> Result<Vec<Vote>>;

    // Results.
    async fn results(&self, election_id: Id) -> Result<Option<Results>>;
    /// Create empty ongoing results if missing; either way refresh the voter
    /// and flat counts.
    async fn ensure_results(
        &self,
        election_id: Id,
        total_voters: i64,
        total_flats: i64,
        now: DateTime<Utc>,
    ) -> Result<Results>;
    /// Count one vote from a flat on an existing tally entry. Returns false
    /// if the candidate has no entry yet.
    async fn increment_tally(
        &self,
        election_id: Id,
        candidate_id: Id,
        flat_number: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;
    /// Append a tally entry and bump the cast-vote counter, creating the
    /// results if needed. Returns false if an entry for the candidate
    /// already exists, in which case nothing changes.
    async fn push_tally(
        &self,
        election_id: Id,
        entry: &CandidateResult,
        now: DateTime<Utc>,
    ) -> Result<bool>;
    /// Overwrite the results of their election.
    async fn replace_results(&self, results: &Results) -> Result<()>;

    /// Delete the votes, attendance, results and candidates of an election.
    async fn delete_election_data(&self, election_id: Id) -> Result<()>;
}
