use chrono::{DateTime, Utc};
use mongodb::{
    bson::{self, doc, Bson, Document},
    options::{FindOneAndUpdateOptions, FindOptions, ReplaceOptions, ReturnDocument, UpdateOptions},
    Database,
};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    common::{ElectionStatus, Position, RequestOrigin},
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
    mongodb::{is_duplicate_key_error, Coll, Id, MongoCollection},
};

use super::Store;

fn date(dt: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_chrono(dt)
}

/// The ID MongoDB assigned to an inserted document.
fn inserted_id(id: Bson) -> Result<Id> {
    id.as_object_id()
        .map(Id::from)
        .ok_or_else(|| Error::Internal(format!("unexpected inserted ID {id}")))
}

fn upsert_returning_new() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .upsert(true)
        .return_document(ReturnDocument::After)
        .build()
}

fn returning_new() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

fn tally_entry(entry: &CandidateResult) -> Document {
    doc! {
        "candidate_id": entry.candidate_id,
        "candidate_name": &entry.candidate_name,
        "position": entry.position,
        "total_votes": entry.total_votes,
        "voted_by_flats": entry.voted_by_flats.clone(),
    }
}

/// A [`Store`] over a MongoDB database. Indexes are created separately by
/// [`crate::model::mongodb::ensure_indexes_exist`]; the unique ones back the
/// duplicate checks here.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    fn coll<T: MongoCollection>(&self) -> Coll<T> {
        Coll::from_db(&self.db)
    }

    fn attendance_filter(voter_id: Id, election_id: Id) -> Document {
        doc! { "voter_id": voter_id, "election_id": election_id }
    }

    async fn upsert_attendance(
        &self,
        voter_id: Id,
        election_id: Id,
        set: Document,
        set_on_insert: Document,
    ) -> Result<Attendance> {
        let update = doc! { "$set": set, "$setOnInsert": set_on_insert };
        self.coll::<Attendance>()
            .find_one_and_update(
                Self::attendance_filter(voter_id, election_id),
                update,
                upsert_returning_new(),
            )
            .await?
            .ok_or_else(|| Error::Internal("attendance upsert returned nothing".to_string()))
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn admin(&self, id: Id) -> Result<Option<Admin>> {
        Ok(self.coll::<Admin>().find_one(id.as_doc(), None).await?)
    }

    async fn admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let filter = doc! { "username": username };
        Ok(self.coll::<Admin>().find_one(filter, None).await?)
    }

    async fn insert_admin(&self, admin: NewAdmin) -> Result<Id> {
        match self.coll::<NewAdmin>().insert_one(&admin, None).await {
            Ok(result) => inserted_id(result.inserted_id),
            Err(e) if is_duplicate_key_error(&e) => Err(Error::validation(format!(
                "Admin username already in use: {}",
                admin.username
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn count_admins(&self) -> Result<u64> {
        Ok(self.coll::<Admin>().count_documents(None, None).await?)
    }

    async fn voter(&self, id: Id) -> Result<Option<Voter>> {
        Ok(self.coll::<Voter>().find_one(id.as_doc(), None).await?)
    }

    async fn voter_by_flat(&self, flat_number: &str) -> Result<Option<Voter>> {
        let filter = doc! { "flat_number": flat_number };
        Ok(self.coll::<Voter>().find_one(filter, None).await?)
    }

    async fn voters(&self) -> Result<Vec<Voter>> {
        let options = FindOptions::builder().sort(doc! { "flat_number": 1 }).build();
        Ok(self
            .coll::<Voter>()
            .find(None, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter> {
        match self.coll::<NewVoter>().insert_one(&voter, None).await {
            Ok(result) => Ok(Voter {
                id: inserted_id(result.inserted_id)?,
                voter,
            }),
            Err(e) if is_duplicate_key_error(&e) => Err(Error::validation(format!(
                "Flat {} is already registered",
                voter.flat_number
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn election(&self, id: Id) -> Result<Option<Election>> {
        Ok(self.coll::<Election>().find_one(id.as_doc(), None).await?)
    }

    async fn insert_election(&self, election: &Election) -> Result<()> {
        self.coll::<Election>().insert_one(election, None).await?;
        Ok(())
    }

    async fn update_election(&self, id: Id, update: &ElectionUpdate) -> Result<Option<Election>> {
        let update = doc! { "$set": update.to_set_doc() };
        Ok(self
            .coll::<Election>()
            .find_one_and_update(id.as_doc(), update, returning_new())
            .await?)
    }

    async fn schedule(&self, election_id: Id) -> Result<Option<Schedule>> {
        let filter = doc! { "election_id": election_id };
        Ok(self.coll::<Schedule>().find_one(filter, None).await?)
    }

    async fn schedules(&self) -> Result<Vec<Schedule>> {
        Ok(self
            .coll::<Schedule>()
            .find(None, None)
            .await?
            .try_collect()
            .await?)
    }

    async fn upsert_schedule(&self, schedule: &Schedule) -> Result<Schedule> {
        let filter = doc! { "election_id": schedule.election_id };
        let update = doc! {
            "$set": {
                "start_date": date(schedule.start_date),
                "end_date": date(schedule.end_date),
                "auto_open_enabled": schedule.auto_open_enabled,
                "updated_at": date(schedule.updated_at),
            },
            "$setOnInsert": {
                "created_at": date(schedule.created_at),
            },
        };
        self.coll::<Schedule>()
            .find_one_and_update(filter, update, upsert_returning_new())
            .await?
            .ok_or_else(|| Error::Internal("schedule upsert returned nothing".to_string()))
    }

    async fn delete_schedule(&self, election_id: Id) -> Result<()> {
        let filter = doc! { "election_id": election_id };
        self.coll::<Schedule>().delete_one(filter, None).await?;
        Ok(())
    }

    async fn candidate(&self, id: Id) -> Result<Option<Candidate>> {
        Ok(self.coll::<Candidate>().find_one(id.as_doc(), None).await?)
    }

    async fn candidates(
        &self,
        election_id: Id,
        position: Option<Position>,
    ) -> Result<Vec<Candidate>> {
        let mut filter = doc! { "election_id": election_id };
        if let Some(position) = position {
            filter.insert("position", position);
        }
        let options = FindOptions::builder()
            .sort(doc! { "position": 1, "name": 1 })
            .build();
        let mut candidates: Vec<Candidate> = self
            .coll::<Candidate>()
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        // The database sorts positions by name; use the fixed order instead.
        candidates.sort_by(|a, b| a.position.cmp(&b.position));
        Ok(candidates)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        let result = self
            .coll::<NewCandidate>()
            .insert_one(&candidate, None)
            .await?;
        Ok(Candidate {
            id: inserted_id(result.inserted_id)?,
            candidate,
        })
    }

    async fn update_candidate(
        &self,
        id: Id,
        update: &CandidateUpdate,
    ) -> Result<Option<Candidate>> {
        let set = update.to_set_doc();
        if set.is_empty() {
            return self.candidate(id).await;
        }
        Ok(self
            .coll::<Candidate>()
            .find_one_and_update(id.as_doc(), doc! { "$set": set }, returning_new())
            .await?)
    }

    async fn delete_candidate(&self, id: Id) -> Result<bool> {
        let result = self.coll::<Candidate>().delete_one(id.as_doc(), None).await?;
        Ok(result.deleted_count > 0)
    }

    async fn increment_candidate_votes(&self, id: Id, by: i64) -> Result<()> {
        let update = doc! { "$inc": { "votes": by } };
        self.coll::<Candidate>()
            .update_one(id.as_doc(), update, None)
            .await?;
        Ok(())
    }

    async fn set_candidate_votes(&self, id: Id, votes: i64) -> Result<()> {
        let update = doc! { "$set": { "votes": votes } };
        self.coll::<Candidate>()
            .update_one(id.as_doc(), update, None)
            .await?;
        Ok(())
    }

    async fn attendance(&self, voter_id: Id, election_id: Id) -> Result<Option<Attendance>> {
        Ok(self
            .coll::<Attendance>()
            .find_one(Self::attendance_filter(voter_id, election_id), None)
            .await?)
    }

    async fn attendances(&self, election_id: Id) -> Result<Vec<Attendance>> {
        let filter = doc! { "election_id": election_id };
        let options = FindOptions::builder().sort(doc! { "flat_number": 1 }).build();
        Ok(self
            .coll::<Attendance>()
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn record_login(
        &self,
        voter: &Voter,
        election_id: Id,
        origin: &RequestOrigin,
        now: DateTime<Utc>,
    ) -> Result<Attendance> {
        let set = doc! {
            "flat_number": &voter.flat_number,
            "updated_at": date(now),
        };
        let set_on_insert = doc! {
            "name": &voter.name,
            "voted": false,
            "rejected": false,
            "login_time": date(now),
            "ip_address": origin.ip_address.clone(),
            "user_agent": origin.user_agent.clone(),
        };
        self.upsert_attendance(voter.id, election_id, set, set_on_insert)
            .await
    }

    async fn mark_voted(
        &self,
        voter_id: Id,
        election_id: Id,
        flat_number: &str,
        origin: &RequestOrigin,
        now: DateTime<Utc>,
    ) -> Result<Attendance> {
        let set = doc! {
            "voted": true,
            "vote_time": date(now),
            "flat_number": flat_number,
            "updated_at": date(now),
        };
        let set_on_insert = doc! {
            "rejected": false,
            "login_time": date(now),
            "ip_address": origin.ip_address.clone(),
            "user_agent": origin.user_agent.clone(),
        };
        self.upsert_attendance(voter_id, election_id, set, set_on_insert)
            .await
    }

    async fn set_attendance_name(&self, id: Id, name: &str) -> Result<()> {
        let update = doc! { "$set": { "name": name } };
        self.coll::<Attendance>()
            .update_one(id.as_doc(), update, None)
            .await?;
        Ok(())
    }

    async fn reject_attendance(
        &self,
        voter_id: Id,
        election_id: Id,
        flat_number: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let set = doc! {
            "rejected": true,
            "rejected_at": date(now),
            "updated_at": date(now),
        };
        let set_on_insert = doc! {
            "flat_number": flat_number,
            "voted": false,
        };
        self.upsert_attendance(voter_id, election_id, set, set_on_insert)
            .await?;
        Ok(())
    }

    async fn vote(&self, voter_id: Id, election_id: Id) -> Result<Option<Vote>> {
        let filter = doc! { "voter_id": voter_id, "election_id": election_id };
        Ok(self.coll::<Vote>().find_one(filter, None).await?)
    }

    async fn votes(&self, election_id: Id) -> Result<Vec<Vote>> {
        let filter = doc! { "election_id": election_id };
        let options = FindOptions::builder().sort(doc! { "timestamp": 1 }).build();
        Ok(self
            .coll::<Vote>()
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn count_votes(&self, election_id: Id) -> Result<u64> {
        let filter = doc! { "election_id": election_id };
        Ok(self.coll::<Vote>().count_documents(filter, None).await?)
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote> {
        match self.coll::<NewVote>().insert_one(&vote, None).await {
            Ok(result) => Ok(Vote {
                id: inserted_id(result.inserted_id)?,
                vote,
            }),
            // Lost a race with a concurrent ballot from the same voter.
            Err(e) if is_duplicate_key_error(&e) => Err(Error::already_voted()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_votes_by_flats(&self, election_id: Id, flats: &[String]) -> Result<Vec<Vote>> {
        let filter = doc! {
            "election_id": election_id,
            "flat_number": { "$in": flats.to_vec() },
        };
        let doomed: Vec<Vote> = self
            .coll::<Vote>()
            .find(filter, None)
            .await?
            .try_collect()
            .await?;
        let ids = doomed.iter().map(|v| Bson::from(v.id)).collect::<Vec<_>>();
        self.coll::<Vote>()
            .delete_many(doc! { "_id": { "$in": ids } }, None)
            .await?;
        Ok(doomed)
    }

    async fn results(&self, election_id: Id) -> Result<Option<Results>> {
        let filter = doc! { "election_id": election_id };
        Ok(self.coll::<Results>().find_one(filter, None).await?)
    }

    async fn ensure_results(
        &self,
        election_id: Id,
        total_voters: i64,
        total_flats: i64,
        now: DateTime<Utc>,
    ) -> Result<Results> {
        let filter = doc! { "election_id": election_id };
        let update = doc! {
            "$set": {
                "voting_statistics.total_voters": total_voters,
                "voting_statistics.total_flats": total_flats,
                "updated_at": date(now),
            },
            "$setOnInsert": {
                "candidate_results": [],
                "voting_statistics.total_votes_cast": 0_i64,
                "voting_statistics.voting_percentage": 0.0,
                "voting_statistics.non_voting_flats": [],
                "voting_statistics.rejected_votes": 0_i64,
                "election_status": ElectionStatus::Ongoing,
                "declared_at": Bson::Null,
                "created_at": date(now),
            },
        };
        self.coll::<Results>()
            .find_one_and_update(filter, update, upsert_returning_new())
            .await?
            .ok_or_else(|| Error::Internal("results upsert returned nothing".to_string()))
    }

    async fn increment_tally(
        &self,
        election_id: Id,
        candidate_id: Id,
        flat_number: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let filter = doc! {
            "election_id": election_id,
            "candidate_results.candidate_id": candidate_id,
        };
        let update = doc! {
            "$inc": { "candidate_results.$.total_votes": 1_i64 },
            "$addToSet": { "candidate_results.$.voted_by_flats": flat_number },
            "$set": { "updated_at": date(now) },
        };
        let result = self
            .coll::<Results>()
            .update_one(filter, update, None)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn push_tally(
        &self,
        election_id: Id,
        entry: &CandidateResult,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let filter = doc! {
            "election_id": election_id,
            "candidate_results.candidate_id": { "$ne": entry.candidate_id },
        };
        let update = doc! {
            "$push": { "candidate_results": tally_entry(entry) },
            "$inc": { "voting_statistics.total_votes_cast": 1_i64 },
            "$set": { "updated_at": date(now) },
            "$setOnInsert": {
                "election_status": ElectionStatus::Ongoing,
                "declared_at": Bson::Null,
                "created_at": date(now),
            },
        };
        let options = UpdateOptions::builder().upsert(true).build();
        match self
            .coll::<Results>()
            .update_one(filter, update, options)
            .await
        {
            Ok(_) => Ok(true),
            // The filter missed because the entry already exists, and the
            // upsert then collided with the existing results.
            Err(e) if is_duplicate_key_error(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_results(&self, results: &Results) -> Result<()> {
        let filter = doc! { "election_id": results.election_id };
        let options = ReplaceOptions::builder().upsert(true).build();
        self.coll::<Results>()
            .replace_one(filter, results, options)
            .await?;
        Ok(())
    }

    async fn delete_election_data(&self, election_id: Id) -> Result<()> {
        let filter = doc! { "election_id": election_id };
        self.coll::<Vote>().delete_many(filter.clone(), None).await?;
        self.coll::<Attendance>()
            .delete_many(filter.clone(), None)
            .await?;
        self.coll::<Results>().delete_many(filter.clone(), None).await?;
        self.coll::<Candidate>().delete_many(filter, None).await?;
        Ok(())
    }
}
