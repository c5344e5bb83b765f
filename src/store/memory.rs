use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::model::{
    common::{Position, RequestOrigin},
    db::{
        admin::{Admin, AdminCore, NewAdmin},
        attendance::{Attendance, AttendanceCore},
        candidate::{Candidate, CandidateCore, CandidateUpdate, NewCandidate},
        election::{Election, ElectionCore, ElectionUpdate},
        results::{CandidateResult, Results, ResultsCore, VotingStatistics},
        schedule::Schedule,
        vote::{NewVote, Vote, VoteCore},
        voter::{NewVoter, Voter, VoterCore},
    },
    mongodb::Id,
};

use super::Store;

#[derive(Default)]
struct Tables {
    admins: BTreeMap<Id, AdminCore>,
    voters: BTreeMap<Id, VoterCore>,
    elections: BTreeMap<Id, ElectionCore>,
    /// Keyed by election.
    schedules: BTreeMap<Id, Schedule>,
    candidates: BTreeMap<Id, CandidateCore>,
    attendance: BTreeMap<Id, AttendanceCore>,
    votes: BTreeMap<Id, VoteCore>,
    /// Keyed by election.
    results: BTreeMap<Id, Results>,
}

impl Tables {
    fn find_attendance(&self, voter_id: Id, election_id: Id) -> Option<Id> {
        self.attendance
            .iter()
            .find(|(_, a)| a.voter_id == voter_id && a.election_id == election_id)
            .map(|(id, _)| *id)
    }

    /// The voter's attendance record, created with `init` if missing.
    fn upsert_attendance(
        &mut self,
        voter_id: Id,
        election_id: Id,
        init: impl FnOnce() -> AttendanceCore,
    ) -> (Id, &mut AttendanceCore) {
        let id = self
            .find_attendance(voter_id, election_id)
            .unwrap_or_else(Id::new);
        (id, self.attendance.entry(id).or_insert_with(init))
    }
}

/// A [`Store`] kept in process memory. Each call holds one lock for its whole
/// duration, giving the same per-call atomicity as single-document database
/// operations. Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn admin(&self, id: Id) -> Result<Option<Admin>> {
        let tables = self.tables.lock();
        Ok(tables.admins.get(&id).map(|admin| Admin {
            id,
            admin: admin.clone(),
        }))
    }

    async fn admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let tables = self.tables.lock();
        Ok(tables
            .admins
            .iter()
            .find(|(_, a)| a.username == username)
            .map(|(id, admin)| Admin {
                id: *id,
                admin: admin.clone(),
            }))
    }

    async fn insert_admin(&self, admin: NewAdmin) -> Result<Id> {
        let mut tables = self.tables.lock();
        if tables.admins.values().any(|a| a.username == admin.username) {
            return Err(Error::validation(format!(
                "Admin username already in use: {}",
                admin.username
            )));
        }
        let id = Id::new();
        tables.admins.insert(id, admin);
        Ok(id)
    }

    async fn count_admins(&self) -> Result<u64> {
        Ok(self.tables.lock().admins.len() as u64)
    }

    async fn voter(&self, id: Id) -> Result<Option<Voter>> {
        let tables = self.tables.lock();
        Ok(tables.voters.get(&id).map(|voter| Voter {
            id,
            voter: voter.clone(),
        }))
    }

    async fn voter_by_flat(&self, flat_number: &str) -> Result<Option<Voter>> {
        let tables = self.tables.lock();
        Ok(tables
            .voters
            .iter()
            .find(|(_, v)| v.flat_number == flat_number)
            .map(|(id, voter)| Voter {
                id: *id,
                voter: voter.clone(),
            }))
    }

    async fn voters(&self) -> Result<Vec<Voter>> {
        let tables = self.tables.lock();
        let mut voters = tables
            .voters
            .iter()
            .map(|(id, voter)| Voter {
                id: *id,
                voter: voter.clone(),
            })
            .collect::<Vec<_>>();
        voters.sort_by(|a, b| a.flat_number.cmp(&b.flat_number));
        Ok(voters)
    }

    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter> {
        let mut tables = self.tables.lock();
        if tables.voters.values().any(|v| v.flat_number == voter.flat_number) {
            return Err(Error::validation(format!(
                "Flat {} is already registered",
                voter.flat_number
            )));
        }
        let id = Id::new();
        tables.voters.insert(id, voter.clone());
        Ok(Voter { id, voter })
    }

    async fn election(&self, id: Id) -> Result<Option<Election>> {
        let tables = self.tables.lock();
        Ok(tables.elections.get(&id).map(|election| Election {
            id,
            election: election.clone(),
        }))
    }

    async fn insert_election(&self, election: &Election) -> Result<()> {
        let mut tables = self.tables.lock();
        if tables.elections.contains_key(&election.id) {
            return Err(Error::validation(format!(
                "Election {} already exists",
                election.id
            )));
        }
        tables
            .elections
            .insert(election.id, election.election.clone());
        Ok(())
    }

    async fn update_election(&self, id: Id, update: &ElectionUpdate) -> Result<Option<Election>> {
        let mut tables = self.tables.lock();
        Ok(tables.elections.get_mut(&id).map(|election| {
            update.apply(election);
            Election {
                id,
                election: election.clone(),
            }
        }))
    }

    async fn schedule(&self, election_id: Id) -> Result<Option<Schedule>> {
        Ok(self.tables.lock().schedules.get(&election_id).cloned())
    }

    async fn schedules(&self) -> Result<Vec<Schedule>> {
        Ok(self.tables.lock().schedules.values().cloned().collect())
    }

    async fn upsert_schedule(&self, schedule: &Schedule) -> Result<Schedule> {
        let mut tables = self.tables.lock();
        let mut stored = schedule.clone();
        if let Some(existing) = tables.schedules.get(&schedule.election_id) {
            stored.created_at = existing.created_at;
        }
        tables.schedules.insert(schedule.election_id, stored.clone());
        Ok(stored)
    }

    async fn delete_schedule(&self, election_id: Id) -> Result<()> {
        self.tables.lock().schedules.remove(&election_id);
        Ok(())
    }

    async fn candidate(&self, id: Id) -> Result<Option<Candidate>> {
        let tables = self.tables.lock();
        Ok(tables.candidates.get(&id).map(|candidate| Candidate {
            id,
            candidate: candidate.clone(),
        }))
    }

    async fn candidates(
        &self,
        election_id: Id,
        position: Option<Position>,
    ) -> Result<Vec<Candidate>> {
        let tables = self.tables.lock();
        let mut candidates = tables
            .candidates
            .iter()
            .filter(|(_, c)| c.election_id == election_id)
            .filter(|(_, c)| position.map_or(true, |p| c.position == p))
            .map(|(id, candidate)| Candidate {
                id: *id,
                candidate: candidate.clone(),
            })
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));
        Ok(candidates)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        let id = Id::new();
        self.tables.lock().candidates.insert(id, candidate.clone());
        Ok(Candidate { id, candidate })
    }

    async fn update_candidate(
        &self,
        id: Id,
        update: &CandidateUpdate,
    ) -> Result<Option<Candidate>> {
        let mut tables = self.tables.lock();
        Ok(tables.candidates.get_mut(&id).map(|candidate| {
            update.apply(candidate);
            Candidate {
                id,
                candidate: candidate.clone(),
            }
        }))
    }

    async fn delete_candidate(&self, id: Id) -> Result<bool> {
        Ok(self.tables.lock().candidates.remove(&id).is_some())
    }

    async fn increment_candidate_votes(&self, id: Id, by: i64) -> Result<()> {
        if let Some(candidate) = self.tables.lock().candidates.get_mut(&id) {
            candidate.votes += by;
        }
        Ok(())
    }

    async fn set_candidate_votes(&self, id: Id, votes: i64) -> Result<()> {
        if let Some(candidate) = self.tables.lock().candidates.get_mut(&id) {
            candidate.votes = votes;
        }
        Ok(())
    }

    async fn attendance(&self, voter_id: Id, election_id: Id) -> Result<Option<Attendance>> {
        let tables = self.tables.lock();
        Ok(tables
            .find_attendance(voter_id, election_id)
            .and_then(|id| {
                tables.attendance.get(&id).map(|attendance| Attendance {
                    id,
                    attendance: attendance.clone(),
                })
            }))
    }

    async fn attendances(&self, election_id: Id) -> Result<Vec<Attendance>> {
        let tables = self.tables.lock();
        let mut records = tables
            .attendance
            .iter()
            .filter(|(_, a)| a.election_id == election_id)
            .map(|(id, attendance)| Attendance {
                id: *id,
                attendance: attendance.clone(),
            })
            .collect::<Vec<_>>();
        records.sort_by(|a, b| a.flat_number.cmp(&b.flat_number));
        Ok(records)
    }

    async fn record_login(
        &self,
        voter: &Voter,
        election_id: Id,
        origin: &RequestOrigin,
        now: DateTime<Utc>,
    ) -> Result<Attendance> {
        let mut tables = self.tables.lock();
        let (id, record) = tables.upsert_attendance(voter.id, election_id, || AttendanceCore {
            name: Some(voter.name.clone()),
            login_time: Some(now),
            ip_address: origin.ip_address.clone(),
            user_agent: origin.user_agent.clone(),
            ..AttendanceCore::new(voter.id, election_id, voter.flat_number.clone())
        });
        record.flat_number = voter.flat_number.clone();
        record.updated_at = Some(now);
        Ok(Attendance {
            id,
            attendance: record.clone(),
        })
    }

    async fn mark_voted(
        &self,
        voter_id: Id,
        election_id: Id,
        flat_number: &str,
        origin: &RequestOrigin,
        now: DateTime<Utc>,
    ) -> Result<Attendance> {
        let mut tables = self.tables.lock();
        let (id, record) = tables.upsert_attendance(voter_id, election_id, || AttendanceCore {
            login_time: Some(now),
            ip_address: origin.ip_address.clone(),
            user_agent: origin.user_agent.clone(),
            ..AttendanceCore::new(voter_id, election_id, flat_number)
        });
        record.voted = true;
        record.vote_time = Some(now);
        record.flat_number = flat_number.to_string();
        record.updated_at = Some(now);
        Ok(Attendance {
            id,
            attendance: record.clone(),
        })
    }

    async fn set_attendance_name(&self, id: Id, name: &str) -> Result<()> {
        if let Some(record) = self.tables.lock().attendance.get_mut(&id) {
            record.name = Some(name.to_string());
        }
        Ok(())
    }

    async fn reject_attendance(
        &self,
        voter_id: Id,
        election_id: Id,
        flat_number: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.lock();
        let (_, record) = tables.upsert_attendance(voter_id, election_id, || {
            AttendanceCore::new(voter_id, election_id, flat_number)
        });
        record.rejected = true;
        record.rejected_at = Some(now);
        record.updated_at = Some(now);
        Ok(())
    }

    async fn vote(&self, voter_id: Id, election_id: Id) -> Result<Option<Vote>> {
        let tables = self.tables.lock();
        Ok(tables
            .votes
            .iter()
            .find(|(_, v)| v.voter_id == voter_id && v.election_id == election_id)
            .map(|(id, vote)| Vote {
                id: *id,
                vote: vote.clone(),
            }))
    }

    async fn votes(&self, election_id: Id) -> Result<Vec<Vote>> {
        let tables = self.tables.lock();
        let mut votes = tables
            .votes
            .iter()
            .filter(|(_, v)| v.election_id == election_id)
            .map(|(id, vote)| Vote {
                id: *id,
                vote: vote.clone(),
            })
            .collect::<Vec<_>>();
        votes.sort_by_key(|v| v.timestamp);
        Ok(votes)
    }

    async fn count_votes(&self, election_id: Id) -> Result<u64> {
        let tables = self.tables.lock();
        Ok(tables
            .votes
            .values()
            .filter(|v| v.election_id == election_id)
            .count() as u64)
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote> {
        let mut tables = self.tables.lock();
        let duplicate = tables
            .votes
            .values()
            .any(|v| v.voter_id == vote.voter_id && v.election_id == vote.election_id);
        if duplicate {
            return Err(Error::already_voted());
        }
        let id = Id::new();
        tables.votes.insert(id, vote.clone());
        Ok(Vote { id, vote })
    }

    async fn delete_votes_by_flats(&self, election_id: Id, flats: &[String]) -> Result<Vec<Vote>> {
        let mut tables = self.tables.lock();
        let doomed = tables
            .votes
            .iter()
            .filter(|(_, v)| v.election_id == election_id && flats.contains(&v.flat_number))
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        Ok(doomed
            .into_iter()
            .filter_map(|id| tables.votes.remove(&id).map(|vote| Vote { id, vote }))
            .collect())
    }

    async fn results(&self, election_id: Id) -> Result<Option<Results>> {
        Ok(self.tables.lock().results.get(&election_id).cloned())
    }

    async fn ensure_results(
        &self,
        election_id: Id,
        total_voters: i64,
        total_flats: i64,
        now: DateTime<Utc>,
    ) -> Result<Results> {
        let mut tables = self.tables.lock();
        let results = tables.results.entry(election_id).or_insert_with(|| Results {
            id: Id::new(),
            results: ResultsCore::fresh(election_id, VotingStatistics::default(), now),
        });
        results.results.voting_statistics.total_voters = total_voters;
        results.results.voting_statistics.total_flats = total_flats;
        results.results.updated_at = now;
        Ok(results.clone())
    }

    async fn increment_tally(
        &self,
        election_id: Id,
        candidate_id: Id,
        flat_number: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.lock();
        let Some(results) = tables.results.get_mut(&election_id) else {
            return Ok(false);
        };
        match results
            .results
            .candidate_results
            .iter_mut()
            .find(|r| r.candidate_id == candidate_id)
        {
            Some(entry) => {
                entry.add_vote(flat_number);
                results.results.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn push_tally(
        &self,
        election_id: Id,
        entry: &CandidateResult,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.lock();
        let results = tables.results.entry(election_id).or_insert_with(|| Results {
            id: Id::new(),
            results: ResultsCore::fresh(election_id, VotingStatistics::default(), now),
        });
        let core = &mut results.results;
        if core
            .candidate_results
            .iter()
            .any(|r| r.candidate_id == entry.candidate_id)
        {
            return Ok(false);
        }
        core.candidate_results.push(entry.clone());
        core.voting_statistics.total_votes_cast += 1;
        core.updated_at = now;
        Ok(true)
    }

    async fn replace_results(&self, results: &Results) -> Result<()> {
        self.tables
            .lock()
            .results
            .insert(results.election_id, results.clone());
        Ok(())
    }

    async fn delete_election_data(&self, election_id: Id) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.votes.retain(|_, v| v.election_id != election_id);
        tables.attendance.retain(|_, a| a.election_id != election_id);
        tables.results.remove(&election_id);
        tables.candidates.retain(|_, c| c.election_id != election_id);
        Ok(())
    }
}
