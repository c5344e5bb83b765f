use chrono::{DateTime, Utc};
use log::debug;

use crate::error::{Error, Result};
use crate::model::{
    common::{ElectionPhase, ElectionStatus, ScheduleWindow},
    db::{
        election::{Election, ElectionCore, ElectionUpdate},
        schedule::Schedule,
    },
    mongodb::Id,
};
use crate::store::Store;

/// The voting window in force: the schedule's when there is one, otherwise
/// the election's cached dates. `None` when the dates are missing or inverted.
pub fn effective_window(
    election: &ElectionCore,
    schedule: Option<&Schedule>,
) -> Option<ScheduleWindow> {
    match schedule {
        Some(schedule) => schedule.window(),
        None => election.cached_window(),
    }
}

/// The update that brings an auto-mode election in line with its schedule at
/// `now`, if it needs one.
///
/// Manual mode elections are left alone, as are elections whose window is
/// unknown or inverted: an ambiguous schedule never opens or closes voting.
pub fn reconcile(
    election: &ElectionCore,
    schedule: Option<&Schedule>,
    now: DateTime<Utc>,
) -> Option<ElectionUpdate> {
    if !election.auto_open_enabled {
        return None;
    }
    let window = effective_window(election, schedule)?;
    let within = window.contains(now);

    let mut update = ElectionUpdate::at(now);
    if let Some(schedule) = schedule {
        if election.start_date != Some(schedule.start_date) {
            update = update.start(Some(schedule.start_date));
        }
        if election.end_date != Some(schedule.end_date) {
            update = update.end(Some(schedule.end_date));
        }
    }
    if election.is_open != within {
        update = update.open(within);
    }
    (!update.is_empty()).then_some(update)
}

/// Reconcile an election against the given schedule and persist the result
/// if anything changed. Safe to call on every read.
pub async fn synchronize_with(
    store: &dyn Store,
    election: Election,
    schedule: Option<&Schedule>,
    now: DateTime<Utc>,
) -> Result<Election> {
    let Some(update) = reconcile(&election, schedule, now) else {
        return Ok(election);
    };
    debug!(
        "Reconciling election {} (open: {} -> {:?})",
        election.id, election.is_open, update.is_open
    );
    store
        .update_election(election.id, &update)
        .await?
        .ok_or_else(|| Error::not_found("Election"))
}

/// Reconcile an election against its stored schedule.
pub async fn synchronize(
    store: &dyn Store,
    election: Election,
    now: DateTime<Utc>,
) -> Result<Election> {
    if !election.auto_open_enabled {
        return Ok(election);
    }
    let schedule = store.schedule(election.id).await?;
    synchronize_with(store, election, schedule.as_ref(), now).await
}

/// An election after reconciliation, with everything needed to place it in
/// its lifecycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub election: Election,
    pub schedule: Option<Schedule>,
    pub status: ElectionStatus,
    pub phase: ElectionPhase,
}

impl Snapshot {
    /// Start and end dates, preferring the schedule.
    pub fn dates(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match &self.schedule {
            Some(schedule) => (Some(schedule.start_date), Some(schedule.end_date)),
            None => (self.election.start_date, self.election.end_date),
        }
    }
}

/// Load, reconcile and classify an election.
pub async fn snapshot(store: &dyn Store, election_id: Id, now: DateTime<Utc>) -> Result<Snapshot> {
    let election = store
        .election(election_id)
        .await?
        .ok_or_else(|| Error::not_found("Election"))?;
    let schedule = store.schedule(election_id).await?;
    let election = synchronize_with(store, election, schedule.as_ref(), now).await?;
    // Results that do not exist yet belong to an ongoing election.
    let status = store
        .results(election_id)
        .await?
        .map(|results| results.election_status)
        .unwrap_or_default();
    let phase = ElectionPhase::derive(
        election.is_open,
        effective_window(&election, schedule.as_ref()),
        schedule.is_some() || election.has_dates(),
        status,
        now,
    );
    Ok(Snapshot {
        election,
        schedule,
        status,
        phase,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::lifecycle::fixtures;
    use crate::store::MemoryStore;

    fn auto_election(now: DateTime<Utc>) -> Election {
        let mut election = Election::example(now - Duration::days(1));
        election.auto_open_enabled = true;
        election
    }

    #[test]
    fn manual_mode_is_authoritative() {
        let now = Utc::now();
        let mut election = Election::example(now);
        election.is_open = true;
        let schedule = Schedule::new(
            election.id,
            now + Duration::hours(1),
            now + Duration::hours(2),
            true,
            now,
        );
        assert_eq!(reconcile(&election, Some(&schedule), now), None);
    }

    #[test]
    fn open_flag_follows_window() {
        let now = Utc::now();
        let election = auto_election(now);
        let schedule = Schedule::new(
            election.id,
            now - Duration::minutes(30),
            now + Duration::minutes(30),
            true,
            now,
        );
        let update = reconcile(&election, Some(&schedule), now).unwrap();
        assert_eq!(update.is_open, Some(true));
        // Cached dates are repaired too.
        assert_eq!(update.start_date, Some(Some(schedule.start_date)));
        assert_eq!(update.end_date, Some(Some(schedule.end_date)));

        let after = schedule.end_date + Duration::milliseconds(1);
        let mut open = election.clone();
        update.apply(&mut open);
        assert_eq!(reconcile(&open, Some(&schedule), after).unwrap().is_open, Some(false));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let now = Utc::now();
        let mut election = auto_election(now);
        let schedule = Schedule::new(election.id, now, now + Duration::hours(1), true, now);
        election.start_date = Some(schedule.start_date);
        election.end_date = Some(schedule.end_date);
        election.is_open = true;
        assert_eq!(reconcile(&election, Some(&schedule), schedule.start_date), None);
        assert_eq!(reconcile(&election, Some(&schedule), schedule.end_date), None);
    }

    #[test]
    fn ambiguous_schedule_changes_nothing() {
        let now = Utc::now();
        let mut election = auto_election(now);
        election.is_open = true;
        // No schedule and no cached dates.
        assert_eq!(reconcile(&election, None, now), None);
        // Only one cached date.
        election.start_date = Some(now - Duration::hours(1));
        assert_eq!(reconcile(&election, None, now), None);
        // Inverted schedule.
        let inverted = Schedule::new(
            election.id,
            now + Duration::hours(1),
            now - Duration::hours(1),
            true,
            now,
        );
        assert_eq!(reconcile(&election, Some(&inverted), now), None);
    }

    #[test]
    fn cached_dates_used_without_schedule() {
        let now = Utc::now();
        let mut election = auto_election(now);
        election.start_date = Some(now - Duration::hours(2));
        election.end_date = Some(now - Duration::hours(1));
        election.is_open = true;
        let update = reconcile(&election, None, now).unwrap();
        assert_eq!(update.is_open, Some(false));
        assert_eq!(update.start_date, None);
    }

    #[rocket::async_test]
    async fn synchronize_is_idempotent() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let id = fixtures::election(&store, now).await;
        fixtures::schedule(&store, id, now, -30, 30, true).await;
        let update = ElectionUpdate::at(now).auto(true);
        let election = store.update_election(id, &update).await.unwrap().unwrap();

        let first = synchronize(&store, election, now).await.unwrap();
        assert!(first.is_open);
        let later = now + Duration::seconds(1);
        let second = synchronize(&store, first.clone(), later).await.unwrap();
        // Nothing to do, so not even the modification time moves.
        assert_eq!(second, first);
        assert_eq!(store.election(id).await.unwrap().unwrap(), first);
    }

    #[rocket::async_test]
    async fn snapshot_phases() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let id = fixtures::election(&store, now).await;

        assert_eq!(snapshot(&store, id, now).await.unwrap().phase, ElectionPhase::NotScheduled);

        fixtures::schedule(&store, id, now, 10, 70, true).await;
        store.update_election(id, &ElectionUpdate::at(now).auto(true)).await.unwrap();
        let scheduled = snapshot(&store, id, now).await.unwrap();
        assert_eq!(scheduled.phase, ElectionPhase::Scheduled);
        assert_eq!(scheduled.status, ElectionStatus::Ongoing);

        let during = snapshot(&store, id, now + Duration::minutes(30)).await.unwrap();
        assert_eq!(during.phase, ElectionPhase::Open);
        assert!(during.election.is_open);

        let after = snapshot(&store, id, now + Duration::minutes(80)).await.unwrap();
        assert_eq!(after.phase, ElectionPhase::Closed);
        assert!(!after.election.is_open);
    }

    #[rocket::async_test]
    async fn snapshot_of_missing_election() {
        let store = MemoryStore::new();
        let err = snapshot(&store, Id::new(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
