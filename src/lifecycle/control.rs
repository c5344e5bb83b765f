//! Administrator controls over an election's open state and schedule.

use chrono::{DateTime, Utc};
use log::info;

use crate::error::{Error, Result};
use crate::model::{
    common::ScheduleWindow,
    db::{
        election::{Election, ElectionUpdate},
        results::{Results, ResultsCore, VotingStatistics},
        schedule::Schedule,
    },
    mongodb::Id,
};
use crate::store::Store;

use super::{
    flat_counts,
    sync::{synchronize, synchronize_with},
};

/// Open or close voting by hand, or switch auto mode.
///
/// Setting `is_open` without `auto_open_enabled` turns auto mode off, so the
/// schedule does not immediately undo the change.
pub async fn set_status(
    store: &dyn Store,
    election_id: Id,
    is_open: Option<bool>,
    auto_open_enabled: Option<bool>,
    now: DateTime<Utc>,
) -> Result<Election> {
    if is_open.is_none() && auto_open_enabled.is_none() {
        return Err(Error::validation(
            "isOpen (boolean) or autoOpenEnabled (boolean) is required",
        ));
    }
    let mut update = ElectionUpdate::at(now);
    if let Some(open) = is_open {
        update = update.open(open).auto(false);
    }
    if let Some(auto) = auto_open_enabled {
        update = update.auto(auto);
    }
    let election = store
        .update_election(election_id, &update)
        .await?
        .ok_or_else(|| Error::not_found("Election"))?;
    info!(
        "Election {election_id} status set (open: {:?}, auto: {:?})",
        is_open, auto_open_enabled
    );
    synchronize(store, election, now).await
}

/// Set the voting window. The election's cached dates and the schedule are
/// both written, and results are seeded so the public pages have something
/// to show before the first ballot.
pub async fn set_schedule(
    store: &dyn Store,
    election_id: Id,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    auto_open_enabled: bool,
    fallback_flats: u32,
    now: DateTime<Utc>,
) -> Result<(Election, Schedule)> {
    let window = ScheduleWindow::new(Some(start), Some(end))
        .filter(|w| w.start < w.end)
        .ok_or_else(|| Error::validation("startDate must be before endDate"))?;

    let update = ElectionUpdate::at(now)
        .start(Some(start))
        .end(Some(end))
        .auto(auto_open_enabled)
        .open(auto_open_enabled && window.contains(now));
    let election = store
        .update_election(election_id, &update)
        .await?
        .ok_or_else(|| Error::not_found("Election"))?;

    let schedule = Schedule::new(election_id, start, end, auto_open_enabled, now);
    let schedule = store.upsert_schedule(&schedule).await?;

    let (voters, flats) = flat_counts(store, fallback_flats).await?;
    store.ensure_results(election_id, voters, flats, now).await?;

    info!("Election {election_id} scheduled from {start} to {end} (auto: {auto_open_enabled})");
    let election = synchronize_with(store, election, Some(&schedule), now).await?;
    Ok((election, schedule))
}

/// Wipe an election back to a closed, manual, empty state: schedule, votes,
/// attendance, candidates and results are deleted and empty results seeded.
/// New cached dates may be supplied for the next run.
pub async fn reset(
    store: &dyn Store,
    election_id: Id,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    fallback_flats: u32,
    now: DateTime<Utc>,
) -> Result<Election> {
    if store.election(election_id).await?.is_none() {
        return Err(Error::not_found("Election"));
    }
    store.delete_schedule(election_id).await?;
    store.delete_election_data(election_id).await?;

    let mut update = ElectionUpdate::at(now).open(false).auto(false);
    if start.is_some() {
        update = update.start(start);
    }
    if end.is_some() {
        update = update.end(end);
    }
    let election = store
        .update_election(election_id, &update)
        .await?
        .ok_or_else(|| Error::not_found("Election"))?;

    let (voters, flats) = flat_counts(store, fallback_flats).await?;
    let statistics = VotingStatistics {
        total_voters: voters,
        total_flats: flats,
        ..VotingStatistics::default()
    };
    let results = Results {
        id: Id::new(),
        results: ResultsCore::fresh(election_id, statistics, now),
    };
    store.replace_results(&results).await?;
    info!("Election {election_id} reset");
    Ok(election)
}
