use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, trace, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::future::{BoxFuture, FutureExt},
    tokio::sync::Mutex,
    Build, Rocket,
};

use crate::error::Result;
use crate::model::{db::schedule::Schedule, mongodb::Id};
use crate::scheduled_task::ScheduledTask;
use crate::store::{DynStore, Store};

use super::sync::synchronize_with;

/// Map from election IDs to watcher tasks.
type TaskMap = HashMap<Id, ScheduledTask<()>>;

/// Seconds to wait before retrying a watcher that failed.
const RETRY_INTERVAL_SECONDS: i64 = 60;

/// The next moment the open flag of an auto-mode election changes: the
/// start of the window, or just after its end. `None` once it has ended.
pub fn next_boundary(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let window = schedule.window()?;
    if now < window.start {
        Some(window.start)
    } else if now <= window.end {
        Some(window.end + Duration::seconds(1))
    } else {
        None
    }
}

/// Background tasks that reconcile auto-mode elections at their schedule
/// boundaries, so the stored open flag flips even when nobody reads it.
/// One task per election.
pub struct ScheduleWatchers {
    store: DynStore,
    tasks: Arc<Mutex<TaskMap>>,
}

impl ScheduleWatchers {
    pub fn new(store: DynStore) -> Self {
        Self {
            store,
            tasks: Default::default(),
        }
    }

    /// Is a watcher scheduled for the given election?
    pub async fn is_watching(&self, election_id: Id) -> bool {
        self.tasks.lock().await.contains_key(&election_id)
    }

    /// When the election's watcher next runs, if it has one.
    pub async fn next_run(&self, election_id: Id) -> Option<DateTime<Utc>> {
        self.tasks
            .lock()
            .await
            .get(&election_id)
            .map(ScheduledTask::run_at)
    }

    /// Watch every stored auto-mode schedule.
    pub async fn watch_all(&self) -> Result<()> {
        for schedule in self.store.schedules().await? {
            self.watch(&schedule).await;
        }
        Ok(())
    }

    /// Start watching the schedule, replacing any existing watcher for its
    /// election. Manual-mode and finished schedules are not watched.
    pub async fn watch(&self, schedule: &Schedule) {
        let election_id = schedule.election_id;
        let next = schedule
            .auto_open_enabled
            .then(|| next_boundary(schedule, Utc::now()))
            .flatten();

        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.remove(&election_id) {
            if task.cancel().await {
                // A finished task removes or replaces itself before returning.
                warn!("Watcher for election {election_id} had finished but was still listed");
            }
        }
        if let Some(run_at) = next {
            let watcher = Self::watcher(election_id, self.store.clone(), self.tasks.clone());
            tasks.insert(election_id, ScheduledTask::new(watcher, run_at));
            debug!("Watching election {election_id}, next check at {run_at}");
        }
    }

    /// Stop watching an election.
    pub async fn cancel(&self, election_id: Id) {
        let task = self.tasks.lock().await.remove(&election_id);
        if let Some(task) = task {
            task.cancel().await;
            debug!("Stopped watching election {election_id}");
        }
    }

    /// Reconcile the election, then reschedule for the next boundary or
    /// retire. A recursive async function, hence the `BoxFuture`.
    fn watcher(
        election_id: Id,
        store: DynStore,
        tasks: Arc<Mutex<TaskMap>>,
    ) -> BoxFuture<'static, ()> {
        async fn check(store: &dyn Store, election_id: Id) -> Result<Option<DateTime<Utc>>> {
            let now = Utc::now();
            let Some(election) = store.election(election_id).await? else {
                return Ok(None);
            };
            let Some(schedule) = store.schedule(election_id).await? else {
                return Ok(None);
            };
            if !election.auto_open_enabled || !schedule.auto_open_enabled {
                return Ok(None);
            }
            let election = synchronize_with(store, election, Some(&schedule), now).await?;
            info!(
                "Election {election_id} is {} on schedule",
                if election.is_open { "open" } else { "closed" }
            );
            Ok(next_boundary(&schedule, now))
        }

        async move {
            let next = match check(store.as_ref(), election_id).await {
                Ok(next) => next,
                Err(e) => {
                    error!("Watcher for election {election_id} failed: {e}");
                    warn!("Retrying in {RETRY_INTERVAL_SECONDS} seconds");
                    Some(Utc::now() + Duration::seconds(RETRY_INTERVAL_SECONDS))
                }
            };
            let mut tasks_locked = tasks.lock().await;
            match next {
                Some(run_at) => {
                    let watcher = Self::watcher(election_id, store, tasks.clone());
                    tasks_locked.insert(election_id, ScheduledTask::new(watcher, run_at));
                    trace!("Watcher for election {election_id} rescheduled for {run_at}");
                }
                None => {
                    tasks_locked.remove(&election_id);
                    trace!("Watcher for election {election_id} retired");
                }
            }
        }
        .boxed()
    }
}

/// A fairing that starts a watcher for every auto-mode schedule during
/// ignition and places [`ScheduleWatchers`] into managed state. Must be
/// attached after the store is available.
pub struct ScheduleWatcherFairing;

#[rocket::async_trait]
impl Fairing for ScheduleWatcherFairing {
    fn info(&self) -> Info {
        Info {
            name: "Schedule Watchers",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let store = match rocket.state::<DynStore>() {
            Some(store) => store.clone(),
            None => {
                error!("Store was not available when scheduling watchers");
                return Err(rocket);
            }
        };
        info!("Scheduling election watchers...");
        let watchers = ScheduleWatchers::new(store);
        if let Err(e) = watchers.watch_all().await {
            error!("Failed to schedule election watchers: {e}");
            return Err(rocket);
        }
        info!("...election watchers scheduled!");
        Ok(rocket.manage(watchers))
    }
}
