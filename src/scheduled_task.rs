use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use rocket::tokio::{
    self,
    sync::Notify,
    task::{JoinError, JoinHandle},
    time::Duration,
};

/// A task that runs at a point in the future, unless cancelled first. It can
/// also be triggered early.
pub struct ScheduledTask<T> {
    handle: JoinHandle<T>,
    trigger: Arc<Notify>,
    run_at: DateTime<Utc>,
}

impl<T> ScheduledTask<T>
where
    T: Send + 'static,
{
    /// Schedule `task` to run at `run_at`; immediately if that has passed.
    pub fn new<Fut>(task: Fut, run_at: DateTime<Utc>) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let early = trigger.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(until(run_at)) => {}
                _ = early.notified() => {}
            }
            task.await
        });
        Self {
            handle,
            trigger,
            run_at,
        }
    }

    /// When the task is due.
    pub fn run_at(&self) -> DateTime<Utc> {
        self.run_at
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the task. Returns true iff it had already completed.
    pub async fn cancel(self) -> bool {
        self.handle.abort();
        self.handle.await.is_ok()
    }

    /// Run the task now instead of waiting.
    pub fn trigger_now(&self) {
        self.trigger.notify_one();
    }
}

impl<T> Future for ScheduledTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

/// Time left until `datetime`; zero if it has passed.
fn until(datetime: DateTime<Utc>) -> Duration {
    (datetime - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Duration as ChronoDuration;

    use super::*;

    fn flag() -> (Arc<AtomicBool>, impl Future<Output = ()> + Send + 'static) {
        let flag = Arc::new(AtomicBool::new(false));
        let set = flag.clone();
        (flag, async move { set.store(true, Ordering::SeqCst) })
    }

    #[rocket::async_test]
    async fn runs_when_due() {
        let (ran, task) = flag();
        let task = ScheduledTask::new(task, Utc::now() + ChronoDuration::milliseconds(50));
        assert!(!ran.load(Ordering::SeqCst));
        task.await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[rocket::async_test]
    async fn past_time_runs_immediately() {
        let task = ScheduledTask::new(async { 7 }, Utc::now() - ChronoDuration::hours(1));
        assert_eq!(task.await.unwrap(), 7);
    }

    #[rocket::async_test]
    async fn cancel_prevents_running() {
        let (ran, task) = flag();
        let task = ScheduledTask::new(task, Utc::now() + ChronoDuration::milliseconds(50));
        assert!(!task.cancel().await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[rocket::async_test]
    async fn trigger_early() {
        let (ran, task) = flag();
        let task = ScheduledTask::new(task, Utc::now() + ChronoDuration::days(1));
        task.trigger_now();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
