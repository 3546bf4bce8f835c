use chrono::{DateTime, Utc};
use tokio::{task::JoinHandle, time::Instant};

/// Runs `task` at `scheduled_for`; a time already in the past runs it right away.
pub fn schedule_new_task<Fut>(task: Fut, scheduled_for: DateTime<Utc>) -> JoinHandle<()>
where
    Fut: Future<Output = ()> + Send + 'static,
{
    let time_diff = (scheduled_for - Utc::now()).to_std().unwrap_or_default();
    let deadline = Instant::now() + time_diff;
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        task.await;
    })
}
