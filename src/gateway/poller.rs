use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::consts::{DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL};
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::processor::{RemoteProcessor, Task, TaskStatus};

/// How a poll session paces itself.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Pause between two status observations.
    pub interval: Duration,
    /// Hard ceiling on observations. The session never outlives it.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Side-channel observer handed every status snapshot in order.
/// Purely informational: nothing it does changes the loop.
pub type ProgressHook = Box<dyn Fn(&Task) + Send + Sync>;

/// Drives a submitted task to a terminal state by querying its status
/// at a fixed cadence, one query at a time, strictly in order.
///
/// Each [`Poller::poll`] call is its own session with a fresh attempt
/// budget. Exits on completed, failed (which covers cancellation),
/// attempts exhausted, or transport failure.
pub struct Poller {
    processor: Arc<dyn RemoteProcessor>,
    events: Arc<EventBus>,
    config: PollConfig,
}

impl Poller {
    pub fn new(
        processor: Arc<dyn RemoteProcessor>,
        events: Arc<EventBus>,
        config: PollConfig,
    ) -> Self {
        Self {
            processor,
            events,
            config,
        }
    }

    pub async fn poll(
        &self,
        task_id: &str,
        on_progress: Option<&ProgressHook>,
    ) -> Result<Task> {
        // Subscribe before the first observation so a cancel issued
        // mid-session is never missed.
        let mut cancel_rx = self.events.subscribe();
        let mut last: Option<(u8, chrono::DateTime<chrono::Utc>)> = None;

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                self.wait_for_next(task_id, &mut cancel_rx).await;
            }

            // Transport failures abort the session immediately; the
            // caller decides whether a fresh session is worth it.
            let task = self.processor.get_task(task_id).await?;
            debug!(id = %task.id, status = %task.status, attempt, "observed task status");

            if let Some((rank, updated_at)) = last
                && (task.status.rank() < rank || task.updated_at < updated_at)
            {
                warn!(id = %task.id, status = %task.status, "task moved backwards");
                return Err(Error::Protocol(format!(
                    "task {} regressed to {} — refusing to keep polling",
                    task.id, task.status
                )));
            }
            last = Some((task.status.rank(), task.updated_at));

            if let Some(hook) = on_progress {
                hook(&task);
            }

            match task.status {
                TaskStatus::Completed => return Ok(task),
                TaskStatus::Failed => {
                    let message = task
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "unspecified failure".to_string());
                    return Err(Error::TaskFailed { message });
                }
                TaskStatus::Pending | TaskStatus::Processing => {}
            }
        }

        Err(Error::PollingTimeout {
            attempts: self.config.max_attempts,
        })
    }

    /// Sleep out the polling interval, waking early if a cancellation
    /// for this task comes over the event bus. Early wake-up only
    /// shortens the wait — the cancelled state is still observed
    /// through a regular status query.
    async fn wait_for_next(&self, task_id: &str, rx: &mut broadcast::Receiver<Event>) {
        let sleep = tokio::time::sleep(self.config.interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return,
                event = rx.recv() => match event {
                    Ok(Event::CancelRequested { task_id: cancelled }) if cancelled == task_id => {
                        return;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        (&mut sleep).await;
                        return;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_millis(2000));
        assert_eq!(config.max_attempts, 30);
    }
}
