pub mod poller;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::history::{HistoryFilter, HistoryItem, HistoryStore, Page};
use crate::processor::{CancelAck, ContentKind, RemoteProcessor, Task};

use poller::{PollConfig, Poller, ProgressHook};

/// Whether `submit` blocks for the finished artifact or returns a
/// handle for later polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Sync,
    Async,
}

/// Gateway-wide defaults, passed in explicitly at construction.
/// Nothing in the gateway is read from ambient state.
#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    pub mode: Mode,
    pub save_to_history: bool,
    pub poll: PollConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Sync,
            save_to_history: true,
            poll: PollConfig::default(),
        }
    }
}

/// Per-submission overrides. Anything left unset falls back to the
/// gateway's [`GatewayConfig`].
#[derive(Default)]
pub struct SubmitOptions {
    pub mode: Option<Mode>,
    pub save_to_history: Option<bool>,
    pub on_progress: Option<ProgressHook>,
}

/// What a submission produced.
#[derive(Debug)]
pub enum Submission {
    /// Sync mode: the task ran to completion, result included.
    Finished(Task),
    /// Async mode: a pending handle. Poll it to completion.
    Accepted(Task),
}

impl Submission {
    pub fn task(&self) -> &Task {
        match self {
            Submission::Finished(task) | Submission::Accepted(task) => task,
        }
    }
}

/// What a cancellation request achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The processor accepted the request; in-flight pollers will
    /// observe the cancellation on their next check.
    Requested,
    /// The task had already reached a terminal state. Not an error;
    /// the caller may simply have lost a race against completion.
    AlreadyFinished,
}

/// The front door: validates, submits, polls, cancels, and retains.
///
/// Wires a [`RemoteProcessor`], a [`HistoryStore`], and the event bus
/// together behind the caller-facing contract. One gateway serves one
/// account.
pub struct Gateway {
    processor: Arc<dyn RemoteProcessor>,
    history: Arc<dyn HistoryStore>,
    events: Arc<EventBus>,
    account: String,
    config: GatewayConfig,
    /// Async submissions that opted into history, waiting for their
    /// first successful poll. Consumed exactly once, under the lock.
    pending_saves: Mutex<HashSet<String>>,
}

impl Gateway {
    pub fn new(
        processor: Arc<dyn RemoteProcessor>,
        history: Arc<dyn HistoryStore>,
        account: impl Into<String>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            processor,
            history,
            events: Arc::new(EventBus::default()),
            account: account.into(),
            config,
            pending_saves: Mutex::new(HashSet::new()),
        }
    }

    /// Submit a generation job.
    ///
    /// Sync mode blocks until the processor finishes and never exposes
    /// a pending state; async mode returns the pending handle at once.
    /// Malformed parameters fail here, before anything goes over the
    /// wire.
    pub async fn submit(
        &self,
        kind: ContentKind,
        params: HashMap<String, String>,
        options: SubmitOptions,
    ) -> Result<Submission> {
        validate(kind, &params)?;

        let mode = options.mode.unwrap_or(self.config.mode);
        let save = options.save_to_history.unwrap_or(self.config.save_to_history);

        let task = self.processor.create_task(kind, &params).await?;
        info!(id = %task.id, %kind, ?mode, "task submitted");

        match mode {
            Mode::Async => {
                if save {
                    self.pending_saves.lock().unwrap().insert(task.id.clone());
                }
                Ok(Submission::Accepted(task))
            }
            Mode::Sync => {
                let finished = self
                    .poller(self.config.poll)
                    .poll(&task.id, options.on_progress.as_ref())
                    .await?;
                if save {
                    self.retain(&finished).await?;
                }
                Ok(Submission::Finished(finished))
            }
        }
    }

    /// Drive a task handle to a terminal state with the gateway's
    /// default pacing. If the task was submitted async with history
    /// retention on, the first successful poll retains it, exactly
    /// once, however many times polling is repeated or raced.
    pub async fn poll(
        &self,
        task_id: &str,
        on_progress: Option<&ProgressHook>,
    ) -> Result<Task> {
        self.poll_with(task_id, self.config.poll, on_progress).await
    }

    /// Same as [`Gateway::poll`], with per-call pacing.
    pub async fn poll_with(
        &self,
        task_id: &str,
        config: PollConfig,
        on_progress: Option<&ProgressHook>,
    ) -> Result<Task> {
        let task = self.poller(config).poll(task_id, on_progress).await?;

        // The marker is consumed before the insert, so a repeated or
        // concurrent poll of the same id can never retain twice.
        let wants_save = self.pending_saves.lock().unwrap().remove(task_id);
        if wants_save {
            self.retain(&task).await?;
        }
        Ok(task)
    }

    /// Ask the processor to stop a task early.
    ///
    /// Valid only while the task is non-terminal; cancelling a finished
    /// task reports [`CancelOutcome::AlreadyFinished`] so callers can
    /// tell a race from a logic error.
    pub async fn cancel(&self, task_id: &str) -> Result<CancelOutcome> {
        match self.processor.request_cancel(task_id).await? {
            CancelAck::Requested => {
                info!(%task_id, "cancellation requested");
                self.events.emit(Event::CancelRequested {
                    task_id: task_id.to_string(),
                });
                Ok(CancelOutcome::Requested)
            }
            CancelAck::AlreadyTerminal => {
                debug!(%task_id, "cancel raced a terminal state");
                Ok(CancelOutcome::AlreadyFinished)
            }
        }
    }

    // --- History, scoped to this gateway's account ---

    pub async fn history_list(&self, filter: HistoryFilter) -> Result<Page> {
        self.history.list(&self.account, filter).await
    }

    pub async fn history_get(&self, id: i64) -> Result<HistoryItem> {
        self.history.get(&self.account, id).await
    }

    pub async fn toggle_favorite(&self, id: i64) -> Result<HistoryItem> {
        self.history.toggle_favorite(&self.account, id).await
    }

    pub async fn rate(&self, id: i64, rating: u8) -> Result<HistoryItem> {
        self.history.rate(&self.account, id, rating).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.history.delete(&self.account, id).await
    }

    pub async fn list_favorites(&self) -> Result<Page> {
        self.history.list_favorites(&self.account).await
    }

    /// Derive a history item from a completed task. Submission paths
    /// call this automatically; it is public for callers who polled a
    /// task some other process submitted.
    pub async fn retain(&self, task: &Task) -> Result<HistoryItem> {
        let payload = task.result.clone().ok_or_else(|| {
            Error::Protocol(format!("completed task {} carries no result", task.id))
        })?;
        let item = self.history.insert(&self.account, task.kind, payload).await?;
        debug!(task = %task.id, item = item.id, "artifact retained to history");
        Ok(item)
    }

    fn poller(&self, config: PollConfig) -> Poller {
        Poller::new(Arc::clone(&self.processor), Arc::clone(&self.events), config)
    }
}

/// Reject malformed parameters before any remote call is attempted.
fn validate(kind: ContentKind, params: &HashMap<String, String>) -> Result<()> {
    let missing: Vec<&str> = kind
        .required_params()
        .iter()
        .filter(|field| {
            params
                .get(**field)
                .is_none_or(|value| value.trim().is_empty())
        })
        .copied()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{kind} is missing required parameters: {}",
            missing.join(", ")
        )))
    }
}
