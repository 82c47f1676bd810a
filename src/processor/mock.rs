use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::consts::CANCELLED_MESSAGE;
use crate::error::{Error, Result};

use super::{CancelAck, ContentKind, RemoteProcessor, Task, TaskStatus};

/// One scripted status observation.
#[derive(Debug, Clone)]
pub enum MockObservation {
    Pending,
    Processing,
    Completed(serde_json::Value),
    Failed(String),
    /// The status query itself fails (network down, service gone).
    Transport(String),
}

impl MockObservation {
    fn is_terminal(&self) -> bool {
        matches!(self, MockObservation::Completed(_) | MockObservation::Failed(_))
    }
}

struct MockTask {
    kind: ContentKind,
    observations: Vec<MockObservation>,
    cursor: usize,
    cancelled: bool,
    created_at: DateTime<Utc>,
    polls: usize,
}

impl MockTask {
    /// Whether the task has already shown the caller a terminal state.
    fn settled(&self) -> bool {
        if self.cancelled {
            return true;
        }
        self.cursor > 0
            && self
                .observations
                .get(self.cursor - 1)
                .is_some_and(MockObservation::is_terminal)
    }
}

struct Inner {
    scripts: VecDeque<Vec<MockObservation>>,
    tasks: HashMap<String, MockTask>,
    next_id: usize,
    created: usize,
    fail_next_create: Option<String>,
}

/// A scripted processor for tests. Plays back pre-defined observation
/// sequences in order, one per status query, and clamps on the last one
/// so terminal states stay absorbing no matter how often they are read.
pub struct MockProcessor {
    inner: Mutex<Inner>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                scripts: VecDeque::new(),
                tasks: HashMap::new(),
                next_id: 0,
                created: 0,
                fail_next_create: None,
            }),
        }
    }

    /// Build a processor whose next submission plays this script.
    pub fn scripted(observations: Vec<MockObservation>) -> Self {
        let processor = Self::new();
        processor.enqueue_script(observations);
        processor
    }

    /// Queue an observation script for the next `create_task` call.
    /// Submissions beyond the queued scripts complete immediately.
    pub fn enqueue_script(&self, observations: Vec<MockObservation>) {
        self.inner.lock().unwrap().scripts.push_back(observations);
    }

    /// Make the next `create_task` fail at the transport level.
    pub fn fail_next_create(&self, message: impl Into<String>) {
        self.inner.lock().unwrap().fail_next_create = Some(message.into());
    }

    /// How many status queries a task has answered (transport failures
    /// included). Lets tests pin down exact observation counts.
    pub fn poll_count(&self, id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .get(id)
            .map_or(0, |t| t.polls)
    }

    /// How many tasks were actually submitted.
    pub fn created_count(&self) -> usize {
        self.inner.lock().unwrap().created
    }

    fn default_script() -> Vec<MockObservation> {
        vec![MockObservation::Completed(serde_json::json!({ "text": "done" }))]
    }

    fn snapshot(
        id: &str,
        kind: ContentKind,
        created_at: DateTime<Utc>,
        observation: &MockObservation,
    ) -> Task {
        let (status, result, error_message) = match observation {
            MockObservation::Pending => (TaskStatus::Pending, None, None),
            MockObservation::Processing => (TaskStatus::Processing, None, None),
            MockObservation::Completed(payload) => {
                (TaskStatus::Completed, Some(payload.clone()), None)
            }
            MockObservation::Failed(message) => {
                (TaskStatus::Failed, None, Some(message.clone()))
            }
            MockObservation::Transport(_) => unreachable!("handled before snapshot"),
        };
        Task {
            id: id.to_string(),
            kind,
            status,
            result,
            error_message,
            created_at,
            updated_at: Utc::now(),
        }
    }
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteProcessor for MockProcessor {
    async fn create_task(
        &self,
        kind: ContentKind,
        _params: &HashMap<String, String>,
    ) -> Result<Task> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(message) = inner.fail_next_create.take() {
            return Err(Error::Transport(message));
        }

        let observations = inner
            .scripts
            .pop_front()
            .unwrap_or_else(Self::default_script);

        inner.next_id += 1;
        inner.created += 1;
        let id = format!("task-{}", inner.next_id);
        let now = Utc::now();

        inner.tasks.insert(
            id.clone(),
            MockTask {
                kind,
                observations,
                cursor: 0,
                cancelled: false,
                created_at: now,
                polls: 0,
            },
        );

        Ok(Task {
            id,
            kind,
            status: TaskStatus::Pending,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_task(&self, id: &str) -> Result<Task> {
        let mut inner = self.inner.lock().unwrap();
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| Error::Transport(format!("unknown task: {id}")))?;

        task.polls += 1;

        if task.cancelled {
            return Ok(Task {
                id: id.to_string(),
                kind: task.kind,
                status: TaskStatus::Failed,
                result: None,
                error_message: Some(CANCELLED_MESSAGE.to_string()),
                created_at: task.created_at,
                updated_at: Utc::now(),
            });
        }

        // Advance through the script, clamping on the final observation.
        let index = task.cursor.min(task.observations.len().saturating_sub(1));
        task.cursor = (task.cursor + 1).min(task.observations.len());

        let observation = task.observations[index].clone();
        if let MockObservation::Transport(message) = observation {
            return Err(Error::Transport(message));
        }

        Ok(Self::snapshot(id, task.kind, task.created_at, &observation))
    }

    async fn request_cancel(&self, id: &str) -> Result<CancelAck> {
        let mut inner = self.inner.lock().unwrap();
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| Error::Transport(format!("unknown task: {id}")))?;

        if task.settled() {
            return Ok(CancelAck::AlreadyTerminal);
        }
        task.cancelled = true;
        Ok(CancelAck::Requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_plays_in_order_and_clamps_on_terminal() {
        let processor = MockProcessor::scripted(vec![
            MockObservation::Processing,
            MockObservation::Completed(serde_json::json!({"text": "hi"})),
        ]);
        let task = processor
            .create_task(ContentKind::CoverLetter, &HashMap::new())
            .await
            .unwrap();

        assert_eq!(task.status, TaskStatus::Pending);

        let first = processor.get_task(&task.id).await.unwrap();
        assert_eq!(first.status, TaskStatus::Processing);

        let second = processor.get_task(&task.id).await.unwrap();
        assert_eq!(second.status, TaskStatus::Completed);

        // Terminal is absorbing: further reads keep answering completed.
        let third = processor.get_task(&task.id).await.unwrap();
        assert_eq!(third.status, TaskStatus::Completed);
        assert_eq!(processor.poll_count(&task.id), 3);
    }

    #[tokio::test]
    async fn cancel_turns_subsequent_reads_into_marked_failure() {
        let processor = MockProcessor::scripted(vec![
            MockObservation::Processing,
            MockObservation::Processing,
        ]);
        let task = processor
            .create_task(ContentKind::JobMatch, &HashMap::new())
            .await
            .unwrap();

        processor.get_task(&task.id).await.unwrap();
        let ack = processor.request_cancel(&task.id).await.unwrap();
        assert_eq!(ack, CancelAck::Requested);

        let observed = processor.get_task(&task.id).await.unwrap();
        assert_eq!(observed.status, TaskStatus::Failed);
        assert_eq!(observed.error_message.as_deref(), Some(CANCELLED_MESSAGE));
    }

    #[tokio::test]
    async fn cancel_after_terminal_reports_already_terminal() {
        let processor = MockProcessor::scripted(vec![MockObservation::Completed(
            serde_json::json!({"text": "fin"}),
        )]);
        let task = processor
            .create_task(ContentKind::CoverLetter, &HashMap::new())
            .await
            .unwrap();

        processor.get_task(&task.id).await.unwrap();
        let ack = processor.request_cancel(&task.id).await.unwrap();
        assert_eq!(ack, CancelAck::AlreadyTerminal);
    }

    #[tokio::test]
    async fn transport_observation_fails_the_query_then_moves_on() {
        let processor = MockProcessor::scripted(vec![
            MockObservation::Transport("connection refused".to_string()),
            MockObservation::Completed(serde_json::json!({"text": "ok"})),
        ]);
        let task = processor
            .create_task(ContentKind::CoverLetter, &HashMap::new())
            .await
            .unwrap();

        let err = processor.get_task(&task.id).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        let observed = processor.get_task(&task.id).await.unwrap();
        assert_eq!(observed.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn updated_at_never_decreases_across_reads() {
        let processor = MockProcessor::scripted(vec![
            MockObservation::Pending,
            MockObservation::Processing,
            MockObservation::Completed(serde_json::json!({})),
        ]);
        let task = processor
            .create_task(ContentKind::InterviewQuestions, &HashMap::new())
            .await
            .unwrap();

        let mut last = task.updated_at;
        for _ in 0..3 {
            let observed = processor.get_task(&task.id).await.unwrap();
            assert!(observed.updated_at >= last);
            last = observed.updated_at;
        }
    }
}
