pub mod http;
pub mod mock;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What the remote processor knows how to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    CoverLetter,
    JobMatch,
    InterviewQuestions,
}

impl ContentKind {
    /// Parameters that must be present (and non-blank) before a task
    /// of this kind is accepted for submission.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            ContentKind::CoverLetter | ContentKind::JobMatch => {
                &["resume", "job_description"]
            }
            ContentKind::InterviewQuestions => &["job_description"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::CoverLetter => "cover_letter",
            ContentKind::JobMatch => "job_match",
            ContentKind::InterviewQuestions => "interview_questions",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cover_letter" => Ok(ContentKind::CoverLetter),
            "job_match" => Ok(ContentKind::JobMatch),
            "interview_questions" => Ok(ContentKind::InterviewQuestions),
            other => Err(Error::InvalidArgument(format!(
                "unknown content kind: {other}"
            ))),
        }
    }
}

/// Where a task is in its lifecycle.
/// `Completed` and `Failed` are terminal and absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Position in the lifecycle. Observations of one task may never
    /// move backwards through these ranks.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single remote generation job, as last observed.
///
/// Tasks are created by the gateway and advanced only by the remote
/// processor; this side only ever reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: ContentKind,
    pub status: TaskStatus,
    /// Present only when `status` is `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Present only when `status` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the processor says when asked to stop a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelAck {
    /// The task was still running; it will settle into the
    /// cancellation-marked failed state.
    Requested,
    /// The task had already finished. The caller lost a race, not
    /// an argument.
    AlreadyTerminal,
}

/// The remote generation service. Opaque on purpose: submit work,
/// observe status, ask it to stop. How the writing happens is not
/// this crate's business.
#[async_trait]
pub trait RemoteProcessor: Send + Sync {
    async fn create_task(
        &self,
        kind: ContentKind,
        params: &HashMap<String, String>,
    ) -> Result<Task>;

    async fn get_task(&self, id: &str) -> Result<Task>;

    async fn request_cancel(&self, id: &str) -> Result<CancelAck>;
}
