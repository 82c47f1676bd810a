//! One error type for the whole crate.
//!
//! Callers are expected to branch on the variant: a [`Error::TaskFailed`]
//! means the inputs were bad for the processor, a [`Error::PollingTimeout`]
//! means the outcome is simply unknown, and the two must not be handled
//! the same way.

use thiserror::Error;

use crate::consts::CANCELLED_MESSAGE;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad input, caught before anything goes over the wire. Never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The processor could not be reached, or rejected the call outright.
    #[error("cannot reach processor: {0}")]
    Transport(String),

    /// The processor reported a terminal failure for the task.
    #[error("generation failed: {message}")]
    TaskFailed { message: String },

    /// The attempt budget ran out with the task still in flight.
    /// The task's true outcome is unknown, not failed.
    #[error("no terminal state after {attempts} status checks")]
    PollingTimeout { attempts: u32 },

    /// History lookup or mutation on an item that does not exist, or
    /// that belongs to someone else (which looks the same on purpose).
    #[error("history item {0} not found")]
    NotFound(i64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A collaborator broke its contract: a status moved backwards,
    /// a timestamp regressed, or a payload failed to decode.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    /// True when this is the terminal state of a cancelled task, as
    /// opposed to a genuine generation failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::TaskFailed { message } if message == CANCELLED_MESSAGE)
    }
}
