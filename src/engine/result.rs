//! Outcome of an engine operation.

use std::fmt;
use std::time::Duration;

use crate::error::TransactionError;

/// Final classification of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Completed and committed
    Ok,
    /// A business rule refused the operation; the card was not touched
    Aborted,
    /// The card, SAM or a record codec failed
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Aborted => "aborted",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status, optional payload, human message and wall time of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionResult<T> {
    pub status: Status,
    pub payload: Option<T>,
    pub message: String,
    pub elapsed: Duration,
}

impl<T> TransactionResult<T> {
    pub fn ok(payload: T, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status: Status::Ok,
            payload: Some(payload),
            message: message.into(),
            elapsed,
        }
    }

    /// Classify `err` and use its message.
    pub fn from_error(err: &TransactionError, elapsed: Duration) -> Self {
        Self {
            status: err.status(),
            payload: None,
            message: err.to_string(),
            elapsed,
        }
    }

    /// Attach a payload without changing the status.
    pub fn with_payload(mut self, payload: T) -> Self {
        self.payload = Some(payload);
        self
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn elapsed_millis(&self) -> u128 {
        self.elapsed.as_millis()
    }

    pub fn map<U, F>(self, f: F) -> TransactionResult<U>
    where
        F: FnOnce(T) -> U,
    {
        TransactionResult {
            status: self.status,
            payload: self.payload.map(f),
            message: self.message,
            elapsed: self.elapsed,
        }
    }
}

/// Progress notification for long operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// 0..=100
    pub percent: u8,
    pub message: String,
}
