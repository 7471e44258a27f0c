use serde::{Deserialize, Serialize};
use std::fmt;

/// Single structured error shape shared by every crate in the workspace.
///
/// `code` is stable and machine-matchable (`CONFIG_*`, `DB_*`, `CORPUS_*`,
/// `BATCH_*`, `AI_*`); `message` is for humans; `details` carries the
/// underlying cause when there is one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// One-line rendering including details, used when an error has to be
    /// folded into a result payload instead of propagated.
    pub fn describe(&self) -> String {
        match self.details.as_deref() {
            Some(d) if !d.is_empty() => format!("[{}] {}: {}", self.code, self.message, d),
            _ => format!("[{}] {}", self.code, self.message),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
