//! Errors raised while compiling and running Sluice queries.
//!
//! A [`SluiceError`] is plain data: a [`ErrorCode`] that tools can switch on,
//! a message for people, and optionally a typed [`ErrorContext`], a fix-it
//! hint and the call id of the execution it came from. It serializes as the
//! `error` object of the CLI's JSON output.

mod code;
mod context;
mod convert;

pub use code::{ErrorCategory, ErrorCode};
pub use context::ErrorContext;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SluiceError {
    pub code: ErrorCode,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// What the caller can change to make the call succeed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// Id of the call context the failure belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl SluiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
            trace_id: None,
        }
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Tags the error with a call id. Drivers set this once a call context
    /// exists so log lines and errors can be joined.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// A [`ErrorCode::PlanShape`] error carrying its plan details.
    pub fn plan_shape(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::new(ErrorCode::PlanShape, message).with_context(context)
    }

    /// The error an async call ends with when its token fires.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QueryCancelled, message)
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::QueryCancelled
    }

    /// Single-line JSON. Falls back to code and a fixed message if the
    /// context cannot be encoded.
    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(code = %self.code, error = %e, "Could not encode error as JSON");
                format!(
                    r#"{{"code":"{}","message":"error could not be encoded"}}"#,
                    self.code
                )
            }
        }
    }
}

impl fmt::Display for SluiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        match &self.hint {
            Some(hint) => write!(f, " (Hint: {})", hint),
            None => Ok(()),
        }
    }
}

impl std::error::Error for SluiceError {}

pub type Result<T, E = SluiceError> = std::result::Result<T, E>;
