//! Action outcomes and their envelope form.

use engine::WorkerEnvelope;
use serde_json::Value;

pub type ActionResult = Result<Value, ActionError>;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Handled failure; `details` carries raw tool output when there is any.
    #[error("{message}")]
    Failed {
        message: String,
        details: Option<String>,
    },
    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

pub fn fail(message: impl Into<String>) -> ActionError {
    ActionError::Failed {
        message: message.into(),
        details: None,
    }
}

/// Empty details are dropped.
pub fn fail_with(message: impl Into<String>, details: impl Into<String>) -> ActionError {
    let details = details.into();
    let details = details.trim();
    ActionError::Failed {
        message: message.into(),
        details: (!details.is_empty()).then(|| details.to_string()),
    }
}

pub fn into_envelope(result: ActionResult) -> WorkerEnvelope {
    match result {
        Ok(data) => WorkerEnvelope::ok(data),
        Err(ActionError::Failed { message, details }) => WorkerEnvelope::fail(message, details),
        Err(e @ ActionError::UnknownAction(_)) => WorkerEnvelope::fail(e.to_string(), None),
    }
}
