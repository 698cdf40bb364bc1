//! Outcomes of guarded operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of running a guarded operation.
///
/// Failures are ordinary values here: a failed outcome is cached like a
/// successful one so that a persistently failing downstream is not hit on
/// every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Whether the operation succeeded
    pub success: bool,
    /// Full operation result
    #[serde(default)]
    pub payload: Value,
    /// Error description for failed outcomes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationOutcome {
    /// A successful outcome carrying `payload`.
    pub fn success(payload: Value) -> Self {
        Self {
            success: true,
            payload,
            error: None,
        }
    }

    /// A failed outcome with an error description and no payload.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: Value::Null,
            error: Some(error.into()),
        }
    }

    /// A failed outcome that still carries a partial payload.
    pub fn failure_with_payload(error: impl Into<String>, payload: Value) -> Self {
        Self {
            success: false,
            payload,
            error: Some(error.into()),
        }
    }

    /// Check if this outcome is a success.
    pub fn is_success(&self) -> bool {
        self.success
    }
}
