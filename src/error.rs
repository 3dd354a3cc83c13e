//! Error types for meeting store access and lifecycle transitions
//!
//! Errors are classified by recoverability:
//! - Retryable: transport failures, 5xx responses
//! - NeedsReconcile: a transition wrote the destination but left the source row
//! - NonRetryable: validation failures, 4xx responses, invalid state

use thiserror::Error;

use crate::types::{Meeting, MeetingStatus};

/// Failures talking to the remote meeting store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Meeting store returned {status} for {url}: {message}")]
    Http {
        status: u16,
        url: String,
        message: String,
    },

    #[error("Failed to parse meeting store response: {0}")]
    Decode(String),

    #[error("Invalid meeting store URL '{0}'")]
    InvalidBaseUrl(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport { .. } => true,
            StoreError::Http { status, .. } => *status >= 500 || *status == 429,
            StoreError::Decode(_) | StoreError::InvalidBaseUrl(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Http { status: 404, .. })
    }

    /// Message suitable for an inline banner. Prefers the backend's own text.
    pub fn user_message(&self) -> String {
        match self {
            StoreError::Http { message, .. } if !message.is_empty() => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Required-field checks run before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Nothing to update")]
    EmptyPatch,
}

/// The two-step transitions of the approval workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Approve,
    Deny,
    Restore,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Transition::Approve => "approve",
            Transition::Deny => "deny",
            Transition::Restore => "restore",
        };
        f.write_str(name)
    }
}

/// Error types for lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to create meeting: {0}")]
    CreateFailed(#[source] StoreError),

    #[error("Failed to approve meeting: {0}")]
    ApprovalFailed(#[source] StoreError),

    #[error("Failed to deny meeting: {0}")]
    DenialFailed(#[source] StoreError),

    #[error("Failed to restore meeting: {0}")]
    RestoreFailed(#[source] StoreError),

    #[error("Failed to delete meeting: {0}")]
    DeleteFailed(#[source] StoreError),

    #[error("Failed to update meeting: {0}")]
    UpdateFailed(#[source] StoreError),

    // Destination written, source row left behind
    #[error("Meeting {source_id} was copied ({transition}) as {} but the original could not be removed: {source}", .inserted.id)]
    PartialTransition {
        transition: Transition,
        inserted: Box<Meeting>,
        source_id: i64,
        #[source]
        source: StoreError,
    },

    #[error("Another operation on meeting {id} is still in progress")]
    InFlight { id: i64 },

    #[error("Meeting {id} is {found}, expected {expected}")]
    InvalidState {
        id: i64,
        expected: MeetingStatus,
        found: MeetingStatus,
    },

    #[error("Deleting meeting {id} requires explicit confirmation")]
    ConfirmationRequired { id: i64 },
}

impl LifecycleError {
    /// Returns true if repeating the same action may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            LifecycleError::CreateFailed(e)
            | LifecycleError::ApprovalFailed(e)
            | LifecycleError::DenialFailed(e)
            | LifecycleError::RestoreFailed(e)
            | LifecycleError::DeleteFailed(e)
            | LifecycleError::UpdateFailed(e) => e.is_retryable(),
            LifecycleError::InFlight { .. } => true,
            _ => false,
        }
    }

    /// Returns true if the caller should re-fetch every collection
    pub fn needs_reconcile(&self) -> bool {
        matches!(self, LifecycleError::PartialTransition { .. })
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            LifecycleError::Validation(_) => "Fill in the required fields and submit again.",
            LifecycleError::CreateFailed(_)
            | LifecycleError::ApprovalFailed(_)
            | LifecycleError::DenialFailed(_)
            | LifecycleError::RestoreFailed(_)
            | LifecycleError::DeleteFailed(_)
            | LifecycleError::UpdateFailed(_) => {
                "Check the connection to the meeting server and try again."
            }
            LifecycleError::PartialTransition { .. } => {
                "The meeting now appears in two lists. Run a reconcile to finish the move."
            }
            LifecycleError::InFlight { .. } => "Wait for the current operation to finish.",
            LifecycleError::InvalidState { .. } => "Reload the meetings; the list is out of date.",
            LifecycleError::ConfirmationRequired { .. } => {
                "Confirm the deletion explicitly; it cannot be undone."
            }
        }
    }
}

/// Login failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Please fill in both username and password")]
    MissingCredentials,

    #[error("{0}")]
    InvalidCredentials(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Serializable error representation for the view layer
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionError {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    Retryable,
    NonRetryable,
    NeedsReconcile,
}

impl From<&LifecycleError> for ActionError {
    fn from(err: &LifecycleError) -> Self {
        let error_type = if err.needs_reconcile() {
            ErrorType::NeedsReconcile
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        ActionError {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}

impl From<String> for ActionError {
    fn from(message: String) -> Self {
        ActionError {
            message,
            error_type: ErrorType::NonRetryable,
            can_retry: false,
            recovery_suggestion: String::new(),
        }
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.recovery_suggestion.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} ({})", self.message, self.recovery_suggestion)
        }
    }
}
