use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::permission::Role;
use crate::policy::Action;

pub const GENERIC_FAILURE: &str = "Something went wrong, please try again.";

/// Everything a lifecycle request can fail with.
#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
    #[error("{role} is not permitted to {action}")]
    Unauthorized { role: Role, action: Action },
    #[error("{subject} cannot move from {from} to {to}: {reason}")]
    IllegalTransition {
        subject: String,
        from: String,
        to: String,
        reason: TransitionDenial,
    },
    #[error("request rejected by the server: {message}")]
    RemoteRejected { status: Option<u16>, message: String },
    #[error("invalid {field}: {reason}")]
    MalformedInput { field: &'static str, reason: String },
    #[error("{0} is not in the current list")]
    NotFound(String),
    #[error("journal failure: {0}")]
    Journal(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionDenial {
    #[error("status is terminal")]
    Terminal,
    #[error("no such transition for this role")]
    NotInTable,
    #[error("trip is scheduled for {scheduled}")]
    NotYetDue { scheduled: DateTime<Utc> },
    #[error("booking date or time could not be read")]
    UnparseableSchedule,
    #[error("a request for this record is already in flight")]
    InFlight,
}

/// Transport level failures talking to the localvan API.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("api error status={status}: {}", message.as_deref().unwrap_or("<no message>"))]
    Status { status: u16, message: Option<String> },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LifecycleError {
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        LifecycleError::MalformedInput {
            field,
            reason: reason.into(),
        }
    }

    pub fn is_illegal_transition(&self) -> bool {
        matches!(self, LifecycleError::IllegalTransition { .. })
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            LifecycleError::IllegalTransition {
                reason: TransitionDenial::InFlight,
                ..
            }
        )
    }

    /// Text a dashboard shows in its toast or inline error slot.
    pub fn user_message(&self) -> String {
        match self {
            LifecycleError::Unauthorized { .. } => {
                "You do not have permission to perform this action.".into()
            }
            LifecycleError::IllegalTransition { reason, to, .. } => match reason {
                TransitionDenial::InFlight => "Please wait, this request is still processing.".into(),
                TransitionDenial::NotYetDue { .. } => {
                    "This trip cannot be completed before its scheduled time.".into()
                }
                TransitionDenial::UnparseableSchedule => {
                    "This booking has an invalid schedule and cannot be completed.".into()
                }
                TransitionDenial::Terminal | TransitionDenial::NotInTable => {
                    format!("This booking cannot be marked {to}.")
                }
            },
            LifecycleError::RemoteRejected { message, .. } => message.clone(),
            LifecycleError::MalformedInput { field, reason } => format!("{field}: {reason}"),
            LifecycleError::NotFound(_) => "This record is no longer available. Refresh and try again.".into(),
            LifecycleError::Journal(_) => GENERIC_FAILURE.into(),
        }
    }
}

impl ApiError {
    /// Message the server attached to its refusal, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } => message.as_deref().filter(|m| !m.trim().is_empty()),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    // only reads are ever retried, and only for these
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Timeout(_) => true,
            ApiError::Http(e) => e.is_timeout() || e.is_connect(),
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::InvalidResponse(_) => false,
        }
    }
}

impl From<ApiError> for LifecycleError {
    fn from(value: ApiError) -> Self {
        let message = match &value {
            ApiError::Timeout(_) => "The server did not respond in time, please try again.".to_string(),
            other => other
                .server_message()
                .map(str::to_string)
                .unwrap_or_else(|| GENERIC_FAILURE.to_string()),
        };
        LifecycleError::RemoteRejected {
            status: value.status(),
            message,
        }
    }
}

impl From<anyhow::Error> for LifecycleError {
    fn from(value: anyhow::Error) -> Self {
        LifecycleError::Journal(format!("{value:#}"))
    }
}
