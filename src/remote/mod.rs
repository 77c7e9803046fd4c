// Remote API boundary
//
// The backend transport lives outside this crate. The core only needs the
// batch meeting fetch and purchase validation, expressed as a trait so the
// host app can plug in its HTTP client and tests can plug in stubs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::TransactionValidation;
use crate::processing::ProcessingState;

/// Errors from the remote backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Could not reach the server (offline, DNS, timeout)
    Network(String),
    /// Server answered with a non-success status
    Server { status: u16, message: String },
    /// Server refused a purchase validation
    Rejected(String),
    /// Response body could not be decoded
    Decode(String),
    /// Not signed in or session expired
    Unauthorized,
}

impl RemoteError {
    /// Failures worth retrying later. A rejected validation or a bad session
    /// will not fix itself by waiting.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Network(_) => true,
            RemoteError::Server { status, .. } => *status >= 500,
            RemoteError::Rejected(_) | RemoteError::Decode(_) | RemoteError::Unauthorized => false,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Network(msg) => write!(f, "Network error: {}", msg),
            RemoteError::Server { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
            RemoteError::Rejected(msg) => write!(f, "Validation rejected: {}", msg),
            RemoteError::Decode(msg) => write!(f, "Invalid response: {}", msg),
            RemoteError::Unauthorized => write!(f, "Not authorized"),
        }
    }
}

impl std::error::Error for RemoteError {}

/// A meeting as the server reports it, content included
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMeeting {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    #[serde(default)]
    pub processing_state: ProcessingState,
    #[serde(default)]
    pub processing_error: Option<String>,
    #[serde(default)]
    pub last_processed_chunk: u32,
    #[serde(default)]
    pub total_chunks: u32,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub short_summary: Option<String>,
    #[serde(default)]
    pub long_summary: Option<String>,
}

impl RemoteMeeting {
    pub fn is_processing(&self) -> bool {
        self.processing_state.is_processing()
    }
}

/// Backend operations the core depends on
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Every meeting the user owns, with transcript and summaries, in one call
    async fn fetch_all_meetings_with_content(&self) -> Result<Vec<RemoteMeeting>, RemoteError>;

    /// Ask the server to validate a purchase. `transaction_id` is the
    /// idempotency key, so resubmitting an already-validated one is harmless.
    async fn validate_transaction(&self, validation: &TransactionValidation) -> Result<(), RemoteError>;
}
