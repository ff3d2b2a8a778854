//! Error types for migration operations.

use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::types::FailurePhase;

/// Kind of semantic failure reported by a forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The forge refused to create an object (e.g. an `iid` collision).
    Create,
    /// The forge refused to update an object.
    Update,
    /// A lookup of an existing object failed.
    Get,
    /// The response body did not have the expected shape.
    Decode,
    /// The forge accepted a write, but its reply could not be read.
    Unconfirmed,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Get => write!(f, "get"),
            Self::Decode => write!(f, "decode"),
            Self::Unconfirmed => write!(f, "unconfirmed"),
        }
    }
}

/// Tagged failure of a single network operation.
///
/// Every call against either forge reports one of these. A transport
/// failure means no response arrived, so the remote state is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// No response received (DNS, timeout, connection reset).
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The forge answered with a non-success status.
    #[error("HTTP {status}: {reason}")]
    Http {
        /// Status code.
        status: u16,
        /// Canonical reason phrase of the status.
        reason: String,
    },

    /// The forge answered but rejected the operation semantically.
    #[error("Provider {kind} error: {detail}")]
    Provider {
        /// Which operation class failed.
        kind: ProviderErrorKind,
        /// Provider supplied detail.
        detail: String,
    },
}

impl RequestError {
    /// Build an HTTP error from a response status.
    pub fn http(status: reqwest::StatusCode) -> Self {
        Self::Http {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }

    /// Build a provider error.
    pub fn provider(kind: ProviderErrorKind, detail: impl Into<String>) -> Self {
        Self::Provider {
            kind,
            detail: detail.into(),
        }
    }

    /// Whether this is a transport-level failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether the forge rejected our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Http { status: 401 | 403, .. })
    }

    /// Whether the write may have been applied despite the error.
    pub fn is_unconfirmed(&self) -> bool {
        matches!(
            self,
            Self::Provider {
                kind: ProviderErrorKind::Unconfirmed,
                ..
            }
        )
    }

    /// Status code as reported to the user, or `None` for a transport failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(_) | Self::Provider { .. } => None,
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::provider(ProviderErrorKind::Decode, e.to_string());
        }
        match e.status() {
            Some(status) => Self::http(status),
            None => Self::Transport(e.to_string()),
        }
    }
}

/// Result of a network operation paired with its wall-clock duration.
#[derive(Debug)]
pub struct Timed<T> {
    /// Outcome of the operation.
    pub result: std::result::Result<T, RequestError>,
    /// Time spent on the operation.
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    /// Run `fut` and measure how long it takes.
    pub async fn measure<F>(fut: F) -> Self
    where
        F: std::future::Future<Output = std::result::Result<T, RequestError>>,
    {
        let start = Instant::now();
        let result = fut.await;
        Self {
            result,
            elapsed: start.elapsed(),
        }
    }

    /// Elapsed seconds with two decimals, e.g. `"0.42"`.
    pub fn elapsed_secs(&self) -> String {
        format_elapsed(self.elapsed)
    }
}

/// Format a duration as seconds with two decimals.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}", elapsed.as_secs_f64())
}

/// Run-level errors. Any of these stops the migration.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The ticket count could not be established.
    #[error("Ticket counting failed after {elapsed}s: {source}")]
    CountFailed {
        /// Underlying request failure.
        source: RequestError,
        /// Elapsed seconds.
        elapsed: String,
    },

    /// A listing page came back empty while more tickets were expected.
    #[error("Page {page} was empty but {remaining} more tickets were expected")]
    UnexpectedEmptyPage {
        /// Page number requested.
        page: u64,
        /// Tickets still outstanding.
        remaining: u64,
    },

    /// A listing page could not be fetched.
    #[error("Listing page {page} failed: {source}")]
    PageFailed {
        /// Page number requested.
        page: u64,
        /// Underlying request failure.
        source: RequestError,
    },

    /// A request failure that the failure policy treats as fatal.
    #[error("Fatal failure during {phase} of ticket #{ticket_id}: {source}")]
    Fatal {
        /// Phase that failed.
        phase: FailurePhase,
        /// Source ticket being processed.
        ticket_id: u64,
        /// Underlying request failure.
        source: RequestError,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
