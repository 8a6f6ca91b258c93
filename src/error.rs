//! Error types for remote generation tasks.

use std::time::Duration;

/// Maximum length of provider error text carried in an error message.
const MAX_ERROR_MESSAGE_LEN: usize = 300;

/// Errors that can occur while creating, polling or finishing a generation task.
#[derive(Debug, thiserror::Error)]
pub enum EffigyError {
    /// Caller-supplied input violates a precondition.
    #[error("invalid input: {0}")]
    Validation(String),

    /// API key, base URL or model name missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Operation not offered by the configured provider family.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Network-level failure; no HTTP exchange completed.
    #[error("network error: {message}")]
    Transport {
        /// What went wrong.
        message: String,
        /// Underlying client error, if any.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The HTTP exchange completed with a non-2xx status.
    #[error("API error: {status} - {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Provider error text.
        message: String,
        /// Value of the `Retry-After` header, if present.
        retry_after: Option<Duration>,
    },

    /// A successful response whose body does not have the expected shape.
    #[error("unexpected response: {0}")]
    Protocol(String),

    /// The provider reported the job as failed.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// The poll deadline elapsed without a terminal state.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// Too many consecutive transient failures while querying a task.
    #[error("task query failed {attempts} times in a row, check the network or retry later")]
    QueryFailures {
        /// Number of consecutive failures.
        attempts: u32,
        /// The last failure observed.
        #[source]
        source: Box<EffigyError>,
    },

    /// Credentials were rejected by the provider.
    #[error("API key invalid or expired: {message}")]
    Auth {
        /// User-facing message.
        message: String,
        /// Original error.
        #[source]
        source: Option<Box<EffigyError>>,
    },

    /// The provider throttled the request (HTTP 429).
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Suggested delay before retrying.
        retry_after: Option<Duration>,
        /// Original error.
        #[source]
        source: Option<Box<EffigyError>>,
    },

    /// The upstream service (or a CDN in front of it) is unavailable.
    #[error("generation service unavailable: {message}")]
    UpstreamUnavailable {
        /// User-facing message.
        message: String,
        /// Original error.
        #[source]
        source: Option<Box<EffigyError>>,
    },
}

/// Coarse error category used by callers to pick a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Fix the request (prompt, image).
    InvalidInput,
    /// Fix the provider configuration (key, base URL, model).
    Reconfigure,
    /// Transient; try again later.
    RetryLater,
    /// Feature not available with the current provider.
    Unsupported,
    /// The job itself failed or produced nothing usable.
    Failed,
}

impl EffigyError {
    /// Creates a transport error without an underlying client error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if a poll loop should absorb this error and query again.
    ///
    /// Network failures and gateway statuses from proxies/CDNs qualify;
    /// any other HTTP status is a definitive answer from the provider.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Http { status, .. } => matches!(*status, 502..=504 | 520..=524),
            _ => false,
        }
    }

    /// Returns true if this error is likely transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.is_transient()
            || matches!(
                self,
                Self::RateLimited { .. }
                    | Self::Timeout(_)
                    | Self::UpstreamUnavailable { .. }
                    | Self::QueryFailures { .. }
            )
    }

    /// Returns the suggested retry delay, if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            Self::Http { retry_after, .. } => *retry_after,
            Self::Transport { .. } => Some(Duration::from_secs(2)),
            _ => None,
        }
    }

    /// Returns the category callers branch on.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::InvalidInput,
            Self::Configuration(_) | Self::Auth { .. } => ErrorCategory::Reconfigure,
            Self::UnsupportedProvider(_) => ErrorCategory::Unsupported,
            Self::Http { status, .. } if matches!(*status, 401 | 403) => ErrorCategory::Reconfigure,
            Self::Http { status, .. } if *status == 429 || *status >= 500 => {
                ErrorCategory::RetryLater
            }
            Self::Transport { .. }
            | Self::Timeout(_)
            | Self::QueryFailures { .. }
            | Self::RateLimited { .. }
            | Self::UpstreamUnavailable { .. } => ErrorCategory::RetryLater,
            Self::Http { .. } | Self::Protocol(_) | Self::GenerationFailed(_) => {
                ErrorCategory::Failed
            }
        }
    }
}

impl From<reqwest::Error> for EffigyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Trims provider error text and caps its length.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
    out.push('…');
    out
}

/// Reads a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Result type alias for generation operations.
pub type Result<T> = std::result::Result<T, EffigyError>;
