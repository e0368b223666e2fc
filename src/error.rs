//! Kind-tagged errors produced by the token rotation core.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Shared, type-erased underlying failure.
pub type Cause = Arc<dyn Error + Send + Sync>;

/// Machine-readable failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The token hit its rate limit. Recoverable by rotating to another token.
    RateLimited,
    /// The token was rejected (bad credentials, suspended account).
    /// Recoverable by rotating to another token.
    TokenInvalid,
    /// The upstream answered with an error unrelated to the credential.
    UpstreamError,
    /// No usable token is left in the pool.
    MaxRetry,
    /// No response was received at all.
    NetworkError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::TokenInvalid => "TOKEN_INVALID",
            ErrorKind::UpstreamError => "UPSTREAM_ERROR",
            ErrorKind::MaxRetry => "MAX_RETRY",
            ErrorKind::NetworkError => "NETWORK_ERROR",
        }
    }

    /// Whether the failure is tied to the credential, so trying the next
    /// token may succeed.
    pub fn is_rotatable(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::TokenInvalid)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure normalized to an [`ErrorKind`], a human message and an optional cause.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    cause: Option<Cause>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: Option<Cause>) -> Self {
        self.cause = cause;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}
