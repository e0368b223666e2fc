//! Normalization of raw fetch failures into [`ClassifiedError`]s.

use std::sync::Arc;

use reqwest::StatusCode;

use crate::error::{Cause, ClassifiedError, ErrorKind};
use crate::github::ErrorEntry;

/// Fallback message for upstream errors that carry no text.
pub const DEFAULT_UPSTREAM_MESSAGE: &str = "Upstream Error";

/// Message attached to [`ErrorKind::MaxRetry`].
pub const MAX_RETRY_MESSAGE: &str = "Downtime due to GitHub API rate limiting";

/// GraphQL error `type` GitHub uses for rate-limited queries.
const RATE_LIMITED_TYPE: &str = "RATE_LIMITED";

/// Messages GitHub sends for credentials that will never work again.
const AUTH_FAILURE_MESSAGES: [&str; 2] = ["Bad credentials", "Sorry. Your account was suspended."];

/// Everything known about one failed fetch, independent of the transport.
#[derive(Debug, Clone, Default)]
pub struct RawFailure {
    /// HTTP status, if a response was received.
    pub status: Option<u16>,
    /// Top-level message (REST error body or the thrown error's text).
    pub message: Option<String>,
    /// Structured GraphQL error entries.
    pub errors: Vec<ErrorEntry>,
    /// No response was received.
    pub transport: bool,
    /// The rotation loop ran out of tokens.
    pub no_tokens: bool,
    pub cause: Option<Cause>,
}

impl RawFailure {
    /// A failure reported through a GraphQL `errors` array.
    pub fn from_errors(errors: Vec<ErrorEntry>) -> Self {
        Self {
            errors,
            ..Default::default()
        }
    }

    /// A non-2xx HTTP response.
    pub fn http(status: u16, message: Option<String>) -> Self {
        Self {
            status: Some(status),
            message,
            ..Default::default()
        }
    }

    /// The request never produced a response.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            transport: true,
            ..Default::default()
        }
    }

    /// Any other error, described only by its text.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn no_tokens() -> Self {
        Self {
            no_tokens: true,
            ..Default::default()
        }
    }

    pub fn with_errors(mut self, errors: Vec<ErrorEntry>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    fn first_entry_message(&self) -> Option<&str> {
        self.errors
            .first()
            .and_then(|entry| entry.message.as_deref())
            .filter(|m| !m.is_empty())
    }

    fn top_message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.is_empty())
    }

    fn is_rate_limited(&self) -> bool {
        match self.status.and_then(|s| StatusCode::from_u16(s).ok()) {
            Some(StatusCode::TOO_MANY_REQUESTS) => return true,
            Some(StatusCode::FORBIDDEN)
                if self
                    .top_message()
                    .is_some_and(|m| m.to_lowercase().contains("rate limit")) =>
            {
                return true;
            }
            _ => {}
        }

        self.errors
            .iter()
            .any(|entry| entry.kind.as_deref() == Some(RATE_LIMITED_TYPE))
    }

    fn is_auth_failure(&self) -> bool {
        if self.status == Some(StatusCode::UNAUTHORIZED.as_u16()) {
            return true;
        }

        let is_auth_message = |m: &str| AUTH_FAILURE_MESSAGES.iter().any(|known| *known == m);
        self.top_message().is_some_and(is_auth_message)
            || self
                .errors
                .iter()
                .filter_map(|entry| entry.message.as_deref())
                .any(is_auth_message)
    }
}

impl From<reqwest::Error> for RawFailure {
    fn from(error: reqwest::Error) -> Self {
        let message = error.to_string();
        let raw = if let Some(status) = error.status() {
            RawFailure::http(status.as_u16(), Some(message))
        } else if error.is_connect() || error.is_timeout() || error.is_request() {
            RawFailure::transport(message)
        } else {
            // Body and decode errors: a response arrived but was unusable.
            RawFailure::message(message)
        };
        raw.with_cause(error)
    }
}

/// Maps a raw failure onto exactly one [`ErrorKind`].
///
/// Precedence: rate limit, then credential rejection, then pool exhaustion,
/// then transport failure. Anything else is an upstream error whose message is
/// the first structured entry's message, falling back to the top-level message
/// and finally to [`DEFAULT_UPSTREAM_MESSAGE`].
///
/// Pure: the same input always yields the same kind and message.
pub fn classify(raw: &RawFailure) -> ClassifiedError {
    let (kind, message) = if raw.is_rate_limited() {
        (
            ErrorKind::RateLimited,
            raw.first_entry_message()
                .or(raw.top_message())
                .unwrap_or("GitHub API rate limit exceeded"),
        )
    } else if raw.is_auth_failure() {
        (
            ErrorKind::TokenInvalid,
            raw.top_message()
                .or(raw.first_entry_message())
                .unwrap_or("Invalid or missing authentication token"),
        )
    } else if raw.no_tokens {
        (ErrorKind::MaxRetry, MAX_RETRY_MESSAGE)
    } else if raw.transport {
        (
            ErrorKind::NetworkError,
            raw.top_message().unwrap_or("No response received"),
        )
    } else {
        (
            ErrorKind::UpstreamError,
            raw.first_entry_message()
                .or(raw.top_message())
                .unwrap_or(DEFAULT_UPSTREAM_MESSAGE),
        )
    };

    ClassifiedError::new(kind, message).with_cause(raw.cause.clone())
}
