//! Credential rotation around a token-parameterized fetch.
//!
//! A run walks the [`TokenSource`] one token at a time. Rate limits and
//! rejected credentials move on to the next token; any other failure ends the
//! run immediately so upstream incidents are never hidden behind rotation.
//! A run makes at most one attempt per token.

use std::future::Future;
use std::sync::Arc;

use log::{debug, warn};

use crate::classify::{RawFailure, classify};
use crate::error::ClassifiedError;
use crate::github::GraphQlResponse;
use crate::token::{Token, TokenSource};

/// Result of one [`Retryer::run`].
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success(T),
    Failure(ClassifiedError),
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success(_))
    }

    pub fn into_result(self) -> Result<T, ClassifiedError> {
        match self {
            RetryOutcome::Success(value) => Ok(value),
            RetryOutcome::Failure(err) => Err(err),
        }
    }
}

/// Runs fetches against a shared token pool.
#[derive(Clone)]
pub struct Retryer {
    source: Arc<TokenSource>,
}

impl Retryer {
    pub fn new(source: Arc<TokenSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &TokenSource {
        &self.source
    }

    /// Calls `fetch(variables, token)` with successive tokens until one
    /// yields data or a failure that rotation cannot fix.
    ///
    /// A response carrying a GraphQL `errors` array counts as a failure and
    /// is classified like any other; only credential-related kinds rotate.
    #[tracing::instrument(skip(self, fetch, variables))]
    pub async fn run<V, T, F, Fut>(&self, fetch: F, variables: &V) -> RetryOutcome<T>
    where
        F: Fn(&V, &Token) -> Fut,
        Fut: Future<Output = Result<GraphQlResponse<T>, RawFailure>>,
    {
        let mut tokens = self.source.reset();

        loop {
            let Some(token) = tokens.next() else {
                warn!(
                    "No usable token left after {} attempt(s) over a pool of {}",
                    tokens.attempted(),
                    self.source.len()
                );
                return RetryOutcome::Failure(classify(&RawFailure::no_tokens()));
            };

            debug!(
                "Attempt {} with {} ({})",
                tokens.attempted(),
                token.label(),
                token.masked()
            );

            let raw = match fetch(variables, &token).await.and_then(into_data) {
                Ok(data) => {
                    self.source.mark_good(&token);
                    return RetryOutcome::Success(data);
                }
                Err(raw) => raw,
            };

            let error = classify(&raw);
            if !error.kind().is_rotatable() {
                debug!("{}: {} is not retryable, giving up", token.label(), error);
                return RetryOutcome::Failure(error);
            }

            warn!("{} failed ({}), rotating to the next token", token.label(), error);
            self.source.mark_bad(&token, error.kind());
        }
    }
}

fn into_data<T>(response: GraphQlResponse<T>) -> Result<T, RawFailure> {
    if !response.errors.is_empty() {
        return Err(RawFailure::from_errors(response.errors));
    }
    response
        .data
        .ok_or_else(|| RawFailure::message("Response contained neither data nor errors"))
}
