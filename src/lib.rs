//! Liveness probe for a pool of GitHub personal access tokens.
//!
//! [`retryer::Retryer`] runs a token-parameterized fetch across a shared
//! [`token::TokenSource`], rotating past rate-limited and rejected tokens and
//! classifying every other failure through [`classify::classify`].
//! [`probe::up`] wraps one such run into a boolean `/status/up` response.

pub mod classify;
pub mod config;
pub mod error;
pub mod github;
pub mod probe;
pub mod retryer;
pub mod runtime;
pub mod token;
