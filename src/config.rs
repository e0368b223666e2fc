use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;

use crate::{github::GitHub, retryer::Retryer, runtime::Runtime, token::TokenSource};

/// Default per-request timeout for the GraphQL client.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// GitHub resets primary rate limits hourly.
pub const DEFAULT_COOLDOWN_SECS: u64 = 3600;

pub struct Config {
    pub github: GitHub,
    pub retryer: Retryer,
}

impl Config {
    pub fn new<R: Runtime>(
        runtime: &R,
        api_url: Option<String>,
        timeout: Duration,
        cooldown: Duration,
    ) -> Result<Self> {
        let source = TokenSource::from_env(runtime).with_cooldown(cooldown);
        if source.is_empty() {
            warn!("No PAT_1 environment variable set, every probe will report false");
        }

        let client = Client::builder()
            .user_agent("patprobe")
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let github = GitHub::new(client, api_url);
        debug!(
            "Probing {} with {} token(s)",
            github.endpoint(),
            source.len()
        );

        Ok(Self {
            github,
            retryer: Retryer::new(Arc::new(source)),
        })
    }
}
