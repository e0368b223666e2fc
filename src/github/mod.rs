use async_trait::async_trait;
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderValue},
};
use serde_json::{Value, json};

use crate::classify::RawFailure;

mod types;

pub use types::{ErrorEntry, GraphQlResponse};
use types::ErrorBody;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Executes GraphQL documents with a caller-chosen token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphQl: Send + Sync {
    async fn query(
        &self,
        query: &str,
        variables: &Value,
        token: &str,
    ) -> Result<GraphQlResponse<Value>, RawFailure>;
}

pub struct GitHub {
    pub client: Client,
    pub api_url: String,
}

impl GitHub {
    #[tracing::instrument(skip(client, api_url))]
    pub fn new(client: Client, api_url: Option<String>) -> Self {
        let api_url = api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn endpoint(&self) -> String {
        format!("{}/graphql", self.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GraphQl for GitHub {
    #[tracing::instrument(skip(self, query, variables, token))]
    async fn query(
        &self,
        query: &str,
        variables: &Value,
        token: &str,
    ) -> Result<GraphQlResponse<Value>, RawFailure> {
        let url = self.endpoint();
        let auth = authorization(token)?;

        debug!("POST GraphQL query to {}...", url);

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, auth)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // GitHub answers auth and rate-limit failures with a REST-style body.
            let mut raw = match response.text().await {
                Ok(body) => {
                    debug!("GraphQL endpoint returned {}: {}", status, body);
                    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
                    RawFailure::http(status.as_u16(), parsed.message).with_errors(parsed.errors)
                }
                Err(e) => RawFailure::http(status.as_u16(), None).with_cause(e),
            };
            if raw.message.as_deref().is_none_or(str::is_empty) {
                raw.message = Some(status.to_string());
            }
            return Err(raw);
        }

        let parsed = response.json::<GraphQlResponse<Value>>().await?;
        Ok(parsed)
    }
}

fn authorization(token: &str) -> Result<HeaderValue, RawFailure> {
    let mut value = HeaderValue::from_str(&format!("bearer {}", token)).map_err(|e| {
        // A token that cannot even be sent is as dead as one GitHub rejects.
        RawFailure::http(401, Some("Token is not a valid header value".to_string())).with_cause(e)
    })?;
    value.set_sensitive(true);
    Ok(value)
}
