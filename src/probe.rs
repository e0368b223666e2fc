//! The `/status/up` probe: reports whether any pooled token still works.

use anyhow::Result;
use log::{debug, error, warn};
use serde_json::Value;

use crate::error::ErrorKind;
use crate::github::GraphQl;
use crate::retryer::{RetryOutcome, Retryer};
use crate::token::Token;

/// Freshness window advertised to shared caches, one probe per minute.
pub const RATE_LIMIT_SECONDS: u64 = 60;

/// The cheapest authenticated query GitHub offers.
pub const UPTIME_QUERY: &str = "query { rateLimit { remaining } }";

/// Where the probe writes its response.
#[cfg_attr(test, mockall::automock)]
pub trait ResponseSink {
    fn set_header(&mut self, name: &str, value: &str);
    fn send(&mut self, body: bool);
}

/// In-memory [`ResponseSink`] recording headers in the order they were set.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProbeResponse {
    pub headers: Vec<(String, String)>,
    pub body: Option<bool>,
}

impl ProbeResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl ResponseSink for ProbeResponse {
    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn send(&mut self, body: bool) {
        self.body = Some(body);
    }
}

pub fn cache_control() -> String {
    format!("max-age=0, s-maxage={}", RATE_LIMIT_SECONDS)
}

/// Runs the uptime query once through `retryer` and writes the verdict.
///
/// Sends `true` when a token works and `false` when every token is
/// exhausted or invalid. Any other failure is returned as an error wrapping
/// the [`ClassifiedError`](crate::error::ClassifiedError), with no body sent.
/// Both headers are set before the query runs, whatever its outcome.
#[tracing::instrument(skip_all)]
pub async fn up<S, G>(sink: &mut S, retryer: &Retryer, github: &G, variables: &Value) -> Result<()>
where
    S: ResponseSink,
    G: GraphQl,
{
    sink.set_header("Content-Type", "application/json");
    sink.set_header("Cache-Control", &cache_control());

    let fetch = move |variables: &Value, token: &Token| {
        let variables = variables.clone();
        let secret = token.secret().to_string();
        async move { github.query(UPTIME_QUERY, &variables, &secret).await }
    };

    match retryer.run(fetch, variables).await {
        RetryOutcome::Success(data) => {
            if let Some(remaining) = data.pointer("/rateLimit/remaining") {
                debug!("Probe succeeded, {} requests remaining", remaining);
            }
            sink.send(true);
            Ok(())
        }
        RetryOutcome::Failure(err) if err.kind() == ErrorKind::MaxRetry => {
            warn!("Probe failed: {}", err);
            sink.send(false);
            Ok(())
        }
        RetryOutcome::Failure(err) => {
            error!("Probe errored: {}", err);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::RawFailure;
    use crate::error::ClassifiedError;
    use crate::github::{ErrorEntry, GraphQlResponse, MockGraphQl};
    use crate::token::{TokenSource, TokenStatus};
    use mockall::Sequence;
    use mockall::predicate::eq;
    use serde_json::json;
    use std::sync::Arc;

    fn retryer(secrets: &[&str]) -> Retryer {
        Retryer::new(Arc::new(TokenSource::from_secrets(secrets.iter().copied())))
    }

    fn success() -> Result<GraphQlResponse<Value>, RawFailure> {
        Ok(GraphQlResponse::data(json!({"rateLimit": {"remaining": 4986}})))
    }

    fn expected_headers() -> Vec<(String, String)> {
        vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Cache-Control".to_string(), "max-age=0, s-maxage=60".to_string()),
        ]
    }

    #[tokio::test]
    async fn test_up_returns_true_on_success() {
        let mut github = MockGraphQl::new();
        github
            .expect_query()
            .withf(|query, _, token| query == UPTIME_QUERY && token == "t1")
            .times(1)
            .returning(|_, _, _| success());

        let mut response = ProbeResponse::default();
        up(&mut response, &retryer(&["t1"]), &github, &json!({}))
            .await
            .unwrap();

        assert_eq!(response.body, Some(true));
        assert_eq!(response.headers, expected_headers());
    }

    #[tokio::test]
    async fn test_up_rotates_past_rate_limited_token() {
        let mut github = MockGraphQl::new();
        github
            .expect_query()
            .withf(|_, _, token| token == "t1")
            .times(1)
            .returning(|_, _, _| {
                Ok(GraphQlResponse::errors(vec![ErrorEntry::new(
                    Some("RATE_LIMITED"),
                    None,
                )]))
            });
        github
            .expect_query()
            .withf(|_, _, token| token == "t2")
            .times(1)
            .returning(|_, _, _| success());

        let retryer = retryer(&["t1", "t2"]);
        let mut response = ProbeResponse::default();
        up(&mut response, &retryer, &github, &json!({}))
            .await
            .unwrap();

        assert_eq!(response.body, Some(true));
        assert_eq!(
            retryer.source().statuses(),
            vec![
                ("PAT_1".to_string(), TokenStatus::Exhausted),
                ("PAT_2".to_string(), TokenStatus::Good),
            ]
        );
    }

    #[tokio::test]
    async fn test_up_returns_false_when_all_tokens_dead() {
        let mut github = MockGraphQl::new();
        github
            .expect_query()
            .times(2)
            .returning(|_, _, _| Err(RawFailure::http(401, Some("Bad credentials".to_string()))));

        let mut response = ProbeResponse::default();
        up(&mut response, &retryer(&["t1", "t2"]), &github, &json!({}))
            .await
            .unwrap();

        assert_eq!(response.body, Some(false));
        assert_eq!(response.headers, expected_headers());
    }

    #[tokio::test]
    async fn test_up_returns_false_for_empty_pool() {
        let mut github = MockGraphQl::new();
        github.expect_query().never();

        let mut response = ProbeResponse::default();
        up(&mut response, &retryer(&[]), &github, &json!({}))
            .await
            .unwrap();

        assert_eq!(response.body, Some(false));
    }

    #[tokio::test]
    async fn test_up_forwards_upstream_error() {
        let mut github = MockGraphQl::new();
        github.expect_query().times(1).returning(|_, _, _| {
            Ok(GraphQlResponse::errors(vec![ErrorEntry::new(
                Some("VERCEL_ERROR"),
                Some("Vercel Error"),
            )]))
        });

        let mut response = ProbeResponse::default();
        let err = up(&mut response, &retryer(&["t1", "t2"]), &github, &json!({}))
            .await
            .unwrap_err();

        let classified = err.downcast_ref::<ClassifiedError>().unwrap();
        assert_eq!(classified.kind(), ErrorKind::UpstreamError);
        assert_eq!(classified.message(), "Vercel Error");
        assert!(err.to_string().contains("Vercel Error"));
        assert_eq!(response.body, None);
        assert_eq!(response.headers, expected_headers());
    }

    #[tokio::test]
    async fn test_up_forwards_network_error() {
        let mut github = MockGraphQl::new();
        github
            .expect_query()
            .times(1)
            .returning(|_, _, _| Err(RawFailure::transport("connection refused")));

        let mut response = ProbeResponse::default();
        let err = up(&mut response, &retryer(&["t1", "t2"]), &github, &json!({}))
            .await
            .unwrap_err();

        let classified = err.downcast_ref::<ClassifiedError>().unwrap();
        assert_eq!(classified.kind(), ErrorKind::NetworkError);
        assert_eq!(response.body, None);
    }

    #[tokio::test]
    async fn test_up_sets_headers_before_sending() {
        let mut seq = Sequence::new();
        let mut sink = MockResponseSink::new();
        sink.expect_set_header()
            .with(eq("Content-Type"), eq("application/json"))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        sink.expect_set_header()
            .with(eq("Cache-Control"), eq("max-age=0, s-maxage=60"))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        sink.expect_send()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let github = MockGraphQl::new();
        up(&mut sink, &retryer(&[]), &github, &json!({}))
            .await
            .unwrap();
    }

    #[test]
    fn test_probe_response_header_lookup_is_case_insensitive() {
        let mut response = ProbeResponse::default();
        response.set_header("Cache-Control", &cache_control());

        assert_eq!(response.header("cache-control"), Some("max-age=0, s-maxage=60"));
        assert_eq!(response.header("Content-Type"), None);
    }
}
