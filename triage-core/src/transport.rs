// Shared HTTP transport with a bounded retry policy. Constructed once and
// injected into the tracker client and the revision lookup.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::TransportSection;
use crate::error::TrackerError;

/// Retry policy for transient transport failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    fn is_retryable(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }
}

impl From<&TransportSection> for RetryPolicy {
    fn from(section: &TransportSection) -> Self {
        Self {
            max_retries: section.max_retries,
            backoff: Duration::from_millis(section.backoff_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(section: &TransportSection) -> Result<Self, TrackerError> {
        // reqwest is built without a bundled provider; an earlier install wins.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let client = Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .user_agent(concat!("bugtriage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TrackerError::Network(format!("Cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            retry: RetryPolicy::from(section),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Send a request built by `build`, retrying connection failures,
    /// rate limiting and server errors with exponential backoff. Timeouts
    /// are only retried for safe methods, since the server may already have
    /// applied a timed-out write.
    ///
    /// `build` is called once per attempt since a `RequestBuilder` cannot be
    /// replayed.
    pub async fn send<F>(&self, build: F) -> Result<Response, TrackerError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut delay = self.retry.backoff;

        for attempt in 0..=self.retry.max_retries {
            let last = attempt == self.retry.max_retries;
            let request = build(&self.client)
                .build()
                .map_err(|e| TrackerError::Network(e.to_string()))?;
            let safe = request.method().is_safe();
            let resp = match self.client.execute(request).await {
                Ok(resp) => resp,
                Err(e) if !last && (e.is_connect() || (safe && e.is_timeout())) => {
                    warn!(attempt, error = %e, "Request failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    continue;
                }
                Err(e) => return Err(TrackerError::Network(e.to_string())),
            };

            let status = resp.status();
            debug!(url = %resp.url(), status = status.as_u16(), attempt, "HTTP response");
            if status.is_success() {
                return Ok(resp);
            }

            if !last && RetryPolicy::is_retryable(status) {
                let wait = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map_or(delay, Duration::from_secs);
                warn!(
                    attempt,
                    status = status.as_u16(),
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "Transient HTTP failure, backing off"
                );
                tokio::time::sleep(wait).await;
                delay *= 2;
                continue;
            }

            let body = resp.text().await.unwrap_or_default();
            return Err(TrackerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Err(TrackerError::Network("max retries exceeded".into()))
    }

    /// GET a URL and decode the JSON body.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T, TrackerError> {
        let resp = self
            .send(|client| {
                headers
                    .iter()
                    .fold(client.get(url), |req, (name, value)| req.header(*name, *value))
            })
            .await?;
        resp.json()
            .await
            .map_err(|e| TrackerError::Parse(format!("{url}: {e}")))
    }

    /// GET a URL and return the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, TrackerError> {
        let resp = self.send(|client| client.get(url)).await?;
        resp.text()
            .await
            .map_err(|e| TrackerError::Network(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    fn transport(max_retries: u32) -> HttpTransport {
        transport_with_timeout(max_retries, 5)
    }

    fn transport_with_timeout(max_retries: u32, timeout_secs: u64) -> HttpTransport {
        HttpTransport::new(&TransportSection {
            max_retries,
            backoff_ms: 1,
            timeout_secs,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn returns_success_without_retry() {
        let server = MockServer::start();
        let ok = server.mock(|when, then| {
            when.method(GET).path("/milestone.txt");
            then.status(200).body("# comment\n130.0a1\n");
        });

        let text = transport(3)
            .get_text(&server.url("/milestone.txt"))
            .await
            .unwrap();
        assert!(text.ends_with("130.0a1\n"));
        assert_eq!(ok.calls(), 1);
    }

    #[tokio::test]
    async fn retries_server_errors_until_exhausted() {
        let server = MockServer::start();
        let failing = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503).body("unavailable");
        });

        let err = transport(2)
            .get_text(&server.url("/flaky"))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Api { status: 503, .. }));
        assert_eq!(failing.calls(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start();
        let missing = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("not found");
        });

        let err = transport(3)
            .get_text(&server.url("/missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Api { status: 404, .. }));
        assert_eq!(missing.calls(), 1);
    }

    #[tokio::test]
    async fn get_json_reports_parse_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/json");
            then.status(200).body("not json");
        });

        let err = transport(0)
            .get_json::<serde_json::Value>(&server.url("/json"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Parse(_)));
    }

    #[tokio::test]
    async fn timed_out_get_is_retried() {
        let server = MockServer::start();
        let slow = server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(3));
        });

        let err = transport_with_timeout(1, 1)
            .get_text(&server.url("/slow"))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Network(_)));
        assert_eq!(slow.calls(), 2);
    }

    #[tokio::test]
    async fn timed_out_put_is_not_retried() {
        let server = MockServer::start();
        let slow = server.mock(|when, then| {
            when.method(PUT).path("/rest/bug/1");
            then.status(200).delay(Duration::from_secs(3));
        });

        let url = server.url("/rest/bug/1");
        let err = transport_with_timeout(3, 1)
            .send(|client| client.put(&url).body("{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Network(_)));
        assert_eq!(slow.calls(), 1);
    }
}
