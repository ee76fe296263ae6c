use reqwest::header::{HeaderMap, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; Weblens/0.3; +https://weblens.dev/bot)";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Typed fetch failures. Non-2xx responses are not failures; the status is
/// part of the fetched page.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url: {url}")]
    InvalidUrl { url: String },

    #[error("connection failed for {url}: {message}")]
    Connection { url: String, message: String },

    #[error("request deadline exceeded for {url}")]
    Timeout { url: String },

    #[error("response body exceeds {limit} bytes for {url}")]
    TooLarge { url: String, limit: usize },

    #[error("redirect limit exceeded for {url}")]
    TooManyRedirects { url: String },

    #[error("failed to build HTTP client: {message}")]
    Client { message: String },
}

/// Fetcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Default user agent, overridable per request
    pub user_agent: String,
    /// Per-request deadline
    pub timeout: Duration,
    /// Body size cap; larger responses are rejected with `TooLarge`
    pub max_body_bytes: usize,
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

/// Wall-clock timings for one fetch. Sub-timings the transport does not
/// expose stay `None`; `total_ms` is always populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchTimings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_ms: Option<f64>,
    /// Time to first byte (response headers received)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_ms: Option<f64>,
    /// Body transfer time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_ms: Option<f64>,
    pub total_ms: f64,
}

/// The outcome of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    /// Response headers, keys lowercased
    pub headers: HashMap<String, String>,
    pub body: String,
    pub timings: FetchTimings,
}

/// HTTP fetcher with a shared connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .gzip(true)
            .brotli(true)
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| FetchError::Client {
                message: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(FetcherConfig::default())
    }

    /// Fetch a page, honoring an optional user-agent override and deadline.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &str,
        user_agent: Option<&str>,
        deadline: Option<Duration>,
    ) -> Result<FetchedPage, FetchError> {
        let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .expect("static header value"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            "en-US,en;q=0.9".parse().expect("static header value"),
        );
        headers.insert(
            ACCEPT_ENCODING,
            "gzip, br".parse().expect("static header value"),
        );
        let agent = user_agent.unwrap_or(&self.config.user_agent);
        headers.insert(
            USER_AGENT,
            agent.parse().map_err(|_| FetchError::InvalidUrl {
                url: url.to_string(),
            })?,
        );

        let started = Instant::now();
        let response = self
            .client
            .get(parsed)
            .headers(headers)
            .timeout(deadline.unwrap_or(self.config.timeout))
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;
        let first_byte = started.elapsed();

        let status = response.status().as_u16();
        let response_headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        // Reject early when the server declares an oversized body.
        if let Some(len) = response.content_length() {
            if len as usize > self.config.max_body_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: self.config.max_body_bytes,
                });
            }
        }

        let transfer_started = Instant::now();
        let mut body = Vec::new();
        let mut response = response;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if body.len() + chunk.len() > self.config.max_body_bytes {
                        // Dropping the response releases the connection.
                        return Err(FetchError::TooLarge {
                            url: url.to_string(),
                            limit: self.config.max_body_bytes,
                        });
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => return Err(self.classify(url, e)),
            }
        }
        let transfer = transfer_started.elapsed();
        let total = started.elapsed();

        let timings = FetchTimings {
            dns_ms: None,
            connect_ms: None,
            tls_ms: None,
            server_ms: Some(first_byte.as_secs_f64() * 1000.0),
            transfer_ms: Some(transfer.as_secs_f64() * 1000.0),
            total_ms: total.as_secs_f64() * 1000.0,
        };

        debug!(
            status = status,
            bytes = body.len(),
            total_ms = timings.total_ms,
            "fetch completed"
        );

        Ok(FetchedPage {
            url: url.to_string(),
            status,
            headers: response_headers,
            body: String::from_utf8_lossy(&body).into_owned(),
            timings,
        })
    }

    fn classify(&self, url: &str, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            return FetchError::Timeout {
                url: url.to_string(),
            };
        }
        if error.is_redirect() {
            return FetchError::TooManyRedirects {
                url: url.to_string(),
            };
        }
        if error.is_connect() {
            return FetchError::Connection {
                url: url.to_string(),
                message: error.to_string(),
            };
        }
        warn!(url = %url, error = %error, "unclassified transport error");
        FetchError::Connection {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_returns_status_headers_body_and_timings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Powered-By", "PHP/8.2")
                    .set_body_string("<html><body>hello</body></html>"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::with_defaults().unwrap();
        let page = fetcher
            .fetch(&format!("{}/page", server.uri()), None, None)
            .await
            .unwrap();

        assert_eq!(page.status, 200);
        assert_eq!(page.headers.get("x-powered-by").unwrap(), "PHP/8.2");
        assert!(page.body.contains("hello"));
        assert!(page.timings.total_ms > 0.0);
        assert!(page.timings.server_ms.is_some());
    }

    #[tokio::test]
    async fn non_2xx_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::with_defaults().unwrap();
        let page = fetcher
            .fetch(&format!("{}/missing", server.uri()), None, None)
            .await
            .unwrap();
        assert_eq!(page.status, 404);
    }

    #[tokio::test]
    async fn user_agent_override_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ua"))
            .and(header("user-agent", "custom-agent/1.0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::with_defaults().unwrap();
        fetcher
            .fetch(
                &format!("{}/ua", server.uri()),
                Some("custom-agent/1.0"),
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64 * 1024)))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(FetcherConfig {
            max_body_bytes: 1024,
            ..FetcherConfig::default()
        })
        .unwrap();

        let err = fetcher
            .fetch(&format!("{}/big", server.uri()), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn deadline_is_enforced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::with_defaults().unwrap();
        let err = fetcher
            .fetch(
                &format!("{}/slow", server.uri()),
                None,
                Some(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let fetcher = Fetcher::with_defaults().unwrap();
        let err = fetcher
            .fetch("ftp://example.com/file", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));

        let err = fetcher.fetch("not a url", None, None).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
