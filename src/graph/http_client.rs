use crate::config::ApiConfig;
use crate::errors::{FetchError, TransportError};
use crate::models::Page;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};
use url::Url;

const LOG_BODY_LIMIT: usize = 500;

// ── Transport ─────────────────────────────────────────────────────────────────

/// Status, body and `Retry-After` of a single GET.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

/// One HTTP GET, no retries. Swappable so the fetcher can run against mocks.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

pub struct ReqwestTransport {
    inner: reqwest::Client,
    token: String,
}

impl ReqwestTransport {
    pub fn new(config: &ApiConfig, token: &str) -> anyhow::Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let resp = self.inner.get(url).bearer_auth(&self.token).send().await?;
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = resp.text().await?;
        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Only the delta-seconds form; HTTP-dates fall back to computed backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// ── Fetcher ───────────────────────────────────────────────────────────────────

enum Verdict {
    Retry { reason: String, wait: Option<Duration> },
    Fail(FetchError),
}

fn classify(url: &str, resp: RawResponse) -> Verdict {
    let reason = format!("HTTP {}", resp.status);
    match resp.status {
        429 => Verdict::Retry {
            reason,
            wait: resp.retry_after,
        },
        500..=599 => Verdict::Retry { reason, wait: None },
        // Throttling is sometimes reported as a plain 400
        400 if resp.body.to_lowercase().contains("too many calls") => {
            Verdict::Retry { reason, wait: None }
        }
        status => Verdict::Fail(FetchError::Fatal {
            url: loggable(url),
            status,
            body: resp.body,
        }),
    }
}

/// Retry-aware JSON GET plus cursor pagination.
pub struct HttpClient {
    transport: Arc<dyn HttpTransport>,
    config: ApiConfig,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &ApiConfig) -> Self {
        Self {
            transport,
            config: config.clone(),
        }
    }

    /// Single request with retries.
    pub async fn fetch(&self, url: &str, params: &[(&str, String)]) -> Result<Value, FetchError> {
        let url = with_params(url, params)?;
        self.get_json(&url).await
    }

    /// Lazy page sequence starting at `url`. Nothing is requested until
    /// the first `next_page`.
    pub fn pages(&self, url: &str, params: &[(&str, String)]) -> Result<PageCursor<'_>, FetchError> {
        Ok(PageCursor {
            client: self,
            next: Some(with_params(url, params)?),
            fetched: 0,
        })
    }

    /// Every page, in order, until the cursor runs out or `max_pages` is hit.
    pub async fn fetch_all(&self, url: &str, params: &[(&str, String)]) -> Result<Vec<Page>, FetchError> {
        let mut cursor = self.pages(url, params)?;
        let mut pages = Vec::new();
        while let Some(page) = cursor.next_page().await {
            pages.push(page?);
        }
        Ok(pages)
    }

    /// `fetch_all`, flattened to the `data` items.
    pub async fn fetch_all_items(&self, url: &str, params: &[(&str, String)]) -> Result<Vec<Value>, FetchError> {
        let pages = self.fetch_all(url, params).await?;
        Ok(pages.into_iter().flat_map(|p| p.data).collect())
    }

    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let max_attempts = self.config.max_retries.max(1);
        let mut delays = self.backoff();
        let mut last_reason = String::from("no attempts made");

        for attempt in 1..=max_attempts {
            debug!(url = %loggable(url), attempt, "GET");

            let wait = match self.transport.get(url).await {
                Ok(resp) if (200..300).contains(&resp.status) => {
                    return serde_json::from_str(&resp.body).map_err(|e| FetchError::Decode {
                        url: loggable(url),
                        reason: e.to_string(),
                    });
                }
                Ok(resp) => {
                    warn!(
                        status = resp.status,
                        attempt,
                        url = %loggable(url),
                        body = %truncate(&resp.body, LOG_BODY_LIMIT),
                        "Upstream returned an error"
                    );
                    match classify(url, resp) {
                        Verdict::Retry { reason, wait } => {
                            last_reason = reason;
                            wait
                        }
                        Verdict::Fail(e) => return Err(e),
                    }
                }
                Err(e) => {
                    warn!(attempt, url = %loggable(url), "Request failed: {}", e);
                    last_reason = format!("transport error: {}", e);
                    None
                }
            };

            let backoff = delays.next().unwrap_or_else(|| self.max_backoff());
            if attempt < max_attempts {
                let delay = match wait {
                    Some(server) => server.min(self.max_backoff()),
                    None => backoff + self.jitter(),
                };
                debug!("Retrying {} in {:?}", loggable(url), delay);
                sleep(delay).await;
            }
        }

        Err(FetchError::Transient {
            url: loggable(url),
            attempts: max_attempts,
            reason: last_reason,
        })
    }

    /// base × 2^attempt, capped at `max_backoff_secs`.
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::from_millis(2)
            .factor(self.config.base_delay_ms)
            .max_delay(self.max_backoff())
    }

    fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.config.max_backoff_secs)
    }

    fn jitter(&self) -> Duration {
        Duration::from_millis(rand::random_range(0..=self.config.jitter_ms))
    }
}

/// Cursor over a paginated collection; restartable only by asking the
/// client for a new one.
pub struct PageCursor<'a> {
    client: &'a HttpClient,
    next: Option<String>,
    fetched: usize,
}

impl PageCursor<'_> {
    pub async fn next_page(&mut self) -> Option<Result<Page, FetchError>> {
        let url = self.next.take()?;

        if self.fetched >= self.client.config.max_pages {
            warn!(
                "Reached page limit ({}) at {}, stopping",
                self.client.config.max_pages,
                loggable(&url)
            );
            return None;
        }
        self.fetched += 1;

        let page = self.client.get_json(&url).await.and_then(|value| {
            serde_json::from_value::<Page>(value).map_err(|e| FetchError::Decode {
                url: loggable(&url),
                reason: e.to_string(),
            })
        });

        if let Ok(page) = &page {
            debug!("Page {}: {} items", self.fetched, page.data.len());
            // Cursor URLs already carry every query parameter
            self.next = page.next_cursor().map(str::to_string);
        }
        Some(page)
    }

    pub fn pages_fetched(&self) -> usize {
        self.fetched
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn with_params(url: &str, params: &[(&str, String)]) -> Result<String, FetchError> {
    let parsed = if params.is_empty() {
        Url::parse(url)
    } else {
        Url::parse_with_params(url, params.iter().map(|(k, v)| (*k, v.as_str())))
    };
    parsed.map(String::from).map_err(|e| FetchError::Decode {
        url: url.to_string(),
        reason: format!("invalid URL: {}", e),
    })
}

/// URL without its query string; cursor URLs embed the access token.
pub fn loggable(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut u) => {
            u.set_query(None);
            u.to_string()
        }
        Err(_) => url.split('?').next().unwrap_or_default().to_string(),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ── Test transport ────────────────────────────────────────────────────────────
