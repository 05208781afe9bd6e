//! HTTP client for the rating API.
//!
//! Epistemic foundation:
//! - K_i: Every endpoint pages the same way
//! - B_i: A request may fail → `SourceError`, retried when transient
//! - I^R: Timeout, attempts and page size come from `[source]`
//!
//! Endpoints (all paginated, `?page=N&per_page=M`):
//! - `GET {base}/clubs?prefix=…`
//! - `GET {base}/clubs/{id}/players`
//! - `GET {base}/players/{id}/history`
//!
//! Network errors, timeouts, 429 and 5xx are retried with exponential
//! backoff. 401 and 404 are returned immediately.

use crate::client::{RateLimiter, RateLimiterStats, RatingSource, SourceResult};
use crate::models::{Club, Config, Player, RatingPoint, ScanError, SourceError};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// One page of a listing.
#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    #[serde(default = "first_page")]
    page: u32,
    #[serde(default = "first_page")]
    total_pages: u32,
}

fn first_page() -> u32 {
    1
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    message: String,
}

/// Rating API client implementing [`RatingSource`].
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    timeout: Duration,
    max_retries: u32,
    page_size: u32,
    rate_limiter: Arc<RateLimiter>,
    pages_fetched: AtomicU64,
}

impl HttpSource {
    /// Create a new client.
    pub fn new(
        base_url: String,
        api_token: Option<String>,
        timeout_secs: u64,
        max_retries: u32,
        page_size: u32,
        rate_limiter: Option<Arc<RateLimiter>>,
    ) -> Result<Self, ScanError> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ratingscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SourceError::Network)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            timeout,
            max_retries: max_retries.max(1),
            page_size,
            rate_limiter: rate_limiter.unwrap_or_default(),
            pages_fetched: AtomicU64::new(0),
        })
    }

    /// Build a client from the `[source]` configuration section.
    pub fn from_config(config: &Config) -> Result<Self, ScanError> {
        config.validate()?;
        Self::new(
            config.source.base_url.clone(),
            config.resolve_api_token(),
            config.source.timeout_secs,
            config.source.max_retries,
            config.source.page_size,
            None,
        )
    }

    pub fn stats(&self) -> (u64, RateLimiterStats) {
        (
            self.pages_fetched.load(Ordering::Relaxed),
            self.rate_limiter.stats(),
        )
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.api_token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    /// GET one JSON document with retries.
    async fn get_json<T: DeserializeOwned>(
        &self,
        route: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> SourceResult<T> {
        let mut last_error: Option<SourceError> = None;

        for attempt in 0..self.max_retries {
            let is_last = attempt + 1 == self.max_retries;
            self.rate_limiter.wait_if_needed(route).await;

            let response = self
                .client
                .get(url)
                .headers(self.headers())
                .query(query)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        SourceError::Timeout(self.timeout)
                    } else {
                        SourceError::Network(e)
                    });
                    if !is_last {
                        let backoff = Duration::from_secs(2u64.pow(attempt));
                        debug!(
                            url,
                            attempt,
                            backoff_secs = backoff.as_secs(),
                            "Retrying after network error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<f64>().ok());
            self.rate_limiter.record(route, status, retry_after);

            if status == 429 {
                last_error = Some(SourceError::RateLimited {
                    retry_after_secs: retry_after.unwrap_or(1.0),
                });
                // The limiter holds the route in backoff; the next attempt waits there
                continue;
            }

            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorResponse>(&body)
                    .map(|e| e.message)
                    .unwrap_or(body);

                let error = match status {
                    401 | 403 => SourceError::AuthenticationFailed,
                    404 => SourceError::NotFound(url.to_string()),
                    _ => SourceError::Api { status, message },
                };
                if !error.is_retryable() {
                    return Err(error);
                }
                last_error = Some(error);
                if !is_last {
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
                continue;
            }

            return response
                .json::<T>()
                .await
                .map_err(|e| SourceError::InvalidResponse(format!("{url}: {e}")));
        }

        Err(SourceError::MaxRetriesExceeded {
            attempts: self.max_retries,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    /// Fetch every page of a listing and flatten it.
    async fn get_all<T: DeserializeOwned>(
        &self,
        route: &str,
        url: &str,
        filters: &[(&str, String)],
    ) -> SourceResult<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let mut query: Vec<(&str, String)> = filters.to_vec();
            query.push(("page", page.to_string()));
            query.push(("per_page", self.page_size.to_string()));

            let body: Page<T> = self.get_json(route, url, &query).await?;
            self.pages_fetched.fetch_add(1, Ordering::Relaxed);

            let received = body.items.len();
            items.extend(body.items);

            if received == 0 || body.page >= body.total_pages {
                break;
            }
            page = body.page + 1;
        }

        debug!(route, url, count = items.len(), "Listing fetched");
        Ok(items)
    }
}

#[async_trait]
impl RatingSource for HttpSource {
    async fn list_clubs(&self, prefix: &str) -> SourceResult<Vec<Club>> {
        let url = format!("{}/clubs", self.base_url);
        let filters = if prefix.is_empty() {
            Vec::new()
        } else {
            vec![("prefix", prefix.to_string())]
        };
        let clubs: Vec<Club> = self.get_all("clubs", &url, &filters).await?;
        // The server-side filter is advisory
        Ok(clubs
            .into_iter()
            .filter(|c| c.id.starts_with(prefix))
            .collect())
    }

    async fn list_players(&self, club_id: &str) -> SourceResult<Vec<Player>> {
        let url = format!("{}/clubs/{}/players", self.base_url, club_id);
        self.get_all("players", &url, &[]).await
    }

    async fn fetch_history(&self, player_id: &str) -> SourceResult<Vec<RatingPoint>> {
        let url = format!("{}/players/{}/history", self.base_url, player_id);
        self.get_all("history", &url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let page: Page<Club> =
            serde_json::from_str(r#"{"items":[{"id":"c1","name":"One"}]}"#).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_history_page_parses() {
        let page: Page<RatingPoint> = serde_json::from_str(
            r#"{"items":[{"period":"2023-01-01","rating":1712,"games":9,"points":5.5}],"page":2,"total_pages":3}"#,
        )
        .unwrap();
        assert_eq!(page.items[0].rating, 1712);
        assert_eq!(page.page, 2);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let source = HttpSource::new(
            "https://ratings.example.org/api/".to_string(),
            Some("secret".to_string()),
            5,
            0,
            50,
            None,
        )
        .unwrap();
        assert_eq!(source.base_url, "https://ratings.example.org/api");
        assert_eq!(source.max_retries, 1);
        assert!(source.headers().contains_key(AUTHORIZATION));
    }

    #[test]
    fn test_from_config_rejects_invalid_source() {
        let config = Config::from_toml("[source]\nbase_url = \"  \"\n").unwrap();
        let err = HttpSource::from_config(&config).err().unwrap();
        assert!(matches!(err, ScanError::Config(_)));
        assert!(err.to_string().contains("base_url"));

        let config =
            Config::from_toml("[source]\nbase_url = \"https://ratings.example.org/\"\n").unwrap();
        let source = HttpSource::from_config(&config).unwrap();
        assert_eq!(source.base_url, "https://ratings.example.org");
    }
}
