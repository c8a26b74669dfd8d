use chrono::{DateTime, Utc};
use reqwest::header::IF_MODIFIED_SINCE;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Why a feed could not be fetched. Never fatal: the feed is skipped for the cycle.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(StatusCode),
}

/// HTTP client for feed documents. One attempt per feed, no retries.
#[derive(Clone)]
pub struct FeedClient {
    http_client: Client,
}

impl FeedClient {
    pub fn new(allow_invalid_certs: bool, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder().danger_accept_invalid_certs(allow_invalid_certs);

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(FeedClient {
            http_client: builder.build()?,
        })
    }

    /// Downloads `url` unless it has not changed since `since`.
    ///
    /// Returns `None` for "not modified" and for any failure; failures are logged.
    #[tracing::instrument(name = "Fetching a feed", skip(self))]
    pub async fn fetch(&self, url: &str, since: DateTime<Utc>) -> Option<String> {
        match self.try_fetch(url, since).await {
            Ok(Some(body)) => Some(body),
            Ok(None) => {
                tracing::debug!("Feed {} not modified since {}", url, since);
                None
            }
            Err(err) => {
                tracing::warn!("Failed to fetch {}: {}", url, err);
                None
            }
        }
    }

    async fn try_fetch(&self, url: &str, since: DateTime<Utc>) -> Result<Option<String>, FetchError> {
        let response = self
            .http_client
            .get(url)
            .header(IF_MODIFIED_SINCE, http_date(since))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status()));
        }

        Ok(Some(response.text().await?))
    }
}

/// Formats a timestamp as an IMF-fixdate, the form HTTP date headers use.
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
