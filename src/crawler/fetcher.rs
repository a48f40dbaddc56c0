//! HTTP fetcher
//!
//! Builds the shared client and fetches single pages, classifying failures
//! into transient (retried with backoff) and permanent ones.

use crate::config::UserAgentConfig;
use crate::retry::RetryPolicy;
use reqwest::{
    header::{CONTENT_TYPE, LOCATION},
    redirect::Policy,
    Client, StatusCode,
};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Why a page could not be fetched
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("not an HTML page: {0}")]
    NotHtml(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("redirect without a usable Location (HTTP {0})")]
    BadRedirect(u16),

    #[error("more than {0} redirects")]
    TooManyRedirects(usize),
}

impl FetchError {
    /// Returns true for failures worth retrying
    ///
    /// | Failure | Retried |
    /// |---------|---------|
    /// | Timeout, connection error | yes |
    /// | HTTP 429, HTTP 5xx | yes |
    /// | Truncated body | yes |
    /// | Other 4xx | no |
    /// | Non-HTML content | no |
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) | Self::Body(_) => true,
            Self::Status(code) => {
                *code == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(code)
            }
            Self::NotHtml(_)
            | Self::Request(_)
            | Self::BadRedirect(_)
            | Self::TooManyRedirects(_) => false,
        }
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else if error.is_body() || error.is_decode() {
            Self::Body(error.to_string())
        } else {
            Self::Request(error.to_string())
        }
    }
}

/// Redirect hops followed for one frontier entry
pub const MAX_REDIRECTS: usize = 10;

/// A successfully fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL the body was served from
    pub final_url: Url,

    pub status_code: u16,

    pub body: String,
}

/// What a single request returned
#[derive(Debug, Clone)]
pub enum FetchResponse {
    Page(FetchedPage),

    /// A 3xx response; the target is resolved against the requested URL
    Redirect(Url),
}

/// Builds an HTTP client with the crawler's user agent
///
/// # Example
///
/// ```no_run
/// use listing_relay::config::UserAgentConfig;
/// use listing_relay::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "ListingRelay".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(15)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none()) // Redirects go through the frontier
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a single page once
///
/// Redirects are not followed; they come back as [`FetchResponse::Redirect`].
/// A missing Content-Type is accepted; anything other than HTML is rejected
/// as [`FetchError::NotHtml`].
pub async fn fetch_page(client: &Client, url: &Url) -> Result<FetchResponse, FetchError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(FetchError::from_reqwest)?;

    let status = response.status();
    if status.is_redirection() {
        let target = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| url.join(location).ok())
            .ok_or(FetchError::BadRedirect(status.as_u16()))?;
        return Ok(FetchResponse::Redirect(target));
    }

    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if !content_type.is_empty()
        && !content_type.contains("text/html")
        && !content_type.contains("application/xhtml")
    {
        return Err(FetchError::NotHtml(content_type));
    }

    let final_url = response.url().clone();
    let body = response.text().await.map_err(FetchError::from_reqwest)?;

    Ok(FetchResponse::Page(FetchedPage {
        final_url,
        status_code: status.as_u16(),
        body,
    }))
}

/// Fetches a page, retrying transient failures according to `policy`
///
/// Returns the last error once the policy is spent, or as soon as `cancel`
/// fires during a backoff wait.
pub async fn fetch_with_retry(
    client: &Client,
    url: &Url,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<FetchResponse, FetchError> {
    let mut attempts = 0;

    loop {
        attempts += 1;
        let error = match fetch_page(client, url).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        if !error.is_transient() || !policy.should_retry(attempts) {
            return Err(error);
        }

        let delay = policy.delay_for(attempts);
        tracing::debug!(
            "Fetch of {} failed ({}), retry {} in {:?}",
            url,
            error,
            attempts,
            delay
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(error),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
