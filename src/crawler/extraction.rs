//! Extraction service client
//!
//! Turning page text into listing fields is delegated to an external
//! service. [`ExtractionService`] is the seam; [`HttpExtractionService`] is
//! the production implementation speaking JSON over HTTP.

use crate::config::ExtractionConfig;
use crate::listing::{FieldSpec, RawValue, CANONICAL_SCHEMA};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// One listing as returned by the extraction service
pub type ExtractedRecord = BTreeMap<String, RawValue>;

/// Input for a single extraction call
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub page_text: String,
    pub source_url: Url,
    pub schema: &'static [FieldSpec],
}

impl ExtractionRequest {
    /// Builds a request against the canonical schema, truncating the page
    /// text to `max_chars` characters
    pub fn new(page_text: &str, source_url: Url, max_chars: usize) -> Self {
        let page_text = match page_text.char_indices().nth(max_chars) {
            Some((cut, _)) => page_text[..cut].to_string(),
            None => page_text.to_string(),
        };

        Self {
            page_text,
            source_url,
            schema: CANONICAL_SCHEMA,
        }
    }
}

/// Extraction failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionError {
    #[error("extraction service rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("extraction service returned malformed output: {0}")]
    MalformedInput(String),

    #[error("extraction service unavailable: {0}")]
    Unavailable(String),
}

/// Converts page text into listing records
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError>;
}

#[derive(Serialize)]
struct WireRequest<'a> {
    text: &'a str,
    source_url: &'a str,
    schema: &'a [FieldSpec],
}

/// JSON-over-HTTP extraction service
///
/// POSTs `{"text", "source_url", "schema"}` to the endpoint. The response
/// body must be a JSON array of objects, or an object with a `listings`
/// array.
#[derive(Debug, Clone)]
pub struct HttpExtractionService {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpExtractionService {
    pub fn new(
        endpoint: Url,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    /// Builds the service from configuration, reading the API key from the
    /// environment variable named in `api-key-env`
    pub fn from_config(config: &ExtractionConfig) -> crate::Result<Self> {
        let endpoint = Url::parse(&config.endpoint)?;
        let api_key = match &config.api_key_env {
            Some(var) => match std::env::var(var) {
                Ok(key) => Some(key),
                Err(_) => {
                    tracing::warn!("Environment variable {} is not set; calling extraction without a key", var);
                    None
                }
            },
            None => None,
        };

        Ok(Self::new(
            endpoint,
            api_key,
            Duration::from_millis(config.timeout_ms),
        )?)
    }
}

#[async_trait]
impl ExtractionService for HttpExtractionService {
    async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        let body = WireRequest {
            text: &request.page_text,
            source_url: request.source_url.as_str(),
            schema: request.schema,
        };

        let mut builder = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ExtractionError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ExtractionError::RateLimited { retry_after });
        }
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(ExtractionError::MalformedInput(format!(
                "service rejected the request with {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(ExtractionError::Unavailable(format!("HTTP {}", status)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ExtractionError::Unavailable(e.to_string()))?;

        parse_extraction_body(&text)
    }
}

/// Parses an extraction response body into records
///
/// Accepts a bare array or `{"listings": [...]}`, optionally wrapped in a
/// Markdown code fence.
pub fn parse_extraction_body(body: &str) -> Result<Vec<ExtractedRecord>, ExtractionError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(body))
        .map_err(|e| ExtractionError::MalformedInput(e.to_string()))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("listings") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(ExtractionError::MalformedInput(
                    "expected a \"listings\" array".to_string(),
                ))
            }
        },
        other => {
            return Err(ExtractionError::MalformedInput(format!(
                "expected a JSON array, got {}",
                other
            )))
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::Object(fields) => Ok(fields
                .into_iter()
                .map(|(name, value)| (name, RawValue::from(value)))
                .collect()),
            other => Err(ExtractionError::MalformedInput(format!(
                "expected a listing object, got {}",
                other
            ))),
        })
        .collect()
}

fn strip_code_fence(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string ("json") on the opening fence line
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Retry schedules for extraction calls
#[derive(Debug, Clone)]
pub struct ExtractionRetry {
    /// Used for `Unavailable`
    pub unavailable: RetryPolicy,

    /// Used for `RateLimited`; usually slower
    pub rate_limited: RetryPolicy,

    /// Deadline for one call; a call that runs over counts as `Unavailable`
    pub call_timeout: Duration,
}

/// Calls the service, retrying rate limits and outages on separate schedules
///
/// `MalformedInput` is returned immediately. A `retry_after` hint from the
/// service replaces the computed delay when it is longer. Each call is bounded
/// by `retry.call_timeout`.
pub async fn extract_with_retry(
    service: &dyn ExtractionService,
    request: &ExtractionRequest,
    retry: &ExtractionRetry,
    cancel: &CancellationToken,
) -> Result<Vec<ExtractedRecord>, ExtractionError> {
    let mut unavailable_attempts = 0;
    let mut rate_limited_attempts = 0;

    loop {
        let error = match tokio::time::timeout(retry.call_timeout, service.extract(request)).await {
            Ok(Ok(records)) => return Ok(records),
            Ok(Err(e)) => e,
            Err(_) => ExtractionError::Unavailable(format!(
                "no response within {:?}",
                retry.call_timeout
            )),
        };

        let delay = match &error {
            ExtractionError::MalformedInput(_) => return Err(error),
            ExtractionError::RateLimited { retry_after } => {
                rate_limited_attempts += 1;
                if !retry.rate_limited.should_retry(rate_limited_attempts) {
                    return Err(error);
                }
                let computed = retry.rate_limited.delay_for(rate_limited_attempts);
                retry_after.map_or(computed, |hint| hint.max(computed))
            }
            ExtractionError::Unavailable(_) => {
                unavailable_attempts += 1;
                if !retry.unavailable.should_retry(unavailable_attempts) {
                    return Err(error);
                }
                retry.unavailable.delay_for(unavailable_attempts)
            }
        };

        tracing::debug!(
            "Extraction for {} failed ({}), retrying in {:?}",
            request.source_url,
            error,
            delay
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(error),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
