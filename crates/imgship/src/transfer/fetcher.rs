// ai
//! 📥 Fetcher — pulls image bytes off somebody else's CDN.
//!
//! GET the URL, read the body, hand back the bytes. If the CDN sneezes (timeout, reset, 5xx)
//! we wait and try again. If it says 404 we believe it the first time.

use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::common::ErrorKind;
use crate::transfer::classify::{classify_reqwest_error, classify_status};
use crate::transfer::retry::{AttemptError, RetryPolicy, retry};

/// 💀 A fetch that didn't make it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("fetch of '{locator}' ended {kind} after {attempts} attempt(s): {last_cause}")]
pub struct FetchError {
    pub kind: ErrorKind,
    pub locator: String,
    pub attempts: u32,
    pub last_cause: String,
}

/// 🖼️ Bytes plus the number of attempts it took to get them.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Bytes,
    pub attempts: u32,
}

/// 📡 HTTP fetcher with per-attempt timeout and retry.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    /// 🚀 Builds the HTTP client. The per-attempt timeout is enforced by the retry loop,
    /// so the client only gets a connect timeout.
    pub fn new(policy: RetryPolicy) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("💀 The HTTP client for fetching images refused to be born. Probably the TLS stack. It's always the TLS stack.")?;
        Ok(Self { client, policy })
    }

    /// 📥 Fetches `locator`, retrying transient failures up to the policy's cap.
    pub async fn fetch(&self, locator: &str, cancel: &CancellationToken) -> Result<Fetched, FetchError> {
        let url = match parse_locator(locator) {
            Ok(url) => url,
            Err(cause) => {
                return Err(FetchError {
                    kind: ErrorKind::Permanent,
                    locator: locator.to_string(),
                    attempts: 1,
                    last_cause: cause,
                });
            }
        };

        let what = format!("GET {}", locator);
        retry(&self.policy, cancel, &what, |attempt| {
            let url = url.clone();
            async move {
                trace!("📥 fetching {} (attempt {})", url, attempt);
                self.fetch_once(url).await
            }
        })
        .await
        .map(|retried| Fetched {
            bytes: retried.value,
            attempts: retried.attempts,
        })
        .map_err(|failure| FetchError {
            kind: failure.kind,
            locator: locator.to_string(),
            attempts: failure.attempts,
            last_cause: failure.last_cause,
        })
    }

    async fn fetch_once(&self, url: reqwest::Url) -> Result<Bytes, AttemptError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, "GET"));
        }

        response.bytes().await.map_err(classify_reqwest_error)
    }
}

/// 🔍 Only absolute http(s) URLs are fetchable. Anything else is a permanent failure.
fn parse_locator(locator: &str) -> Result<reqwest::Url, String> {
    let url = reqwest::Url::parse(locator.trim())
        .map_err(|e| format!("malformed locator '{}': {}", locator, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{}' in locator '{}'", other, locator)),
    }
}
