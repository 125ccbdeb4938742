// ai
//! ☁️ GCS — the bucket at the end of the pipeline.
//!
//! Speaks the Cloud Storage XML API because it's the boring one: `HEAD /{bucket}/{key}` to ask
//! "is it there?", `PUT /{bucket}/{key}` to make it so. PUT replaces the whole object,
//! which is exactly the overwrite-by-key contract retries need.
//!
//! 🔒 Auth, pick at most one:
//! - a service account key (a path, or the JSON itself): object_store's GCP credential
//!   provider mints and refreshes the OAuth2 tokens for us.
//! - a pre-minted bearer token (`gcloud auth print-access-token`, a sidecar, a prayer).
//! - nothing, for emulators.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::CredentialProvider;
use object_store::gcp::{GcpCredentialProvider, GoogleCloudStorageBuilder};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::backends::{ObjectStore, UploadReceipt};
use crate::transfer::classify::{classify_reqwest_error, classify_status};
use crate::transfer::retry::AttemptError;

#[derive(Debug, Deserialize, Clone)]
pub struct GcsStoreConfig {
    /// 📡 Storage endpoint. Point it at an emulator for local runs.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// 🪣 Target bucket. Must already exist; we check at startup.
    pub bucket: String,
    /// 🔒 OAuth2 access token, sent as `Authorization: Bearer ...`.
    #[serde(default)]
    pub access_token: Option<String>,
    /// 🪪 Path to a service account JSON key file.
    #[serde(default)]
    pub service_account_path: Option<String>,
    /// 🪪 The service account JSON key itself, for deployments that hand secrets over as env vars.
    #[serde(default)]
    pub service_account_key: Option<String>,
}

fn default_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

/// 🔒 How requests get their `Authorization` header.
enum GcsAuth {
    Anonymous,
    Token(String),
    ServiceAccount(GcpCredentialProvider),
}

// 🐛 Never print a token. Not even in a debug log at 3 AM.
impl std::fmt::Debug for GcsAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            GcsAuth::Anonymous => "anonymous",
            GcsAuth::Token(_) => "bearer token",
            GcsAuth::ServiceAccount(_) => "service account",
        };
        f.write_str(label)
    }
}

impl GcsAuth {
    fn from_config(config: &GcsStoreConfig) -> Result<Self> {
        let configured = [
            config.access_token.is_some(),
            config.service_account_path.is_some(),
            config.service_account_key.is_some(),
        ];
        if configured.iter().filter(|set| **set).count() > 1 {
            anyhow::bail!(
                "💀 Bucket '{}' has more than one kind of credential configured. Pick one of access_token, service_account_path, service_account_key.",
                config.bucket
            );
        }

        let builder = GoogleCloudStorageBuilder::new().with_bucket_name(&config.bucket);
        let builder = match (&config.service_account_path, &config.service_account_key) {
            (Some(path), _) => builder.with_service_account_path(path),
            (None, Some(key)) => builder.with_service_account_key(key),
            (None, None) => {
                return Ok(match &config.access_token {
                    Some(token) => GcsAuth::Token(token.clone()),
                    None => GcsAuth::Anonymous,
                });
            }
        };
        let storage = builder.build().context(format!(
            "💀 The service account credentials for bucket '{}' didn't make sense to object_store. Check the key JSON.",
            config.bucket
        ))?;
        Ok(GcsAuth::ServiceAccount(storage.credentials().clone()))
    }

    /// 🎟️ The bearer token for the next request, if any. Service account tokens are cached
    /// and refreshed by the provider; asking is cheap.
    async fn bearer(&self) -> Result<Option<String>, AttemptError> {
        match self {
            GcsAuth::Anonymous => Ok(None),
            GcsAuth::Token(token) => Ok(Some(token.clone())),
            GcsAuth::ServiceAccount(provider) => {
                let credential = provider
                    .get_credential()
                    .await
                    .map_err(|e| AttemptError::Transient(format!("couldn't mint an access token: {}", e)))?;
                Ok(Some(credential.bearer.clone()).filter(|bearer| !bearer.is_empty()))
            }
        }
    }
}

/// ☁️ Object store over the GCS XML API. One client, shared by every worker.
pub(crate) struct GcsStore {
    client: reqwest::Client,
    auth: GcsAuth,
    config: GcsStoreConfig,
}

impl std::fmt::Debug for GcsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsStore")
            .field("endpoint", &self.config.endpoint)
            .field("bucket", &self.config.bucket)
            .field("auth", &self.auth)
            .finish()
    }
}

impl GcsStore {
    /// 🚀 Builds the client and knocks on the bucket once.
    ///
    /// A missing bucket or a rejected token fails here, at startup,
    /// instead of as ten thousand identical upload failures later.
    pub(crate) async fn new(config: GcsStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("💀 The HTTP client for the bucket refused to be born. The TLS stack wept.")?;

        let auth = GcsAuth::from_config(&config)?;
        debug!("🔒 bucket '{}' will be reached with {:?} credentials", config.bucket, auth);
        let store = Self { client, auth, config };
        let bucket_url = store.bucket_url()?;
        let response = store
            .authorized(store.client.head(bucket_url.clone()))
            .await
            .context(format!(
                "💀 Couldn't get credentials for bucket '{}'.",
                store.config.bucket
            ))?
            .send()
            .await
            .context(format!(
                "💀 Reached out to bucket '{}' at '{}' and got ghosted. Check the endpoint and the network.",
                store.config.bucket, store.config.endpoint
            ))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!(
                "💀 Bucket check for '{}' returned {}. Either the bucket doesn't exist or the token isn't welcome there.",
                bucket_url,
                status
            );
        }
        debug!("✅ bucket '{}' is home and accepting visitors", store.config.bucket);
        Ok(store)
    }

    fn bucket_url(&self) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.config.endpoint).context(format!(
            "💀 GCS endpoint '{}' is not a URL.",
            self.config.endpoint
        ))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("💀 GCS endpoint '{}' can't carry a path.", self.config.endpoint))?
            .pop_if_empty()
            .push(&self.config.bucket);
        Ok(url)
    }

    /// 🗝️ `{endpoint}/{bucket}/{key}`, with the key percent-encoded as a single segment.
    fn object_url(&self, key: &str) -> Result<reqwest::Url, AttemptError> {
        let mut url = self
            .bucket_url()
            .map_err(|e| AttemptError::Permanent(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| AttemptError::Permanent(format!("cannot build object URL for '{}'", key)))?
            .push(key);
        Ok(url)
    }

    async fn authorized(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, AttemptError> {
        Ok(match self.auth.bearer().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn exists(&self, key: &str) -> Result<bool, AttemptError> {
        let url = self.object_url(key)?;
        let response = self
            .authorized(self.client.head(url))
            .await?
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(classify_status(status, "HEAD")),
        }
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<UploadReceipt, AttemptError> {
        let url = self.object_url(key)?;
        let bytes_written = bytes.len() as u64;
        trace!("☁️ PUT {} ({} bytes)", url, bytes_written);
        let response = self
            .authorized(self.client.put(url))
            .await?
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, "PUT"));
        }
        Ok(UploadReceipt {
            key: key.to_string(),
            bytes_written,
        })
    }
}
