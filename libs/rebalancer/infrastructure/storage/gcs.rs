//! Google Cloud Storage state store (JSON API)
//!
//! Versions are object generations, so conditional operations map onto
//! `ifGenerationMatch` preconditions.

use super::{Result, StateStore, StorageError, Versioned};
use crate::infrastructure::client::{ApiError, GcpAuth};
use crate::infrastructure::retry::{with_retry, CallPolicy};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const GCS_BASE_URL: &str = "https://storage.googleapis.com";

const GENERATION_HEADER: &str = "x-goog-generation";

pub struct GcsStateStore {
    http: reqwest::Client,
    auth: Arc<GcpAuth>,
    bucket: String,
    base_url: String,
    policy: CallPolicy,
}

impl GcsStateStore {
    pub fn new(http: reqwest::Client, auth: Arc<GcpAuth>, bucket: impl Into<String>, policy: CallPolicy) -> Self {
        Self {
            http,
            auth,
            bucket: bucket.into(),
            base_url: GCS_BASE_URL.to_string(),
            policy,
        }
    }

    /// Point at an emulator or proxy instead of the public endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn object_url(&self, name: &str) -> Result<Url> {
        let mut url = self.url_with_segments(&["storage", "v1", "b", &self.bucket, "o", name])?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn metadata_url(&self, name: &str) -> Result<Url> {
        self.url_with_segments(&["storage", "v1", "b", &self.bucket, "o", name])
    }

    fn delete_url(&self, name: &str, generation: Option<&str>) -> Result<Url> {
        let mut url = self.metadata_url(name)?;
        if let Some(generation) = generation {
            url.query_pairs_mut().append_pair("ifGenerationMatch", generation);
        }
        Ok(url)
    }

    fn upload_url(&self, name: &str, if_absent: bool) -> Result<Url> {
        let mut url = self.url_with_segments(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("uploadType", "media");
            query.append_pair("name", name);
            if if_absent {
                query.append_pair("ifGenerationMatch", "0");
            }
        }
        Ok(url)
    }

    /// Path segments are percent-encoded individually, so object names may contain `/`
    fn url_with_segments(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| StorageError::InvalidName(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidName(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn bearer(&self) -> Result<String> {
        self.auth
            .access_token()
            .await
            .map_err(|e| StorageError::Auth(e.to_string()))
    }

    async fn upload(&self, name: &str, document: &Value, if_absent: bool) -> Result<StatusCode> {
        let url = self.upload_url(name, if_absent)?;
        let body = serde_json::to_vec_pretty(document)?;
        let token = self.bearer().await?;
        let (http, url, body, token) = (&self.http, &url, &body, &token);

        with_retry(&self.policy, "GCS upload", move || async move {
            let response = http
                .post(url.clone())
                .bearer_auth(token)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await?;
            let status = response.status();
            if status.is_success() || (if_absent && status == StatusCode::PRECONDITION_FAILED) {
                return Ok(status);
            }
            Err(error_status(response).await)
        })
        .await
    }
}

async fn error_status(response: reqwest::Response) -> StorageError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StorageError::Status { status, body }
}

impl From<ApiError> for StorageError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Http(e) => StorageError::Http(e),
            ApiError::Status { status, body, .. } => StorageError::Status { status, body },
            ApiError::Timeout(what) => StorageError::Timeout(what),
            ApiError::Endpoint(what) => StorageError::InvalidName(what),
        }
    }
}

#[async_trait]
impl StateStore for GcsStateStore {
    async fn read_versioned(&self, name: &str) -> Result<Option<Versioned>> {
        let url = self.object_url(name)?;
        let token = self.bearer().await?;
        let (http, url, token) = (&self.http, &url, &token);

        let body = with_retry(&self.policy, "GCS download", move || async move {
            let response = http.get(url.clone()).bearer_auth(token).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !response.status().is_success() {
                return Err(error_status(response).await);
            }
            let generation = response
                .headers()
                .get(GENERATION_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    StorageError::Unavailable(format!("{} missing from download", GENERATION_HEADER))
                })?;
            Ok(Some((response.bytes().await?, generation)))
        })
        .await?;

        match body {
            Some((bytes, generation)) => Ok(Some(Versioned {
                document: serde_json::from_slice(&bytes)?,
                version: generation,
            })),
            None => {
                debug!("[Store] gs://{}/{} does not exist", self.bucket, name);
                Ok(None)
            }
        }
    }

    async fn write(&self, name: &str, document: &Value) -> Result<()> {
        self.upload(name, document, false).await?;
        debug!("[Store] Wrote gs://{}/{}", self.bucket, name);
        Ok(())
    }

    async fn create_new(&self, name: &str, document: &Value) -> Result<bool> {
        let status = self.upload(name, document, true).await?;
        Ok(status != StatusCode::PRECONDITION_FAILED)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let url = self.delete_url(name, None)?;
        let token = self.bearer().await?;
        let (http, url, token) = (&self.http, &url, &token);

        with_retry(&self.policy, "GCS delete", move || async move {
            let response = http.delete(url.clone()).bearer_auth(token).send().await?;
            if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
                return Ok(());
            }
            Err(error_status(response).await)
        })
        .await
    }

    async fn delete_if_version(&self, name: &str, version: &str) -> Result<bool> {
        let url = self.delete_url(name, Some(version))?;
        let token = self.bearer().await?;
        let (http, url, token) = (&self.http, &url, &token);

        // 412: a newer generation exists; 404: already gone (possibly by our own lost attempt)
        with_retry(&self.policy, "GCS conditional delete", move || async move {
            let response = http.delete(url.clone()).bearer_auth(token).send().await?;
            match response.status() {
                status if status.is_success() => Ok(true),
                StatusCode::PRECONDITION_FAILED | StatusCode::NOT_FOUND => Ok(false),
                _ => Err(error_status(response).await),
            }
        })
        .await
    }
}
