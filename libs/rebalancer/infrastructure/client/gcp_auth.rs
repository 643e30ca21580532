//! Google Cloud access tokens
//!
//! On Cloud Run/Functions the metadata server hands out short-lived OAuth
//! tokens for the attached service account. Local runs set
//! `GCP_ACCESS_TOKEN` (e.g. from `gcloud auth print-access-token`) instead.

use super::{check_status, ApiError, ApiResult};
use crate::infrastructure::config::Secret;
use crate::infrastructure::retry::{with_retry, CallPolicy};
use parking_lot::Mutex;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

pub const ACCESS_TOKEN_ENV: &str = "GCP_ACCESS_TOKEN";

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the metadata server's expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

pub struct GcpAuth {
    http: reqwest::Client,
    policy: CallPolicy,
    fixed: Option<Secret>,
    cached: Mutex<Option<CachedToken>>,
}

impl GcpAuth {
    /// Use `GCP_ACCESS_TOKEN` when set, the metadata server otherwise
    pub fn from_env(http: reqwest::Client, policy: CallPolicy) -> Self {
        let fixed = std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .map(Secret::new);
        if fixed.is_some() {
            debug!("[GCP] Using access token from {}", ACCESS_TOKEN_ENV);
        }
        Self {
            http,
            policy,
            fixed,
            cached: Mutex::new(None),
        }
    }

    /// Always use the given token
    pub fn with_token(http: reqwest::Client, token: Secret) -> Self {
        Self {
            http,
            policy: CallPolicy::default(),
            fixed: Some(token),
            cached: Mutex::new(None),
        }
    }

    /// Bearer token for the next request
    pub async fn access_token(&self) -> ApiResult<String> {
        if let Some(token) = &self.fixed {
            return Ok(token.expose().to_string());
        }
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let http = &self.http;
        let response: TokenResponse = with_retry(&self.policy, "metadata token", move || async move {
            let response = http
                .get(METADATA_TOKEN_URL)
                .header("Metadata-Flavor", "Google")
                .send()
                .await?;
            let response = check_status("metadata server", response).await?;
            Ok::<_, ApiError>(response.json::<TokenResponse>().await?)
        })
        .await?;

        debug!("[GCP] Fetched access token (expires in {}s)", response.expires_in);
        let expires_at = Instant::now() + Duration::from_secs(response.expires_in);
        *self.cached.lock() = Some(CachedToken {
            token: response.access_token.clone(),
            expires_at,
        });
        Ok(response.access_token)
    }

    fn cached_token(&self) -> Option<String> {
        let cached = self.cached.lock();
        cached
            .as_ref()
            .filter(|c| c.expires_at > Instant::now() + EXPIRY_MARGIN)
            .map(|c| c.token.clone())
    }
}
