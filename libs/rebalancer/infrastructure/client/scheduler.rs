//! Cloud Scheduler client (jobs.pause)

use super::{check_status, ApiError, ApiResult, GcpAuth};
use crate::infrastructure::retry::{with_retry, CallPolicy};
use std::sync::Arc;
use tracing::info;

const SCHEDULER_BASE_URL: &str = "https://cloudscheduler.googleapis.com/v1";

pub struct SchedulerClient {
    http: reqwest::Client,
    auth: Arc<GcpAuth>,
    job_path: String,
    base_url: String,
    policy: CallPolicy,
}

impl SchedulerClient {
    /// `job_path` is `projects/{p}/locations/{l}/jobs/{j}`
    pub fn new(http: reqwest::Client, auth: Arc<GcpAuth>, job_path: impl Into<String>, policy: CallPolicy) -> Self {
        Self {
            http,
            auth,
            job_path: job_path.into(),
            base_url: SCHEDULER_BASE_URL.to_string(),
            policy,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn job_path(&self) -> &str {
        &self.job_path
    }

    fn pause_url(&self) -> String {
        format!("{}/{}:pause", self.base_url.trim_end_matches('/'), self.job_path)
    }

    /// Stop the job from triggering further cycles
    pub async fn pause_job(&self) -> ApiResult<()> {
        let token = self.auth.access_token().await?;
        let url = self.pause_url();
        let (http, url, token) = (&self.http, &url, &token);

        with_retry(&self.policy, "scheduler pause", move || async move {
            let response = http
                .post(url.as_str())
                .bearer_auth(token)
                .json(&serde_json::json!({}))
                .send()
                .await?;
            check_status("Cloud Scheduler", response).await?;
            Ok::<_, ApiError>(())
        })
        .await?;

        info!("[Scheduler] Paused job {}", self.job_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::Secret;

    #[test]
    fn test_pause_url() {
        let http = reqwest::Client::new();
        let auth = Arc::new(GcpAuth::with_token(http.clone(), Secret::new("token")));
        let client = SchedulerClient::new(
            http,
            auth,
            "projects/metro-agent/locations/europe-west2/jobs/ws-usdc-rebalance",
            CallPolicy::default(),
        );
        assert_eq!(
            client.pause_url(),
            "https://cloudscheduler.googleapis.com/v1/projects/metro-agent/locations/europe-west2/jobs/ws-usdc-rebalance:pause"
        );
    }
}
