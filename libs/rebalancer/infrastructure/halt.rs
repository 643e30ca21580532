//! Emergency halt
//!
//! Pauses the scheduler job that triggers cycles and tells the operator.
//! The notification goes out whether or not the pause worked; a failed
//! notification is only logged.

use crate::infrastructure::client::{pushover::PRIORITY_HIGH, ApiError, PushoverClient, SchedulerClient};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum HaltError {
    #[error("Failed to pause scheduler job: {0}")]
    Pause(#[source] ApiError),
}

/// What an emergency halt managed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaltReport {
    pub scheduler_paused: bool,
    pub operator_notified: bool,
}

#[async_trait]
pub trait EmergencyHalt: Send + Sync {
    /// Stop further cycles for the pair behind `prefix` after `failures` in a row
    async fn halt(&self, prefix: &str, failures: u32) -> HaltReport;
}

/// Alert body; tells the operator when the job is still scheduled
pub fn halt_message(prefix: &str, failures: u32, scheduler_paused: bool) -> String {
    let scheduler = if scheduler_paused {
        "Scheduler paused."
    } else {
        "Scheduler pause FAILED, job still scheduled. Pause it manually."
    };
    format!(
        "CRITICAL: {} liquidity manager suspended after {} consecutive failures. {}",
        prefix, failures, scheduler
    )
}

pub fn halt_title(prefix: &str) -> String {
    format!("{} Metro Auto DLMM", prefix)
}

/// Scheduler pause plus Pushover alert
pub struct EmergencyStop {
    scheduler: SchedulerClient,
    notifier: PushoverClient,
}

impl EmergencyStop {
    pub fn new(scheduler: SchedulerClient, notifier: PushoverClient) -> Self {
        Self { scheduler, notifier }
    }

    async fn pause(&self) -> Result<(), HaltError> {
        self.scheduler.pause_job().await.map_err(HaltError::Pause)
    }
}

#[async_trait]
impl EmergencyHalt for EmergencyStop {
    async fn halt(&self, prefix: &str, failures: u32) -> HaltReport {
        warn!("[Halt] Emergency stop for {} ({})", prefix, self.scheduler.job_path());

        let scheduler_paused = match self.pause().await {
            Ok(()) => true,
            Err(e) => {
                error!("[Halt] {}", e);
                false
            }
        };

        let operator_notified = match self
            .notifier
            .send(&halt_title(prefix), &halt_message(prefix, failures, scheduler_paused), PRIORITY_HIGH)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("[Halt] Failed to send notification: {}", e);
                false
            }
        };

        info!(
            "[Halt] {} halted (scheduler paused: {}, notified: {})",
            prefix, scheduler_paused, operator_notified
        );
        HaltReport {
            scheduler_paused,
            operator_notified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::client::GcpAuth;
    use crate::infrastructure::config::{PushoverConfig, Secret};
    use crate::infrastructure::retry::CallPolicy;
    use axum::{extract::State, http::StatusCode, routing::post, Form, Router};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn test_halt_wording() {
        assert_eq!(
            halt_message("WS_USDC", 3, true),
            "CRITICAL: WS_USDC liquidity manager suspended after 3 consecutive failures. Scheduler paused."
        );
        assert_eq!(
            halt_message("WS_USDC", 3, false),
            "CRITICAL: WS_USDC liquidity manager suspended after 3 consecutive failures. \
             Scheduler pause FAILED, job still scheduled. Pause it manually."
        );
        assert_eq!(halt_title("WS_USDC"), "WS_USDC Metro Auto DLMM");
    }

    type Messages = Arc<Mutex<Vec<String>>>;

    /// Scheduler answering `pause_status` and a Pushover endpoint recording messages
    async fn serve(pause_status: StatusCode) -> (String, Messages) {
        let messages: Messages = Arc::default();
        let router = Router::new()
            .route("/v1/*job", post(move || async move { pause_status }))
            .route(
                "/1/messages.json",
                post(
                    |State(seen): State<Messages>, Form(form): Form<HashMap<String, String>>| async move {
                        seen.lock().push(form.get("message").cloned().unwrap_or_default());
                        StatusCode::OK
                    },
                ),
            )
            .with_state(messages.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}", addr), messages)
    }

    fn emergency_stop(base: &str) -> EmergencyStop {
        let http = reqwest::Client::new();
        let policy = CallPolicy::default().single_attempt();
        let auth = Arc::new(GcpAuth::with_token(http.clone(), Secret::new("token")));
        let scheduler = SchedulerClient::new(
            http.clone(),
            auth,
            "projects/p/locations/l/jobs/metro",
            policy,
        )
        .with_base_url(format!("{}/v1", base));
        let pushover = PushoverConfig {
            token: Secret::new("app-token"),
            user: Secret::new("user-key"),
        };
        let notifier = PushoverClient::new(http, pushover, policy).with_url(format!("{}/1/messages.json", base));
        EmergencyStop::new(scheduler, notifier)
    }

    #[tokio::test]
    async fn test_paused_job_is_reported_paused() {
        let (base, messages) = serve(StatusCode::OK).await;

        let report = emergency_stop(&base).halt("WS_USDC", 3).await;

        assert!(report.scheduler_paused);
        assert!(report.operator_notified);
        assert_eq!(messages.lock().as_slice(), [halt_message("WS_USDC", 3, true)]);
    }

    #[tokio::test]
    async fn test_failed_pause_is_reported_to_operator() {
        let (base, messages) = serve(StatusCode::FORBIDDEN).await;

        let report = emergency_stop(&base).halt("WS_USDC", 3).await;

        assert!(!report.scheduler_paused);
        assert!(report.operator_notified);
        let sent = messages.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Scheduler pause FAILED"));
        assert!(!sent[0].contains("Scheduler paused."));
    }
}
