//! Pushover notifications

use super::{check_status, ApiError, ApiResult};
use crate::infrastructure::config::PushoverConfig;
use crate::infrastructure::retry::{with_retry, CallPolicy};
use serde::Serialize;
use tracing::info;

const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";

/// High priority: bypasses the recipient's quiet hours
pub const PRIORITY_HIGH: i8 = 1;

#[derive(Debug, Serialize)]
struct MessageForm<'a> {
    token: &'a str,
    user: &'a str,
    message: &'a str,
    title: &'a str,
    priority: i8,
}

pub struct PushoverClient {
    http: reqwest::Client,
    config: PushoverConfig,
    url: String,
    policy: CallPolicy,
}

impl PushoverClient {
    pub fn new(http: reqwest::Client, config: PushoverConfig, policy: CallPolicy) -> Self {
        Self {
            http,
            config,
            url: PUSHOVER_URL.to_string(),
            policy,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub async fn send(&self, title: &str, message: &str, priority: i8) -> ApiResult<()> {
        let form = MessageForm {
            token: self.config.token.expose(),
            user: self.config.user.expose(),
            message,
            title,
            priority,
        };
        let (http, url, form) = (&self.http, &self.url, &form);

        with_retry(&self.policy, "pushover send", move || async move {
            let response = http.post(url.as_str()).form(form).send().await?;
            check_status("Pushover", response).await?;
            Ok::<_, ApiError>(())
        })
        .await?;

        info!("[Pushover] Sent '{}'", title);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::Secret;
    use axum::{extract::State, http::StatusCode, routing::post, Form, Router};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    type Captured = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn serve(status: StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route(
                "/1/messages.json",
                post(
                    move |State(seen): State<Captured>, Form(form): Form<HashMap<String, String>>| async move {
                        seen.lock().push(form);
                        status
                    },
                ),
            )
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}/1/messages.json", addr), captured)
    }

    fn client(url: &str) -> PushoverClient {
        let config = PushoverConfig {
            token: Secret::new("app-token"),
            user: Secret::new("user-key"),
        };
        PushoverClient::new(reqwest::Client::new(), config, CallPolicy::default().single_attempt())
            .with_url(url)
    }

    #[tokio::test]
    async fn test_send_posts_form_fields() {
        let (url, captured) = serve(StatusCode::OK).await;

        client(&url)
            .send("wS_USDC.e Metro Auto DLMM", "halted", PRIORITY_HIGH)
            .await
            .unwrap();

        let forms = captured.lock();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0]["token"], "app-token");
        assert_eq!(forms[0]["user"], "user-key");
        assert_eq!(forms[0]["title"], "wS_USDC.e Metro Auto DLMM");
        assert_eq!(forms[0]["message"], "halted");
        assert_eq!(forms[0]["priority"], "1");
    }

    #[tokio::test]
    async fn test_rejected_message_is_status_error() {
        let (url, _) = serve(StatusCode::BAD_REQUEST).await;

        let err = client(&url).send("t", "m", PRIORITY_HIGH).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 400, .. }));
    }
}
