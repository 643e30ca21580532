//! HTTP trigger
//!
//! Any request to `/` runs one cycle and answers with the cycle's
//! `{status, message, data}` body. Triggers are serialised in-process; the
//! cycle lease covers other instances.

use super::engine::RebalanceEngine;
use super::outcome::{CycleError, CycleResponse, CycleResult, ResponseStatus};
use super::CycleOutcome;
use axum::{extract::State, http::StatusCode, routing::any, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

struct TriggerState {
    engine: RebalanceEngine,
    running: Mutex<()>,
}

impl TriggerState {
    async fn run(&self) -> CycleResult<CycleOutcome> {
        let _running = self.running.lock().await;
        self.engine.run_cycle().await
    }
}

pub struct TriggerServer {
    state: Arc<TriggerState>,
}

impl TriggerServer {
    pub fn new(engine: RebalanceEngine) -> Self {
        Self {
            state: Arc::new(TriggerState {
                engine,
                running: Mutex::new(()),
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", any(trigger))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Starts the trigger server listening on the specified address.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Trigger listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Trigger server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// HTTP status for a finished cycle
pub fn status_code(result: &CycleResult<CycleOutcome>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::OK,
        Err(CycleError::Busy { .. }) => StatusCode::CONFLICT,
        Err(e) if e.is_connectivity() => StatusCode::SERVICE_UNAVAILABLE,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn trigger(State(state): State<Arc<TriggerState>>) -> (StatusCode, Json<CycleResponse>) {
    // A dropped connection must not cancel a cycle halfway through a transaction
    let cycle = tokio::spawn(async move { state.run().await });

    match cycle.await {
        Ok(result) => (status_code(&result), Json(CycleResponse::from(&result))),
        Err(e) => {
            error!("Cycle task aborted: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CycleResponse {
                    status: ResponseStatus::Error,
                    message: "Cycle aborted unexpectedly".to_string(),
                    data: json!({ "kind": "internal" }),
                }),
            )
        }
    }
}
