//! Outbound clients: the chain gateway and the cloud HTTP APIs

pub mod contracts;
pub mod gateway;
pub mod gcp_auth;
pub mod lb_gateway;
pub mod pushover;
pub mod scheduler;

use crate::infrastructure::retry::Transient;
use std::time::Duration;
use thiserror::Error;

pub use gateway::{
    ChainGateway, ClaimOutcome, GatewayError, PoolPrice, RemovalOutcome, SwapRoute, TokenBalance,
    TradeOutcome, TransferOutcome,
};
pub use gcp_auth::GcpAuth;
pub use lb_gateway::LbGateway;
pub use pushover::PushoverClient;
pub use scheduler::SchedulerClient;

/// Failure of a JSON/HTTP cloud API call
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid endpoint: {0}")]
    Endpoint(String),

    #[error("{0} timed out")]
    Timeout(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl Transient for ApiError {
    fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::Timeout(_) => true,
            ApiError::Endpoint(_) => false,
        }
    }

    fn timed_out(operation: &str, after: Duration) -> Self {
        ApiError::Timeout(format!("{} after {:?}", operation, after))
    }
}

/// Turn a non-2xx response into [`ApiError::Status`]
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> ApiResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}
