//! Run a single rebalancing cycle and print the response body
//!
//! Exits non-zero when the cycle ends in an error.

use anyhow::Result;
use metro_dlmm_rebalancer::bin_common::load_agent;
use metro_dlmm_rebalancer::rebalancer::{build_engine, CycleResponse, ResponseStatus};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_agent()?;
    let engine = build_engine(&config).await?;

    let result = engine.run_cycle().await;
    let response = CycleResponse::from(&result);
    println!("{}", serde_json::to_string_pretty(&response)?);

    if response.status == ResponseStatus::Error {
        std::process::exit(1);
    }
    Ok(())
}
