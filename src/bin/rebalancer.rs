//! Rebalancer Binary - HTTP Trigger
//!
//! Serves the rebalancing cycle over HTTP; every request to `/` runs one cycle.
//!
//! Usage:
//!   REBALANCER_CONFIG_PATH=config/rebalancer.yaml ./rebalancer
//!   PORT=8080 ./rebalancer                     # Overrides the configured port

use anyhow::Result;
use metro_dlmm_rebalancer::bin_common::{load_agent, print_banner, print_shutdown, resolve_listen_addr};
use metro_dlmm_rebalancer::rebalancer::{build_engine, TriggerServer};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_agent()?;

    let port = std::env::var("PORT").ok();
    let addr = resolve_listen_addr(&config.tuning.listen_addr, port.as_deref());

    let engine = build_engine(&config).await?;
    print_banner("Metro DLMM Rebalancer", &format!("Trigger on http://{}/", addr));

    TriggerServer::new(engine).serve(&addr).await?;

    print_shutdown("Metro DLMM Rebalancer");
    Ok(())
}
