//! Application Facade
//!
//! Wires configuration into a ready-to-run engine for the binaries.

use super::engine::{AgentContext, CycleSettings, RebalanceEngine};
use crate::infrastructure::client::{GcpAuth, LbGateway, PushoverClient, SchedulerClient};
use crate::infrastructure::config::AgentConfig;
use crate::infrastructure::halt::EmergencyStop;
use crate::infrastructure::retry::CallPolicy;
use crate::infrastructure::storage::{DirectoryStateStore, GcsStateStore, StateStore};
use std::sync::Arc;
use tracing::info;

/// Build the engine with the production collaborators
pub async fn build_engine(config: &AgentConfig) -> anyhow::Result<RebalanceEngine> {
    let tuning = &config.tuning;
    let policy = CallPolicy::new(tuning.rpc_timeout(), tuning.max_retries);
    let http = reqwest::Client::builder()
        .timeout(tuning.rpc_timeout())
        .build()?;
    let auth = Arc::new(GcpAuth::from_env(http.clone(), policy));

    let store: Arc<dyn StateStore> = match &tuning.state_dir {
        Some(dir) => {
            info!("[Store] Keeping state in {:?}", dir);
            Arc::new(DirectoryStateStore::open(dir).await?)
        }
        None => Arc::new(GcsStateStore::new(
            http.clone(),
            auth.clone(),
            config.storage.bucket.clone(),
            policy,
        )),
    };

    let gateway = Arc::new(LbGateway::connect(&config.chain, &config.rewards, tuning).await?);
    info!("[LB] Agent wallet {:?}", gateway.wallet_address());

    let scheduler = SchedulerClient::new(http.clone(), auth, config.scheduler.job_path(), policy);
    let notifier = PushoverClient::new(http, config.pushover.clone(), policy);
    let halt = Arc::new(EmergencyStop::new(scheduler, notifier));

    let context = AgentContext::new(gateway, store, halt, CycleSettings::from_config(config));
    Ok(RebalanceEngine::new(context))
}
