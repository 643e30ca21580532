//! Cycles against the directory-backed state store

mod common;

use common::*;
use rebalancer::application::{AgentContext, CycleOutcome, CycleSettings, NoActionReason, RebalanceEngine};
use rebalancer::infrastructure::config::RewardMode;
use rebalancer::infrastructure::storage::{DirectoryStateStore, StateStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

async fn engine_over(dir: &Path, gateway: Arc<FakeGateway>) -> RebalanceEngine {
    let store = Arc::new(DirectoryStateStore::open(dir).await.unwrap());
    let settings = CycleSettings {
        limits: limits(),
        reward_mode: RewardMode::Trade,
        lease_ttl: Duration::from_secs(600),
        holder_id: "dir-holder".to_string(),
    };
    RebalanceEngine::new(AgentContext::new(
        gateway,
        store,
        Arc::new(CountingHalt::default()),
        settings,
    ))
}

fn read_json(dir: &Path, name: &str) -> serde_json::Value {
    let content = std::fs::read_to_string(dir.join(name)).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[tokio::test]
async fn test_first_run_writes_state_files() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new(1.50));
    let engine = engine_over(dir.path(), gateway).await;

    engine.run_cycle_at(at(12, 0)).await.unwrap();

    let position = read_json(dir.path(), "wS_USDC.e_position.json");
    assert_eq!(position["bin_id"], ACTIVE_BIN);
    assert_eq!(position["token_x"], TOKEN_X);
    assert_eq!(position["token_y"], TOKEN_Y);
    assert_eq!(position["size_x"], 99.0);

    let price = read_json(dir.path(), "wS_USDC.e_price.json");
    assert_eq!(price["price"], 1.50);
    assert!(price["timestamp"].as_str().unwrap().starts_with("2025-03-01T12:00:00"));

    let time = read_json(dir.path(), "wS_USDC.e_time.json");
    assert!(time["timestamp"].is_string());

    assert!(!dir.path().join("wS_USDC.e_lease.json").exists());
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let gateway = Arc::new(FakeGateway::new(1.50));
    engine_over(dir.path(), gateway).await.run_cycle_at(at(12, 0)).await.unwrap();

    // Fresh process, small move: the stored position is removed and redeposited
    let gateway = Arc::new(FakeGateway::new(1.53));
    *gateway.active_bin.lock() = ACTIVE_BIN + 3;
    let engine = engine_over(dir.path(), gateway.clone()).await;

    let outcome = engine.run_cycle_at(at(12, 10)).await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Rebalanced { previous_bin, .. } if previous_bin == ACTIVE_BIN));
    assert_eq!(
        gateway.mutations(),
        vec![Mutation::Remove(ACTIVE_BIN), Mutation::Add(ACTIVE_BIN + 3)]
    );
    assert_eq!(read_json(dir.path(), "wS_USDC.e_position.json")["bin_id"], ACTIVE_BIN + 3);
    assert_eq!(read_json(dir.path(), "wS_USDC.e_price.json")["price"], 1.53);
}

#[tokio::test]
async fn test_corrupt_price_file_counts_as_first_run() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("wS_USDC.e_price.json"), "{ not json").unwrap();

    let gateway = Arc::new(FakeGateway::new(1.50));
    let engine = engine_over(dir.path(), gateway.clone()).await;

    let outcome = engine.run_cycle_at(at(12, 0)).await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Deposited { first_run: true, .. }));
    assert_eq!(read_json(dir.path(), "wS_USDC.e_price.json")["price"], 1.50);
}

#[tokio::test]
async fn test_expired_lease_file_is_broken() {
    let dir = tempfile::tempdir().unwrap();
    let stale = serde_json::json!({
        "holder": "crashed-instance",
        "acquired_at": at(10, 0).to_rfc3339(),
        "expires_at": at(10, 10).to_rfc3339(),
    });
    std::fs::write(dir.path().join("wS_USDC.e_lease.json"), stale.to_string()).unwrap();

    let gateway = Arc::new(FakeGateway::new(1.50));
    let engine = engine_over(dir.path(), gateway).await;

    let outcome = engine.run_cycle_at(at(12, 0)).await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Deposited { .. }));
    assert!(!dir.path().join("wS_USDC.e_lease.json").exists());
}

#[tokio::test]
async fn test_unchanged_price_leaves_position_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new(1.50));
    engine_over(dir.path(), gateway.clone()).await.run_cycle_at(at(12, 0)).await.unwrap();
    let before = std::fs::read_to_string(dir.path().join("wS_USDC.e_position.json")).unwrap();

    let engine = engine_over(dir.path(), gateway).await;
    let outcome = engine.run_cycle_at(at(12, 10)).await.unwrap();

    assert!(matches!(
        outcome,
        CycleOutcome::NoAction {
            reason: NoActionReason::PriceUnchanged,
            ..
        }
    ));
    let after = std::fs::read_to_string(dir.path().join("wS_USDC.e_position.json")).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_slash_in_symbol_still_persists() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(FakeGateway::new(1.50));
    *gateway.symbols.lock() = Some(("wS".to_string(), "USDC/e".to_string()));
    let engine = engine_over(dir.path(), gateway.clone()).await;

    let outcome = engine.run_cycle_at(at(12, 0)).await.unwrap();

    assert_eq!(outcome.prefix(), "wS_USDC-e");
    assert!(matches!(outcome, CycleOutcome::Deposited { first_run: true, .. }));
    assert_eq!(read_json(dir.path(), "wS_USDC-e_position.json")["bin_id"], ACTIVE_BIN);
    assert_eq!(read_json(dir.path(), "wS_USDC-e_price.json")["price"], 1.50);
    assert!(!dir.path().join("wS_USDC-e_lease.json").exists());
}

#[tokio::test]
async fn test_directory_store_rejects_path_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStateStore::open(dir.path()).await.unwrap();

    assert!(store.read("../escape.json").await.is_err());
    assert!(store.write(".hidden.json", &serde_json::json!({})).await.is_err());
}
