//! Cycle lease
//!
//! At most one cycle may mutate a pair at a time: both share the wallet nonce
//! and the pair's state files. The lease is a `<prefix>_lease.json` document
//! created with create-if-absent semantics. A lease left behind by a crashed
//! run is broken once it expires.

use super::{StateStore, StorageError};
use crate::domain::{LeaseRecord, StateFile};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum LeaseError {
    #[error("Cycle for {prefix} already running (holder {holder}, expires {expires_at})")]
    Held {
        prefix: String,
        holder: String,
        expires_at: DateTime<Utc>,
    },

    #[error("Lease storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Held lease; give it back with [`CycleLease::release`]
#[derive(Debug)]
pub struct CycleLease {
    name: String,
    record: LeaseRecord,
}

impl CycleLease {
    /// Random holder id for this process
    pub fn new_holder_id() -> String {
        format!("{}-{:08x}", std::process::id(), rand::random::<u32>())
    }

    fn new_token() -> String {
        format!("{:016x}", rand::random::<u64>())
    }

    pub async fn acquire(
        store: &dyn StateStore,
        prefix: &str,
        holder: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, LeaseError> {
        let name = StateFile::Lease.name(prefix);
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        let record = LeaseRecord {
            holder: holder.to_string(),
            token: Self::new_token(),
            acquired_at: now,
            expires_at: now + ttl,
        };
        let document = serde_json::to_value(&record).map_err(StorageError::from)?;

        // Second attempt only after breaking an expired or unreadable lease
        for _ in 0..2 {
            if store.create_new(&name, &document).await? {
                debug!("[Lease] Acquired {} as {}", name, holder);
                return Ok(Self { name, record });
            }

            let existing = match store.read_versioned(&name).await? {
                Some(existing) => existing,
                // Released between our create and read
                None => continue,
            };

            match serde_json::from_value::<LeaseRecord>(existing.document).ok() {
                // A create whose reply was lost still landed
                Some(current) if current.token == record.token => {
                    debug!("[Lease] Acquired {} as {} (late confirmation)", name, holder);
                    return Ok(Self { name, record });
                }
                Some(current) if !current.is_expired(now) => {
                    return Err(LeaseError::Held {
                        prefix: prefix.to_string(),
                        holder: current.holder,
                        expires_at: current.expires_at,
                    });
                }
                Some(stale) => {
                    warn!(
                        "[Lease] Breaking expired lease {} held by {} since {}",
                        name, stale.holder, stale.acquired_at
                    );
                }
                None => warn!("[Lease] Breaking unreadable lease {}", name),
            }

            // Only the exact version judged stale may go; a lease recreated meanwhile stays
            if !store.delete_if_version(&name, &existing.version).await? {
                debug!("[Lease] {} changed while breaking it", name);
            }
        }

        Err(LeaseError::Held {
            prefix: prefix.to_string(),
            holder: "unknown".to_string(),
            expires_at: record.expires_at,
        })
    }

    pub fn holder(&self) -> &str {
        &self.record.holder
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.record.expires_at
    }

    /// Delete the lease document if it is still ours
    pub async fn release(self, store: &dyn StateStore) -> Result<(), StorageError> {
        let existing = match store.read_versioned(&self.name).await? {
            Some(existing) => existing,
            None => {
                debug!("[Lease] {} already gone", self.name);
                return Ok(());
            }
        };

        match serde_json::from_value::<LeaseRecord>(existing.document).ok() {
            Some(current) if current.token == self.record.token => {
                if store.delete_if_version(&self.name, &existing.version).await? {
                    debug!("[Lease] Released {}", self.name);
                }
            }
            Some(current) => info!(
                "[Lease] {} now held by {}, leaving it in place",
                self.name, current.holder
            ),
            None => info!("[Lease] {} unreadable, leaving it in place", self.name),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::{MemoryStateStore, Versioned};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap()
    }

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn test_second_holder_is_refused() {
        let store = MemoryStateStore::new();
        let lease = CycleLease::acquire(&store, "WS_USDC", "a", TTL, at(0)).await.unwrap();
        assert_eq!(lease.holder(), "a");

        match CycleLease::acquire(&store, "WS_USDC", "b", TTL, at(1)).await {
            Err(LeaseError::Held { holder, .. }) => assert_eq!(holder, "a"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_release_allows_next_cycle() {
        let store = MemoryStateStore::new();
        let lease = CycleLease::acquire(&store, "WS_USDC", "a", TTL, at(0)).await.unwrap();
        lease.release(&store).await.unwrap();
        assert!(!store.contains("WS_USDC_lease.json"));

        assert!(CycleLease::acquire(&store, "WS_USDC", "b", TTL, at(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_lease_is_broken() {
        let store = MemoryStateStore::new();
        let _abandoned = CycleLease::acquire(&store, "WS_USDC", "a", TTL, at(0)).await.unwrap();

        let lease = CycleLease::acquire(&store, "WS_USDC", "b", TTL, at(11)).await.unwrap();
        assert_eq!(lease.holder(), "b");
    }

    #[tokio::test]
    async fn test_release_keeps_foreign_lease() {
        let store = MemoryStateStore::new();
        let stale = CycleLease::acquire(&store, "WS_USDC", "a", TTL, at(0)).await.unwrap();
        let _current = CycleLease::acquire(&store, "WS_USDC", "b", TTL, at(20)).await.unwrap();

        stale.release(&store).await.unwrap();
        assert!(store.contains("WS_USDC_lease.json"));
    }

    #[tokio::test]
    async fn test_same_holder_id_is_still_a_different_lease() {
        let store = MemoryStateStore::new();
        let _first = CycleLease::acquire(&store, "WS_USDC", "a", TTL, at(0)).await.unwrap();

        assert!(matches!(
            CycleLease::acquire(&store, "WS_USDC", "a", TTL, at(1)).await,
            Err(LeaseError::Held { .. })
        ));
    }

    /// Holds the first two versioned reads until both have happened
    struct LockstepStore {
        inner: MemoryStateStore,
        barrier: Barrier,
        gated: AtomicUsize,
    }

    #[async_trait]
    impl StateStore for LockstepStore {
        async fn read_versioned(&self, name: &str) -> Result<Option<Versioned>, StorageError> {
            let read = self.inner.read_versioned(name).await;
            if self.gated.fetch_add(1, Ordering::SeqCst) < 2 {
                self.barrier.wait().await;
            }
            read
        }

        async fn write(&self, name: &str, document: &Value) -> Result<(), StorageError> {
            self.inner.write(name, document).await
        }

        async fn create_new(&self, name: &str, document: &Value) -> Result<bool, StorageError> {
            self.inner.create_new(name, document).await
        }

        async fn delete(&self, name: &str) -> Result<(), StorageError> {
            self.inner.delete(name).await
        }

        async fn delete_if_version(&self, name: &str, version: &str) -> Result<bool, StorageError> {
            self.inner.delete_if_version(name, version).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_takeover_of_expired_lease_has_one_winner() {
        let store = LockstepStore {
            inner: MemoryStateStore::new(),
            barrier: Barrier::new(2),
            gated: AtomicUsize::new(0),
        };
        let _crashed = CycleLease::acquire(&store.inner, "WS_USDC", "crashed", TTL, at(0))
            .await
            .unwrap();

        // Both contenders read the same expired lease before either breaks it
        let (a, b) = tokio::join!(
            CycleLease::acquire(&store, "WS_USDC", "a", TTL, at(11)),
            CycleLease::acquire(&store, "WS_USDC", "b", TTL, at(11)),
        );

        let winners: Vec<&str> = [&a, &b]
            .into_iter()
            .filter_map(|result| result.as_ref().ok().map(|lease| lease.holder()))
            .collect();
        assert_eq!(winners.len(), 1, "a: {:?}, b: {:?}", a, b);

        let loser = if a.is_ok() { &b } else { &a };
        match loser {
            Err(LeaseError::Held { holder, .. }) => assert_eq!(holder, winners[0]),
            other => panic!("unexpected result: {:?}", other),
        }
        let stored = store.inner.get("WS_USDC_lease.json").unwrap();
        assert_eq!(stored["holder"], winners[0]);
    }

    /// Stores the first create but reports it as refused, like a retried upload answered 412
    struct LostReplyStore {
        inner: MemoryStateStore,
        lost: AtomicUsize,
    }

    #[async_trait]
    impl StateStore for LostReplyStore {
        async fn read_versioned(&self, name: &str) -> Result<Option<Versioned>, StorageError> {
            self.inner.read_versioned(name).await
        }

        async fn write(&self, name: &str, document: &Value) -> Result<(), StorageError> {
            self.inner.write(name, document).await
        }

        async fn create_new(&self, name: &str, document: &Value) -> Result<bool, StorageError> {
            let created = self.inner.create_new(name, document).await?;
            Ok(created && self.lost.fetch_add(1, Ordering::SeqCst) > 0)
        }

        async fn delete(&self, name: &str) -> Result<(), StorageError> {
            self.inner.delete(name).await
        }

        async fn delete_if_version(&self, name: &str, version: &str) -> Result<bool, StorageError> {
            self.inner.delete_if_version(name, version).await
        }
    }

    #[tokio::test]
    async fn test_own_lease_recognised_after_lost_create_reply() {
        let store = LostReplyStore {
            inner: MemoryStateStore::new(),
            lost: AtomicUsize::new(0),
        };

        let lease = CycleLease::acquire(&store, "WS_USDC", "a", TTL, at(0)).await.unwrap();
        assert_eq!(lease.holder(), "a");

        lease.release(&store).await.unwrap();
        assert!(!store.inner.contains("WS_USDC_lease.json"));
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let store = MemoryStateStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            CycleLease::acquire(&store, "WS_USDC", "a", TTL, at(0)).await,
            Err(LeaseError::Storage(_))
        ));
    }
}
