//! Typed access to one pair's state documents
//!
//! Storage problems never abort a cycle from here: an unreadable or malformed
//! document reads as absent, a failed write is logged and reported as `false`.

use super::StateStore;
use crate::domain::StateFile;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

pub struct PairState<'a> {
    store: &'a dyn StateStore,
    prefix: String,
}

impl<'a> PairState<'a> {
    pub fn new(store: &'a dyn StateStore, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn store(&self) -> &'a dyn StateStore {
        self.store
    }

    pub fn file_name(&self, file: StateFile) -> String {
        file.name(&self.prefix)
    }

    /// Read and decode a document; `None` when missing, unreadable or malformed
    pub async fn load<T: DeserializeOwned>(&self, file: StateFile) -> Option<T> {
        let name = self.file_name(file);
        let value = match self.store.read(&name).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("[Store] {} not found", name);
                return None;
            }
            Err(e) => {
                error!("[Store] Failed to read {}: {}", name, e);
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("[Store] Ignoring malformed {}: {}", name, e);
                None
            }
        }
    }

    /// Encode and overwrite a document; `false` when the write failed
    pub async fn save<T: Serialize>(&self, file: StateFile, value: &T) -> bool {
        let name = self.file_name(file);
        let document = match serde_json::to_value(value) {
            Ok(document) => document,
            Err(e) => {
                error!("[Store] Failed to encode {}: {}", name, e);
                return false;
            }
        };

        match self.store.write(&name, &document).await {
            Ok(()) => {
                debug!("[Store] Saved {}", name);
                true
            }
            Err(e) => {
                error!("[Store] Failed to write {}: {}", name, e);
                false
            }
        }
    }
}
