//! In-memory state store
//!
//! Keeps a write log so callers can assert exactly which documents a cycle
//! touched. Every stored document carries a counter version.

use super::{Result, StateStore, StorageError, Versioned};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct MemoryStateStore {
    documents: Mutex<HashMap<String, (Value, u64)>>,
    next_version: AtomicU64,
    writes: Mutex<Vec<String>>,
    unavailable: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without recording a write
    pub fn insert(&self, name: impl Into<String>, document: Value) {
        let version = self.bump();
        self.documents.lock().insert(name.into(), (document, version));
    }

    /// Current contents of a document
    pub fn get(&self, name: &str) -> Option<Value> {
        self.documents.lock().get(name).map(|(document, _)| document.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.documents.lock().contains_key(name)
    }

    /// Names written (or created) since the last [`clear_writes`](Self::clear_writes), in order
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }

    /// Make every operation fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Acquire) {
            Err(StorageError::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read_versioned(&self, name: &str) -> Result<Option<Versioned>> {
        self.check_available()?;
        Ok(self.documents.lock().get(name).map(|(document, version)| Versioned {
            document: document.clone(),
            version: version.to_string(),
        }))
    }

    async fn write(&self, name: &str, document: &Value) -> Result<()> {
        self.check_available()?;
        let version = self.bump();
        self.documents
            .lock()
            .insert(name.to_string(), (document.clone(), version));
        self.writes.lock().push(name.to_string());
        Ok(())
    }

    async fn create_new(&self, name: &str, document: &Value) -> Result<bool> {
        self.check_available()?;
        let mut documents = self.documents.lock();
        if documents.contains_key(name) {
            return Ok(false);
        }
        let version = self.bump();
        documents.insert(name.to_string(), (document.clone(), version));
        self.writes.lock().push(name.to_string());
        Ok(true)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.check_available()?;
        self.documents.lock().remove(name);
        Ok(())
    }

    async fn delete_if_version(&self, name: &str, version: &str) -> Result<bool> {
        self.check_available()?;
        let mut documents = self.documents.lock();
        match documents.get(name) {
            Some((_, current)) if current.to_string() == version => {
                documents.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
