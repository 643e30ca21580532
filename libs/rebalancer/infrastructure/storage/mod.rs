//! State Store
//!
//! Named JSON documents in a bucket (production), a local directory
//! (development) or memory (tests). Documents are independent: there are no
//! multi-document transactions, only overwrite, create-if-absent and delete.

pub mod directory;
pub mod gcs;
pub mod lease;
pub mod memory;
pub mod pair_state;

use crate::infrastructure::retry::Transient;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub use directory::DirectoryStateStore;
pub use gcs::GcsStateStore;
pub use lease::{CycleLease, LeaseError};
pub use memory::MemoryStateStore;
pub use pair_state::PairState;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid object name: {0}")]
    InvalidName(String),

    #[error("{0} timed out")]
    Timeout(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        match self {
            StorageError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            StorageError::Status { status, .. } => *status == 429 || *status >= 500,
            StorageError::Timeout(_) => true,
            _ => false,
        }
    }

    fn timed_out(operation: &str, after: Duration) -> Self {
        StorageError::Timeout(format!("{} after {:?}", operation, after))
    }
}

/// A document with the store's opaque version tag for it
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub document: Value,
    pub version: String,
}

/// Key-value JSON blob storage
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a document, `None` when it does not exist
    async fn read(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.read_versioned(name).await?.map(|versioned| versioned.document))
    }

    /// Read a document together with its current version
    async fn read_versioned(&self, name: &str) -> Result<Option<Versioned>>;

    /// Create or overwrite a document
    async fn write(&self, name: &str, document: &Value) -> Result<()>;

    /// Create a document only if absent; `false` when it already exists
    async fn create_new(&self, name: &str, document: &Value) -> Result<bool>;

    /// Remove a document; removing a missing document succeeds
    async fn delete(&self, name: &str) -> Result<()>;

    /// Remove a document only while it is still at `version`
    ///
    /// `false` when it was replaced or removed since that version was read.
    async fn delete_if_version(&self, name: &str, version: &str) -> Result<bool>;
}
