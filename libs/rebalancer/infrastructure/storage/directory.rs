//! Local directory state store
//!
//! One file per document. Overwrites go through a temporary file and a rename
//! so a crash never leaves a half-written document behind. A document's
//! version is its exact file content.

use super::{Result, StateStore, StorageError, Versioned};
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub struct DirectoryStateStore {
    root: PathBuf,
}

impl DirectoryStateStore {
    /// Use `root` as the state directory, creating it if needed
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        debug!("[Store] Using state directory {:?}", root);
        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl StateStore for DirectoryStateStore {
    async fn read_versioned(&self, name: &str) -> Result<Option<Versioned>> {
        let path = self.path_for(name)?;
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(Versioned {
                document: serde_json::from_str(&content)?,
                version: content,
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, name: &str, document: &Value) -> Result<()> {
        let path = self.path_for(name)?;
        let tmp = self.root.join(format!(".{}.tmp", name));
        let json = serde_json::to_string_pretty(document)?;

        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn create_new(&self, name: &str, document: &Value) -> Result<bool> {
        let path = self.path_for(name)?;
        let json = serde_json::to_string_pretty(document)?;

        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        Ok(true)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_if_version(&self, name: &str, version: &str) -> Result<bool> {
        let path = self.path_for(name)?;

        // Only one caller can move the file away; the loser sees NotFound
        let claimed = self
            .root
            .join(format!(".{}.{:016x}.claimed", name, rand::random::<u64>()));
        match fs::rename(&path, &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let content = fs::read_to_string(&claimed).await?;
        if content == version {
            fs::remove_file(&claimed).await?;
            return Ok(true);
        }

        // Replaced since it was read: restore it unless another document already took its place
        match fs::hard_link(&claimed, &path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("[Store] {} recreated while restoring it", name);
            }
            Err(e) => return Err(e.into()),
        }
        fs::remove_file(&claimed).await?;
        Ok(false)
    }
}
