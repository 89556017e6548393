//! Record-store port and adapters for ITR.
//!
//! The ingestion pipeline depends on the [`TenderStore`] trait only; the
//! concrete adapter is injected at the application boundary. Two adapters
//! live here: an in-memory fake for tests and embedding, and a JSON file
//! store giving best-effort local persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use itr_core::TenderRecord;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "itr-storage";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt store file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Key-value persistence port keyed by tender id.
///
/// Per-record upsert is the only atomicity the pipeline relies on.
#[async_trait]
pub trait TenderStore: Send + Sync {
    /// Fetch one record by id.
    async fn get(&self, id: &str) -> Result<Option<TenderRecord>, StorageError>;

    /// Fetch the full collection, ordered by id.
    async fn get_all(&self) -> Result<Vec<TenderRecord>, StorageError>;

    /// Insert or replace one record.
    async fn put(&self, record: TenderRecord) -> Result<(), StorageError>;

    /// Bulk delete-all.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// In-memory store, used as the test fake and for headless embedding.
#[derive(Default)]
pub struct MemoryTenderStore {
    records: Mutex<BTreeMap<String, TenderRecord>>,
}

impl MemoryTenderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenderStore for MemoryTenderStore {
    async fn get(&self, id: &str) -> Result<Option<TenderRecord>, StorageError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<TenderRecord>, StorageError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn put(&self, record: TenderRecord) -> Result<(), StorageError> {
        self.records.lock().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.records.lock().await.clear();
        Ok(())
    }
}

/// One JSON document on disk, rewritten on every mutation through a
/// temp-file-plus-atomic-rename so a crash never leaves a torn file.
#[derive(Debug)]
pub struct JsonFileTenderStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, TenderRecord>>,
}

impl JsonFileTenderStore {
    /// Open the store, loading any existing file. A missing file is an
    /// empty store; an unreadable or undecodable file is an error rather
    /// than silent data loss.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let records = match fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<TenderRecord> =
                    serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                list.into_iter().map(|r| (r.id.clone(), r)).collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StorageError::Io {
                    path,
                    source,
                })
            }
        };
        debug!(path = %path.display(), records = records.len(), "opened tender store");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &BTreeMap<String, TenderRecord>) -> Result<(), StorageError> {
        let list: Vec<&TenderRecord> = records.values().collect();
        let bytes = serde_json::to_vec_pretty(&list).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }

        let temp_path = self
            .path
            .with_file_name(format!(".{}.tmp", Uuid::new_v4()));
        let mut file = fs::File::create(&temp_path).await.map_err(io_err)?;
        file.write_all(&bytes).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        drop(file);

        match fs::rename(&temp_path, &self.path).await {
            Ok(()) => Ok(()),
            Err(source) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(io_err(source))
            }
        }
    }
}

#[async_trait]
impl TenderStore for JsonFileTenderStore {
    async fn get(&self, id: &str) -> Result<Option<TenderRecord>, StorageError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<TenderRecord>, StorageError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn put(&self, record: TenderRecord) -> Result<(), StorageError> {
        let mut records = self.records.lock().await;
        records.insert(record.id.clone(), record);
        self.persist(&records).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut records = self.records.lock().await;
        records.clear();
        self.persist(&records).await
    }
}
