//! Archive ingestion pipeline: ZIP of feed documents in, favorite-preserving
//! merged record collection out.
//!
//! Ingestion is two-phase. Every matching document is decoded, parsed and
//! extracted *before* the store is touched, so a malformed document aborts
//! the whole import and previously stored records stay intact. The merge
//! phase then upserts sequentially, which linearizes the read-favorite /
//! write-merged pair per id.

use std::io::{Read, Seek};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use itr_core::{TenderDraft, TenderRecord};
use itr_feed::FeedError;
use itr_storage::{StorageError, TenderStore};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

pub const CRATE_NAME: &str = "itr-ingest";

/// Archive entry suffixes that participate in an import.
const FEED_SUFFIXES: &[&str] = &[".xml", ".atom"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unreadable archive: {0}")]
    ArchiveRead(#[from] zip::result::ZipError),
    #[error("feed document {name}: {source}")]
    DocumentParse {
        name: String,
        #[source]
        source: FeedError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents: usize,
    pub extracted: usize,
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    /// Records built from this archive, post-merge.
    pub batch: Vec<TenderRecord>,
    /// The full collection read back after all upserts committed.
    pub records: Vec<TenderRecord>,
    pub summary: ImportSummary,
}

/// Ingestion front door over an abstract [`TenderStore`].
///
/// The internal gate serializes imports and makes the bulk clear mutually
/// exclusive with an in-flight import.
pub struct Ingestor {
    store: Arc<dyn TenderStore>,
    gate: Mutex<()>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn TenderStore>) -> Self {
        Self {
            store,
            gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn TenderStore> {
        &self.store
    }

    /// Import one compressed archive of feed documents.
    ///
    /// Entries whose names end in `.xml` or `.atom` are decoded as UTF-8
    /// text (lossily, for compatible encodings) and extracted; everything
    /// else in the archive is ignored. Any archive or document failure
    /// aborts the import before the first upsert.
    pub async fn import_archive<R: Read + Seek>(
        &self,
        reader: R,
    ) -> Result<ImportOutcome, IngestError> {
        let _guard = self.gate.lock().await;
        let started_at = Utc::now();

        // Extract phase: no store access until the whole archive parsed.
        let (documents, drafts) = extract_archive(reader)?;

        // Merge phase: rebuild each record from source, carry only the
        // stored favorite flag forward.
        let mut batch = Vec::with_capacity(drafts.len());
        let mut inserted = 0usize;
        let mut updated = 0usize;
        for draft in drafts {
            let mut record = draft.into_record();
            match self.store.get(&record.id).await? {
                Some(existing) => {
                    record.is_favorite = existing.is_favorite;
                    updated += 1;
                }
                None => inserted += 1,
            }
            self.store.put(record.clone()).await?;
            batch.push(record);
        }

        let records = self.store.get_all().await?;
        let summary = ImportSummary {
            started_at,
            finished_at: Utc::now(),
            documents,
            extracted: batch.len(),
            inserted,
            updated,
        };
        info!(
            documents = summary.documents,
            extracted = summary.extracted,
            inserted = summary.inserted,
            updated = summary.updated,
            "archive import complete"
        );
        Ok(ImportOutcome {
            batch,
            records,
            summary,
        })
    }

    /// Delete every stored record. Mutually exclusive with imports.
    pub async fn clear_all(&self) -> Result<(), IngestError> {
        let _guard = self.gate.lock().await;
        self.store.clear().await?;
        info!("tender store cleared");
        Ok(())
    }

    /// Set the user favorite flag on one record; persists immediately as a
    /// single-record upsert. Returns the updated record, or `None` for an
    /// unknown id.
    pub async fn toggle_favorite(
        &self,
        id: &str,
        value: bool,
    ) -> Result<Option<TenderRecord>, IngestError> {
        let Some(mut record) = self.store.get(id).await? else {
            return Ok(None);
        };
        record.is_favorite = value;
        self.store.put(record.clone()).await?;
        Ok(Some(record))
    }
}

fn is_feed_entry(name: &str) -> bool {
    FEED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn extract_archive<R: Read + Seek>(reader: R) -> Result<(usize, Vec<TenderDraft>), IngestError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut documents = 0usize;
    let mut drafts = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !entry.is_file() || !is_feed_entry(entry.name()) {
            continue;
        }
        let name = entry.name().to_string();
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| IngestError::ArchiveRead(zip::result::ZipError::Io(e)))?;
        let text = String::from_utf8_lossy(&bytes);
        let parsed = itr_feed::parse_feed(&text)
            .map_err(|source| IngestError::DocumentParse { name, source })?;
        documents += 1;
        drafts.extend(parsed);
    }

    Ok((documents, drafts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_feed_suffixes_participate() {
        assert!(is_feed_entry("datos/enero.atom"));
        assert!(is_feed_entry("enero.xml"));
        assert!(!is_feed_entry("README.txt"));
        assert!(!is_feed_entry("enero.xml.bak"));
    }
}
