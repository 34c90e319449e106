//! Cached documents.

use crate::error::Result;
use crate::model::{DocumentMetadataSummary, FontModel};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;

/// Where the bytes of a cached document live.
#[derive(Debug, Clone)]
pub enum DocumentStorage {
    Memory(Arc<Vec<u8>>),
    /// Temp file, deleted when the last handle is dropped
    Disk(Arc<TempPath>),
}

/// A converted document kept for page-level and incremental operations.
///
/// Entries are never mutated once cached; updates build a new entry and
/// replace the old one.
#[derive(Debug, Clone)]
pub struct CachedDocumentEntry {
    pub job_id: String,
    storage: DocumentStorage,
    size: u64,
    pub metadata: Option<DocumentMetadataSummary>,
    /// Font models keyed by uid (or `page:id` when there is no uid)
    pub fonts: BTreeMap<String, FontModel>,
    /// Per page: font resource id -> key in `fonts`
    pub page_fonts: HashMap<u32, BTreeMap<String, String>>,
    pub created_at: DateTime<Utc>,
}

impl CachedDocumentEntry {
    /// Create an in-memory entry.
    pub fn new(job_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            job_id: job_id.into(),
            size: bytes.len() as u64,
            storage: DocumentStorage::Memory(Arc::new(bytes)),
            metadata: None,
            fonts: BTreeMap::new(),
            page_fonts: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadataSummary) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_fonts(mut self, fonts: BTreeMap<String, FontModel>) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn with_page_fonts(mut self, page_fonts: HashMap<u32, BTreeMap<String, String>>) -> Self {
        self.page_fonts = page_fonts;
        self
    }

    /// Same metadata and fonts over new document bytes, held in memory.
    pub fn with_updated_bytes(&self, bytes: Vec<u8>) -> Self {
        Self {
            job_id: self.job_id.clone(),
            size: bytes.len() as u64,
            storage: DocumentStorage::Memory(Arc::new(bytes)),
            metadata: self.metadata.clone(),
            fonts: self.fonts.clone(),
            page_fonts: self.page_fonts.clone(),
            created_at: Utc::now(),
        }
    }

    /// Document bytes, read back from disk for spilled entries.
    pub fn bytes(&self) -> Result<Arc<Vec<u8>>> {
        match &self.storage {
            DocumentStorage::Memory(bytes) => Ok(bytes.clone()),
            DocumentStorage::Disk(path) => Ok(Arc::new(std::fs::read(&**path)?)),
        }
    }

    /// Size of the document in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes this entry holds in memory; zero once spilled.
    pub fn memory_footprint(&self) -> u64 {
        match self.storage {
            DocumentStorage::Memory(_) => self.size,
            DocumentStorage::Disk(_) => 0,
        }
    }

    pub fn is_on_disk(&self) -> bool {
        matches!(self.storage, DocumentStorage::Disk(_))
    }

    pub fn storage(&self) -> &DocumentStorage {
        &self.storage
    }

    /// Copy of this entry with its bytes moved to a temp file in `dir`.
    pub fn spilled(&self, dir: &Path) -> Result<Self> {
        let path = match &self.storage {
            DocumentStorage::Disk(path) => path.clone(),
            DocumentStorage::Memory(bytes) => {
                std::fs::create_dir_all(dir)?;
                let mut file = tempfile::Builder::new()
                    .prefix("pdfjson-cache-")
                    .suffix(".pdf")
                    .tempfile_in(dir)?;
                file.write_all(bytes)?;
                file.flush()?;
                Arc::new(file.into_temp_path())
            }
        };
        Ok(Self {
            storage: DocumentStorage::Disk(path),
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spill_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let entry = CachedDocumentEntry::new("job-1", b"%PDF-1.7 data".to_vec());
        assert_eq!(entry.memory_footprint(), 13);

        let spilled = entry.spilled(dir.path()).unwrap();
        assert!(spilled.is_on_disk());
        assert_eq!(spilled.memory_footprint(), 0);
        assert_eq!(spilled.size(), 13);
        assert_eq!(spilled.bytes().unwrap().as_slice(), b"%PDF-1.7 data");
    }

    #[test]
    fn test_temp_file_removed_with_last_handle() {
        let dir = tempfile::tempdir().unwrap();
        let spilled = CachedDocumentEntry::new("job-2", vec![1, 2, 3])
            .spilled(dir.path())
            .unwrap();
        let path = match spilled.storage() {
            DocumentStorage::Disk(path) => path.to_path_buf(),
            DocumentStorage::Memory(_) => unreachable!(),
        };
        assert!(path.exists());
        drop(spilled);
        assert!(!path.exists());
    }

    #[test]
    fn test_updated_bytes_keep_fonts() {
        let mut fonts = BTreeMap::new();
        fonts.insert("job:1:F1".to_string(), FontModel::new("F1", 1));
        let entry = CachedDocumentEntry::new("job", vec![0; 4]).with_fonts(fonts);
        let updated = entry.with_updated_bytes(vec![0; 8]);
        assert_eq!(updated.size(), 8);
        assert_eq!(updated.fonts.len(), 1);
        assert_eq!(entry.size(), 4);
    }
}
