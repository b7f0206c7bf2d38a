use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::GenerationRecord;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only log of successful generations, persisted as one JSON array.
pub struct RecordStore {
    path: PathBuf,
    records: RwLock<Vec<GenerationRecord>>,
}

impl RecordStore {
    /// A missing or corrupt file opens as an empty store.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let records = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("⚠️ {} is unreadable ({}), starting with no records", path.display(), e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        info!("🗂️ Record store at {} ({} records)", path.display(), records.len());
        Self { path, records: RwLock::new(records) }
    }

    pub fn append(&self, record: GenerationRecord) -> Result<(), RecordError> {
        let mut guard = self.records.write();
        guard.push(record);
        if let Err(e) = self.persist(&guard) {
            guard.pop();
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self, records: &[GenerationRecord]) -> Result<(), RecordError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(records)?)?;
        Ok(())
    }

    pub fn list(&self) -> Vec<GenerationRecord> {
        self.records.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bytes::Bytes;

    use super::*;
    use crate::models::{CaptionStyle, GenerationResult};
    use pretty_assertions::assert_eq;

    fn record(product_id: &str) -> GenerationRecord {
        let result = GenerationResult {
            image_data: Bytes::from_static(b"img"),
            captions: BTreeMap::from([(CaptionStyle::ConfidentProfessional, "a".to_string())]),
            product_name: "仙草霜".into(),
        };
        GenerationRecord::from_result(product_id, true, &result)
    }

    #[test]
    fn appends_persist_across_reopen_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("records.json");

        let store = RecordStore::open(&path);
        assert!(store.list().is_empty());
        store.append(record("cream")).unwrap();
        store.append(record("oil")).unwrap();

        let reopened = RecordStore::open(&path);
        let ids: Vec<String> = reopened.list().into_iter().map(|r| r.product_id).collect();
        assert_eq!(ids, vec!["cream".to_string(), "oil".to_string()]);
        assert_eq!(reopened.list(), store.list());
    }

    #[test]
    fn corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(RecordStore::open(&path).list().is_empty());
    }

    #[test]
    fn failed_write_does_not_keep_the_record() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the write fail.
        let path = dir.path().join("records.json");
        fs::create_dir_all(&path).unwrap();
        let store = RecordStore::open(&path);
        assert!(store.append(record("cream")).is_err());
        assert!(store.list().is_empty());
    }
}
