use crate::record::EmailRecord;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::{Path, PathBuf};

const EMAILS: TableDefinition<&str, &[u8]> = TableDefinition::new("emails");

/// redb-backed record store: one JSON-encoded `EmailRecord` per message id.
pub struct Store {
    db: Database,
    path: PathBuf,
}

#[derive(Debug)]
pub enum StoreError {
    Database(String),
    Codec(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "store error: {}", e),
            StoreError::Codec(e) => write!(f, "store record encoding error: {}", e),
        }
    }
}

impl Store {
    pub fn open(path: &Path) -> Result<Store, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Database(format!("failed to create store dir: {}", e))
                })?;
            }
        }
        let db = Database::create(path).map_err(|e| {
            StoreError::Database(format!("failed to open store at {}: {}", path.display(), e))
        })?;

        // Ensure tables exist
        let txn = db
            .begin_write()
            .map_err(|e| StoreError::Database(format!("write txn: {}", e)))?;
        {
            txn.open_table(EMAILS)
                .map_err(|e| StoreError::Database(format!("open emails table: {}", e)))?;
        }
        txn.commit()
            .map_err(|e| StoreError::Database(format!("commit: {}", e)))?;

        Ok(Store {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[allow(dead_code)]
    pub fn get_record(&self, id: &str) -> Result<Option<EmailRecord>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(format!("read txn: {}", e)))?;
        let table = txn
            .open_table(EMAILS)
            .map_err(|e| StoreError::Database(format!("open emails table: {}", e)))?;
        let value = table
            .get(id)
            .map_err(|e| StoreError::Database(format!("get {}: {}", id, e)))?;
        match value {
            Some(bytes) => serde_json::from_slice(bytes.value())
                .map(Some)
                .map_err(|e| StoreError::Codec(format!("record {}: {}", id, e))),
            None => Ok(None),
        }
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(format!("read txn: {}", e)))?;
        let table = txn
            .open_table(EMAILS)
            .map_err(|e| StoreError::Database(format!("open emails table: {}", e)))?;
        table
            .len()
            .map_err(|e| StoreError::Database(format!("count emails: {}", e)))
    }

    /// Full scan of the emails table, in key order.
    pub fn all_records(&self) -> Result<Vec<EmailRecord>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(format!("read txn: {}", e)))?;
        let table = txn
            .open_table(EMAILS)
            .map_err(|e| StoreError::Database(format!("open emails table: {}", e)))?;
        let iter = table
            .iter()
            .map_err(|e| StoreError::Database(format!("scan emails: {}", e)))?;

        let mut records = Vec::new();
        for entry in iter {
            let (key, value) =
                entry.map_err(|e| StoreError::Database(format!("scan emails: {}", e)))?;
            let record: EmailRecord = serde_json::from_slice(value.value())
                .map_err(|e| StoreError::Codec(format!("record {}: {}", key.value(), e)))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Upsert records by id in a single write transaction. Each record
    /// replaces whatever was stored under its id.
    pub fn put_records(&self, records: &[EmailRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Database(format!("write txn: {}", e)))?;
        {
            let mut table = txn
                .open_table(EMAILS)
                .map_err(|e| StoreError::Database(format!("open emails table: {}", e)))?;
            for record in records {
                let bytes = serde_json::to_vec(record)
                    .map_err(|e| StoreError::Codec(format!("record {}: {}", record.id, e)))?;
                table
                    .insert(record.id.as_str(), bytes.as_slice())
                    .map_err(|e| {
                        StoreError::Database(format!("insert {}: {}", record.id, e))
                    })?;
            }
        }
        txn.commit()
            .map_err(|e| StoreError::Database(format!("commit: {}", e)))?;
        log_debug!("[Store] Committed {} record(s)", records.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_record;

    fn open_temp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("nested").join("mail.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_store_put_get() {
        let (_dir, store) = open_temp();

        let record = test_record("e1");
        store.put_records(&[record.clone()]).unwrap();

        let stored = store.get_record("e1").unwrap().unwrap();
        assert_eq!(stored, record);
        assert!(store.get_record("missing").unwrap().is_none());
    }

    #[test]
    fn test_store_upsert_replaces_whole_record() {
        let (_dir, store) = open_temp();

        let mut first = test_record("e1");
        first.body = "original body".to_string();
        store.put_records(&[first]).unwrap();

        let mut second = test_record("e1");
        second.subject = "Changed".to_string();
        second.label_ids.clear();
        store.put_records(&[second.clone()]).unwrap();

        let stored = store.get_record("e1").unwrap().unwrap();
        assert_eq!(stored.subject, "Changed");
        assert_eq!(stored.body, "");
        assert!(stored.label_ids.is_empty());
        assert_eq!(store.all_records().unwrap().len(), 1);
    }

    #[test]
    fn test_store_all_records() {
        let (_dir, store) = open_temp();
        assert!(store.all_records().unwrap().is_empty());

        store
            .put_records(&[test_record("b"), test_record("a"), test_record("c")])
            .unwrap();

        let ids: Vec<String> = store
            .all_records()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_store_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.redb");
        {
            let store = Store::open(&path).unwrap();
            store.put_records(&[test_record("e1")]).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert!(store.get_record("e1").unwrap().is_some());
        assert_eq!(store.path(), path.as_path());
    }
}
