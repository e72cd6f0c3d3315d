//! SQLite database for locally persisted vector records
//!
//! Backs `LocalVectorStore`. Records get a store-assigned integer key; the
//! identity column is indexed so existence checks stay cheap.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::IndexedRecord;

/// SQLite-based record database
pub struct RecordDb {
    conn: Arc<Mutex<Connection>>,
}

impl RecordDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::vector_db(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::vector_db(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#).map_err(|e| Error::vector_db(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                etag TEXT NOT NULL,
                filename TEXT NOT NULL,
                chunk_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_etag ON records(etag);
            -- one record per (identity, key, chunk)
            CREATE UNIQUE INDEX IF NOT EXISTS idx_records_chunk
                ON records(etag, filename, chunk_id);

            CREATE TABLE IF NOT EXISTS collection_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#).map_err(|e| Error::vector_db(format!("Failed to create schema: {}", e)))?;

        Ok(())
    }

    /// Record the vector dimension, or check it against the recorded one
    pub fn ensure_dimension(&self, dimensions: usize) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR IGNORE INTO collection_meta (key, value) VALUES ('dimension', ?1)",
            params![dimensions.to_string()],
        )?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM collection_meta WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored.and_then(|v| v.parse::<usize>().ok()) {
            Some(existing) if existing != dimensions => Err(Error::vector_db(format!(
                "Collection was created with dimension {}, configured dimension is {}",
                existing, dimensions
            ))),
            _ => Ok(()),
        }
    }

    /// Distinct identities among `identities` that have at least one record
    pub fn find_identities(&self, identities: &[String], limit: usize) -> Result<Vec<String>> {
        if identities.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let placeholders = vec!["?"; identities.len()].join(",");
        let sql = format!(
            "SELECT DISTINCT etag FROM records WHERE etag IN ({}) LIMIT {}",
            placeholders, limit
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(identities.iter()), |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Insert records in one transaction
    ///
    /// Either every record is stored or none is.
    pub fn insert_records(&self, records: &[IndexedRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::vector_db(format!("Failed to begin transaction: {}", e)))?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO records (etag, filename, chunk_id, text, vector, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;

            let now = Utc::now().to_rfc3339();
            for record in records {
                stmt.execute(params![
                    record.content_identity,
                    record.source_key,
                    record.chunk_index,
                    record.text,
                    vector_to_blob(&record.vector),
                    now,
                ])?;
            }
        }

        tx.commit()
            .map_err(|e| Error::vector_db(format!("Failed to commit transaction: {}", e)))?;

        Ok(records.len())
    }

    /// Total number of records
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Records stored for one identity, ordered by key then chunk
    pub fn records_for_identity(&self, identity: &str) -> Result<Vec<IndexedRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT etag, filename, chunk_id, text, vector FROM records
            WHERE etag = ?1 ORDER BY filename, chunk_id
            "#,
        )?;

        let records = stmt
            .query_map(params![identity], |row| {
                let blob: Vec<u8> = row.get(4)?;
                Ok(IndexedRecord {
                    content_identity: row.get(0)?,
                    source_key: row.get(1)?,
                    chunk_index: row.get(2)?,
                    text: row.get(3)?,
                    vector: blob_to_vector(&blob),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(identity: &str, key: &str, chunk_index: u32) -> IndexedRecord {
        IndexedRecord {
            content_identity: identity.to_string(),
            source_key: key.to_string(),
            chunk_index,
            text: format!("chunk {}", chunk_index),
            vector: vec![0.25, -1.5, 3.0],
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = RecordDb::in_memory().unwrap();
        db.insert_records(&[record("e1", "a.pdf", 0), record("e1", "a.pdf", 1)])
            .unwrap();
        db.insert_records(&[record("e2", "b.pdf", 0)]).unwrap();

        let mut found = db
            .find_identities(&["e1".into(), "e2".into(), "e3".into()], 10)
            .unwrap();
        found.sort();
        assert_eq!(found, vec!["e1".to_string(), "e2".to_string()]);
        assert_eq!(db.count().unwrap(), 3);
    }

    #[test]
    fn test_vector_round_trips_through_blob() {
        let db = RecordDb::in_memory().unwrap();
        db.insert_records(&[record("e1", "a.pdf", 0)]).unwrap();

        let stored = db.records_for_identity("e1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].vector, vec![0.25, -1.5, 3.0]);
    }

    #[test]
    fn test_duplicate_chunk_rolls_back_whole_batch() {
        let db = RecordDb::in_memory().unwrap();
        db.insert_records(&[record("e1", "a.pdf", 0)]).unwrap();

        let result = db.insert_records(&[record("e1", "a.pdf", 1), record("e1", "a.pdf", 0)]);
        assert!(result.is_err());
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let db = RecordDb::in_memory().unwrap();
        db.ensure_dimension(768).unwrap();
        db.ensure_dimension(768).unwrap();
        assert!(db.ensure_dimension(384).is_err());
    }
}
