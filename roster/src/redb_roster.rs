//! Redb-backed persistent roster.

use std::path::Path;

use chrono::NaiveDate;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, warn};

use crate::error::{StoreError, storage};
use crate::keys::{attendance_key, attendance_prefix, embedding_key, embedding_prefix};
use crate::store::{AttendanceStore, EmbeddingStore, RosterItem, enrollment_doc};
use crate::types::{AttendanceRecord, EmbeddingDoc, RosterEntry};

const EMBEDDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("embeddings");
const ATTENDANCE: TableDefinition<&str, &[u8]> = TableDefinition::new("attendance");

/// A persistent roster backed by a single redb file.
///
/// Documents are MessagePack-encoded with named fields.
pub struct RedbRoster {
    db: Database,
}

impl RedbRoster {
    /// Open or create a roster database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(storage)?;

        let tx = db.begin_write().map_err(storage)?;
        {
            tx.open_table(EMBEDDINGS).map_err(storage)?;
            tx.open_table(ATTENDANCE).map_err(storage)?;
        }
        tx.commit().map_err(storage)?;

        debug!(path = %path.as_ref().display(), "roster opened");
        Ok(Self { db })
    }

    fn put_doc(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut table = tx.open_table(EMBEDDINGS).map_err(storage)?;
            table.insert(key, data).map_err(storage)?;
        }
        tx.commit().map_err(storage)
    }

    /// Collect `(key, value)` pairs of `table` whose key starts with `prefix`.
    fn scan(
        &self,
        def: TableDefinition<'static, &'static str, &'static [u8]>,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(def).map_err(storage)?;

        let mut out = Vec::new();
        for item in table.range(prefix..).map_err(storage)? {
            let (k, v) = item.map_err(storage)?;
            let key = k.value();
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_string(), v.value().to_vec()));
        }
        Ok(out)
    }
}

impl EmbeddingStore for RedbRoster {
    fn put_embedding(
        &self,
        namespace: &str,
        identity: &str,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        let doc = enrollment_doc(identity, embedding)?;
        let data =
            rmp_serde::to_vec_named(&doc).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put_doc(&embedding_key(namespace, identity), &data)
    }

    fn delete_embedding(&self, namespace: &str, identity: &str) -> Result<(), StoreError> {
        let key = embedding_key(namespace, identity);
        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut table = tx.open_table(EMBEDDINGS).map_err(storage)?;
            table.remove(key.as_str()).map_err(storage)?;
        }
        tx.commit().map_err(storage)
    }

    fn list_embeddings(&self, namespace: &str) -> Result<Vec<RosterItem>, StoreError> {
        let prefix = embedding_prefix(namespace);
        let rows = self.scan(EMBEDDINGS, &prefix)?;

        Ok(rows
            .into_iter()
            .map(|(key, value)| {
                let doc: EmbeddingDoc =
                    rmp_serde::from_slice(&value).map_err(|e| StoreError::Malformed {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(RosterEntry {
                    id: key[prefix.len()..].to_string(),
                    embedding: doc.embedding,
                })
            })
            .collect())
    }
}

impl AttendanceStore for RedbRoster {
    fn upsert_attendance(
        &self,
        namespace: &str,
        record: &AttendanceRecord,
    ) -> Result<(), StoreError> {
        let key = attendance_key(namespace, record.date, &record.identity_id);

        // Read, merge and write inside one write transaction so concurrent
        // marks of the same key cannot interleave.
        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut table = tx.open_table(ATTENDANCE).map_err(storage)?;
            let existing = table
                .get(key.as_str())
                .map_err(storage)?
                .map(|v| v.value().to_vec());
            let existing: Option<AttendanceRecord> = match existing {
                Some(data) => match rmp_serde::from_slice(&data) {
                    Ok(rec) => Some(rec),
                    Err(e) => {
                        warn!(key = %key, error = %e, "overwriting malformed attendance record");
                        None
                    }
                },
                None => None,
            };
            let merged = record.clone().merged_over(existing.as_ref());
            let data = rmp_serde::to_vec_named(&merged)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            table.insert(key.as_str(), data.as_slice()).map_err(storage)?;
        }
        tx.commit().map_err(storage)
    }

    fn query_attendance(
        &self,
        namespace: &str,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let rows = self.scan(ATTENDANCE, &attendance_prefix(namespace, date))?;
        rows.into_iter()
            .map(|(key, value)| {
                rmp_serde::from_slice(&value).map_err(|e| StoreError::Malformed {
                    key,
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}
