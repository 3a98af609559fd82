//! In-memory roster for tests and ephemeral runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::keys::{attendance_key, attendance_prefix, embedding_key, embedding_prefix};
use crate::store::{AttendanceStore, EmbeddingStore, RosterItem, enrollment_doc};
use crate::types::{AttendanceRecord, EmbeddingDoc, RosterEntry};

#[derive(Default)]
struct Tables {
    embeddings: BTreeMap<String, EmbeddingDoc>,
    attendance: BTreeMap<String, AttendanceRecord>,
}

/// MemoryRoster keeps embeddings and attendance in ordered maps.
/// Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryRoster {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document as-is, bypassing enrollment checks. Lets callers
    /// load rosters produced by other tools, including incomplete ones.
    pub fn put_doc(&self, namespace: &str, identity: &str, doc: EmbeddingDoc) {
        self.tables
            .lock()
            .embeddings
            .insert(embedding_key(namespace, identity), doc);
    }

    /// Total number of attendance records across all namespaces and dates.
    pub fn attendance_len(&self) -> usize {
        self.tables.lock().attendance.len()
    }
}

impl EmbeddingStore for MemoryRoster {
    fn put_embedding(
        &self,
        namespace: &str,
        identity: &str,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        let doc = enrollment_doc(identity, embedding)?;
        self.put_doc(namespace, identity, doc);
        Ok(())
    }

    fn delete_embedding(&self, namespace: &str, identity: &str) -> Result<(), StoreError> {
        self.tables
            .lock()
            .embeddings
            .remove(&embedding_key(namespace, identity));
        Ok(())
    }

    fn list_embeddings(&self, namespace: &str) -> Result<Vec<RosterItem>, StoreError> {
        let prefix = embedding_prefix(namespace);
        let tables = self.tables.lock();
        Ok(tables
            .embeddings
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, doc)| {
                Ok(RosterEntry {
                    id: k[prefix.len()..].to_string(),
                    embedding: doc.embedding.clone(),
                })
            })
            .collect())
    }
}

impl AttendanceStore for MemoryRoster {
    fn upsert_attendance(
        &self,
        namespace: &str,
        record: &AttendanceRecord,
    ) -> Result<(), StoreError> {
        let key = attendance_key(namespace, record.date, &record.identity_id);
        let mut tables = self.tables.lock();
        let merged = record.clone().merged_over(tables.attendance.get(&key));
        tables.attendance.insert(key, merged);
        Ok(())
    }

    fn query_attendance(
        &self,
        namespace: &str,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let prefix = attendance_prefix(namespace, date);
        let tables = self.tables.lock();
        Ok(tables
            .attendance
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(_, r)| r.clone())
            .collect())
    }
}
