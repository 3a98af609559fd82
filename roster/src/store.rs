use chrono::NaiveDate;

use crate::error::StoreError;
use crate::types::{AttendanceRecord, EmbeddingDoc, RosterEntry};

/// One listed roster document: either a decoded entry or the error that
/// prevented decoding it. Per-document failures do not fail the listing.
pub type RosterItem = Result<RosterEntry, StoreError>;

/// EmbeddingStore persists enrolled face embeddings per session namespace.
///
/// Implementations must be safe for concurrent use.
pub trait EmbeddingStore: Send + Sync {
    /// Enroll or replace the embedding of `identity` in `namespace`.
    fn put_embedding(
        &self,
        namespace: &str,
        identity: &str,
        embedding: &[f32],
    ) -> Result<(), StoreError>;

    /// Remove an enrolled identity. No error if it does not exist.
    fn delete_embedding(&self, namespace: &str, identity: &str) -> Result<(), StoreError>;

    /// List every stored document of `namespace` in key order.
    ///
    /// The outer error is a failure to read the namespace at all; inner
    /// errors belong to single documents.
    fn list_embeddings(&self, namespace: &str) -> Result<Vec<RosterItem>, StoreError>;
}

/// AttendanceStore persists attendance records per session namespace.
pub trait AttendanceStore: Send + Sync {
    /// Insert or merge the record keyed by
    /// `(namespace, record.date, record.identity_id)`.
    fn upsert_attendance(&self, namespace: &str, record: &AttendanceRecord)
        -> Result<(), StoreError>;

    /// Return the records of `namespace` on `date`, ordered by identity.
    fn query_attendance(
        &self,
        namespace: &str,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;
}

/// Check an enrollment request and build the document to store.
pub(crate) fn enrollment_doc(identity: &str, embedding: &[f32]) -> Result<EmbeddingDoc, StoreError> {
    if identity.is_empty() || identity.chars().any(char::is_control) {
        return Err(StoreError::InvalidIdentity(identity.to_string()));
    }
    rollcall_vecstore::normalize(embedding).map_err(|source| StoreError::InvalidEmbedding {
        identity: identity.to_string(),
        source,
    })?;
    Ok(EmbeddingDoc {
        embedding: Some(embedding.to_vec()),
        enrolled_at: Some(chrono::Utc::now()),
    })
}
