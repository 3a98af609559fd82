use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stored form of an enrolled face embedding.
///
/// `embedding` is optional because documents written by other tools may
/// lack it; such entries are listed but cannot join a search index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingDoc {
    #[serde(rename = "embedding", default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    #[serde(rename = "enrolledAt", default, skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<DateTime<Utc>>,
}

/// RosterEntry is one enrolled identity of a session as read back from
/// storage.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: String,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
        }
    }
}

/// AttendanceRecord marks one identity as seen in a session on a date.
///
/// Stored under `(namespace, date, identity_id)`; at most one record exists
/// per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "identityId")]
    pub identity_id: String,

    #[serde(rename = "class")]
    pub class_name: String,

    #[serde(rename = "slot")]
    pub slot: String,

    #[serde(rename = "date")]
    pub date: NaiveDate,

    #[serde(rename = "status")]
    pub status: AttendanceStatus,

    /// Time of the latest mark.
    #[serde(rename = "timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Time of the first mark on this date. Kept across re-marks.
    #[serde(rename = "firstMarkedAt", default, skip_serializing_if = "Option::is_none")]
    pub first_marked_at: Option<DateTime<Utc>>,
}

impl AttendanceRecord {
    /// Merge `self` (the incoming write) over an existing stored record.
    ///
    /// Every field of the incoming record overwrites the stored one, except
    /// `first_marked_at`, which keeps the earliest known value.
    pub fn merged_over(mut self, existing: Option<&AttendanceRecord>) -> AttendanceRecord {
        let first = existing
            .and_then(|e| e.first_marked_at.or(Some(e.timestamp)))
            .or(self.first_marked_at)
            .unwrap_or(self.timestamp);
        self.first_marked_at = Some(first);
        self
    }
}
