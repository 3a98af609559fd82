use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rollcall_roster::AttendanceStatus;

use crate::error::{ErrorKind, PipelineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Completed,
    Error,
}

/// One identity recorded as present by a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub identity_id: String,
    pub distance: f32,
    pub status: AttendanceStatus,
}

/// An identity that matched but whose attendance write failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    pub identity_id: String,
    pub message: String,
}

/// Report is the structured outcome of one submission.
///
/// A completed report with `faces_detected == 0` means the photo held no
/// faces; it is distinct from an error report of kind
/// [`ErrorKind::NoRosterForSession`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub status: ReportStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,

    pub message: String,

    #[serde(default)]
    pub attendance: Vec<AttendanceEntry>,

    #[serde(default)]
    pub faces_detected: usize,

    /// Namespace the session resolved to.
    pub collection_name: String,

    /// True when at least one matched identity could not be recorded.
    #[serde(default)]
    pub partial_failure: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RecordFailure>,

    pub processed_at: DateTime<Utc>,
}

impl Report {
    pub fn completed(
        collection_name: &str,
        faces_detected: usize,
        attendance: Vec<AttendanceEntry>,
        failures: Vec<RecordFailure>,
    ) -> Self {
        let message = if faces_detected == 0 {
            "No faces detected".to_string()
        } else if failures.is_empty() {
            format!("Processed {faces_detected} faces")
        } else {
            format!(
                "Processed {faces_detected} faces, {} attendance writes failed",
                failures.len()
            )
        };
        Self {
            status: ReportStatus::Completed,
            kind: None,
            message,
            attendance,
            faces_detected,
            collection_name: collection_name.to_string(),
            partial_failure: !failures.is_empty(),
            failures,
            processed_at: Utc::now(),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>, collection_name: &str) -> Self {
        Self {
            status: ReportStatus::Error,
            kind: Some(kind),
            message: message.into(),
            attendance: Vec::new(),
            faces_detected: 0,
            collection_name: collection_name.to_string(),
            partial_failure: false,
            failures: Vec::new(),
            processed_at: Utc::now(),
        }
    }

    pub fn from_error(err: &PipelineError, collection_name: &str) -> Self {
        Self::error(err.kind(), err.to_string(), collection_name)
    }

    pub fn is_error(&self) -> bool {
        self.status == ReportStatus::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_report_json_shape() {
        let r = Report::completed(
            "Math101_9AM",
            2,
            vec![AttendanceEntry {
                identity_id: "s-1".into(),
                distance: 0.25,
                status: AttendanceStatus::Present,
            }],
            vec![],
        );
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "completed");
        assert_eq!(v["message"], "Processed 2 faces");
        assert_eq!(v["facesDetected"], 2);
        assert_eq!(v["collectionName"], "Math101_9AM");
        assert_eq!(v["attendance"][0]["identityId"], "s-1");
        assert_eq!(v["attendance"][0]["status"], "present");
        assert_eq!(v["partialFailure"], false);
        assert!(v.get("kind").is_none());
        assert!(v.get("failures").is_none());
    }

    #[test]
    fn zero_faces_is_completed_not_error() {
        let r = Report::completed("Math101_9AM", 0, vec![], vec![]);
        assert!(!r.is_error());
        assert_eq!(r.message, "No faces detected");
    }

    #[test]
    fn error_report_carries_kind() {
        let err = PipelineError::NoRoster {
            namespace: "Chem_8AM".into(),
        };
        let r = Report::from_error(&err, "Chem_8AM");
        assert!(r.is_error());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(v["kind"], "NoRosterForSession");
        assert_eq!(v["collectionName"], "Chem_8AM");
    }

    #[test]
    fn failures_set_partial_flag() {
        let r = Report::completed(
            "ns",
            1,
            vec![],
            vec![RecordFailure {
                identity_id: "s-1".into(),
                message: "disk full".into(),
            }],
        );
        assert!(r.partial_failure);
        assert_eq!(r.message, "Processed 1 faces, 1 attendance writes failed");
    }
}
