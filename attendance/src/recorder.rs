use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tracing::info;

use rollcall_roster::{AttendanceRecord, AttendanceStatus, AttendanceStore};

use crate::error::PipelineError;

/// AttendanceRecorder writes date-scoped attendance marks.
///
/// Writes are upserts keyed by (namespace, local date, identity), so
/// repeating a mark on the same day leaves a single record.
pub struct AttendanceRecorder {
    store: Arc<dyn AttendanceStore>,
}

impl AttendanceRecorder {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    /// Mark `identity` present now.
    pub fn record(
        &self,
        namespace: &str,
        identity: &str,
        class_name: &str,
        slot: &str,
    ) -> Result<AttendanceRecord, PipelineError> {
        self.record_at(namespace, identity, class_name, slot, Local::now())
    }

    /// Mark `identity` present at `at`; the record date is `at`'s local date.
    pub fn record_at(
        &self,
        namespace: &str,
        identity: &str,
        class_name: &str,
        slot: &str,
        at: DateTime<Local>,
    ) -> Result<AttendanceRecord, PipelineError> {
        let record = AttendanceRecord {
            identity_id: identity.to_string(),
            class_name: class_name.to_string(),
            slot: slot.to_string(),
            date: at.date_naive(),
            status: AttendanceStatus::Present,
            timestamp: at.with_timezone(&Utc),
            first_marked_at: None,
        };

        self.store
            .upsert_attendance(namespace, &record)
            .map_err(|source| PipelineError::Persistence {
                identity: identity.to_string(),
                source,
            })?;

        info!(namespace, identity, class_name, slot, date = %record.date, "attendance marked");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rollcall_roster::{MemoryRoster, StoreError};

    struct ReadOnlyStore;

    impl AttendanceStore for ReadOnlyStore {
        fn upsert_attendance(&self, _: &str, _: &AttendanceRecord) -> Result<(), StoreError> {
            Err(StoreError::Storage("read-only".into()))
        }

        fn query_attendance(
            &self,
            _: &str,
            _: NaiveDate,
        ) -> Result<Vec<AttendanceRecord>, StoreError> {
            Ok(vec![])
        }
    }

    #[test]
    fn record_twice_same_day_leaves_one() {
        let roster = Arc::new(MemoryRoster::new());
        let rec = AttendanceRecorder::new(roster.clone());
        let morning = Local.with_ymd_and_hms(2024, 3, 7, 9, 0, 0).unwrap();
        let later = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap();

        rec.record_at("Math101_9AM", "s-1", "Math 101", "9AM", morning).unwrap();
        rec.record_at("Math101_9AM", "s-1", "Math 101", "9AM", later).unwrap();

        let day = roster
            .query_attendance("Math101_9AM", morning.date_naive())
            .unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].timestamp, later.with_timezone(&Utc));
        assert_eq!(day[0].first_marked_at, Some(morning.with_timezone(&Utc)));
        assert_eq!(day[0].status, AttendanceStatus::Present);
    }

    #[test]
    fn different_days_are_separate_records() {
        let roster = Arc::new(MemoryRoster::new());
        let rec = AttendanceRecorder::new(roster.clone());
        let d1 = Local.with_ymd_and_hms(2024, 3, 7, 9, 0, 0).unwrap();
        let d2 = Local.with_ymd_and_hms(2024, 3, 8, 9, 0, 0).unwrap();
        rec.record_at("ns", "s-1", "Math", "9AM", d1).unwrap();
        rec.record_at("ns", "s-1", "Math", "9AM", d2).unwrap();
        assert_eq!(roster.attendance_len(), 2);
    }

    #[test]
    fn write_failure_is_surfaced() {
        let rec = AttendanceRecorder::new(Arc::new(ReadOnlyStore));
        let err = rec.record("ns", "s-1", "Math", "9AM").unwrap_err();
        assert!(matches!(err, PipelineError::Persistence { ref identity, .. } if identity == "s-1"));
        assert_eq!(err.kind(), crate::error::ErrorKind::PersistenceError);
    }
}
