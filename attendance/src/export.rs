//! Tabular attendance export.

use std::io::Write;

use chrono::{NaiveDate, SecondsFormat};
use serde::Serialize;

use rollcall_roster::{AttendanceStore, StoreError};

/// ExportRow is one attendance line of a session day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub identity_id: String,
    pub class: String,
    pub slot: String,
    pub date: String,
    pub status: String,
    pub first_marked_at: String,
    pub last_marked_at: String,
}

const CSV_HEADER: [&str; 7] = [
    "identityId",
    "class",
    "slot",
    "date",
    "status",
    "firstMarkedAt",
    "lastMarkedAt",
];

/// Read attendance for `namespace` on `date`, sorted by identity.
pub fn export_rows(
    store: &dyn AttendanceStore,
    namespace: &str,
    date: NaiveDate,
) -> Result<Vec<ExportRow>, StoreError> {
    let mut records = store.query_attendance(namespace, date)?;
    records.sort_by(|a, b| a.identity_id.cmp(&b.identity_id));

    Ok(records
        .into_iter()
        .map(|r| {
            let first = r.first_marked_at.unwrap_or(r.timestamp);
            ExportRow {
                identity_id: r.identity_id,
                class: r.class_name,
                slot: r.slot,
                date: r.date.format("%Y-%m-%d").to_string(),
                status: r.status.as_str().to_string(),
                first_marked_at: first.to_rfc3339_opts(SecondsFormat::Secs, true),
                last_marked_at: r.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            }
        })
        .collect())
}

/// Write `rows` as CSV with a header line, even when there are no rows.
pub fn write_csv<W: Write>(w: W, rows: &[ExportRow]) -> Result<(), csv::Error> {
    let mut out = csv::WriterBuilder::new().has_headers(false).from_writer(w);
    out.write_record(CSV_HEADER)?;
    for row in rows {
        out.serialize(row)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rollcall_roster::{AttendanceRecord, AttendanceStatus, MemoryRoster};

    fn mark(store: &MemoryRoster, id: &str, class: &str, secs: i64) {
        let rec = AttendanceRecord {
            identity_id: id.into(),
            class_name: class.into(),
            slot: "9AM".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
            status: AttendanceStatus::Present,
            timestamp: Utc.timestamp_opt(1_709_800_000 + secs, 0).unwrap(),
            first_marked_at: None,
        };
        store.upsert_attendance("ns", &rec).unwrap();
    }

    #[test]
    fn rows_sorted_by_identity() {
        let store = MemoryRoster::new();
        mark(&store, "s-2", "Math", 0);
        mark(&store, "s-1", "Math", 10);
        mark(&store, "s-1", "Math", 20);

        let rows = export_rows(&store, "ns", NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].identity_id, "s-1");
        assert_eq!(rows[0].status, "present");
        assert_eq!(rows[0].date, "2024-03-07");
        assert_ne!(rows[0].first_marked_at, rows[0].last_marked_at);
        assert_eq!(rows[1].identity_id, "s-2");
    }

    #[test]
    fn other_dates_are_excluded() {
        let store = MemoryRoster::new();
        mark(&store, "s-1", "Math", 0);
        let rows = export_rows(&store, "ns", NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn csv_quotes_special_fields() {
        let store = MemoryRoster::new();
        mark(&store, "s-1", "Math, \"advanced\"", 0);
        let rows = export_rows(&store, "ns", NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()).unwrap();

        let mut out = Vec::new();
        write_csv(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "identityId,class,slot,date,status,firstMarkedAt,lastMarkedAt"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("s-1,\"Math, \"\"advanced\"\"\",9AM,2024-03-07,present,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn csv_header_without_rows() {
        let mut out = Vec::new();
        write_csv(&mut out, &[]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "identityId,class,slot,date,status,firstMarkedAt,lastMarkedAt\n"
        );
    }
}
