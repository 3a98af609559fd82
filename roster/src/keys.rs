use chrono::NaiveDate;

/// Strip every character that is not alphanumeric.
pub fn sanitize(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Derive the storage namespace for a (class, slot) session.
/// Format: `{sanitize(class)}_{sanitize(slot)}`
///
/// Inputs that differ only in stripped characters share a namespace:
/// `("Math 101", "9AM")` and `("Math101", "9 AM")` both map to
/// `Math101_9AM`. Callers rely on this to tolerate inconsistent spacing
/// and punctuation in user-entered class names.
pub fn namespace(class_name: &str, slot: &str) -> String {
    format!("{}_{}", sanitize(class_name), sanitize(slot))
}

/// Build the key for an enrolled embedding.
/// Format: `{ns}:emb:{identity}`
pub fn embedding_key(ns: &str, identity: &str) -> String {
    format!("{ns}:emb:{identity}")
}

/// Return the prefix for listing all embeddings of a session.
/// Format: `{ns}:emb:`
pub fn embedding_prefix(ns: &str) -> String {
    format!("{ns}:emb:")
}

/// Build the key for an attendance record.
/// Format: `{ns}:att:{YYYY-MM-DD}:{identity}`
pub fn attendance_key(ns: &str, date: NaiveDate, identity: &str) -> String {
    format!("{ns}:att:{}:{identity}", date.format("%Y-%m-%d"))
}

/// Return the prefix for listing one day's attendance of a session.
/// Format: `{ns}:att:{YYYY-MM-DD}:`
pub fn attendance_prefix(ns: &str, date: NaiveDate) -> String {
    format!("{ns}:att:{}:", date.format("%Y-%m-%d"))
}
