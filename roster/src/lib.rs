//! Session-scoped storage for enrolled face embeddings and attendance.
//!
//! A session is a (class, slot) pair. Every stored document lives under the
//! session's namespace, derived by [`namespace`]:
//!
//! ```text
//! {ns}:emb:{identity}              enrolled embedding
//! {ns}:att:{YYYY-MM-DD}:{identity} attendance record
//! ```
//!
//! Two backends implement both [`EmbeddingStore`] and [`AttendanceStore`]:
//! [`MemoryRoster`] for tests and [`RedbRoster`] for persistence.

pub mod error;
pub mod keys;
pub mod memory;
pub mod redb_roster;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use keys::{namespace, sanitize};
pub use memory::MemoryRoster;
pub use redb_roster::RedbRoster;
pub use store::{AttendanceStore, EmbeddingStore, RosterItem};
pub use types::{AttendanceRecord, AttendanceStatus, EmbeddingDoc, RosterEntry};
