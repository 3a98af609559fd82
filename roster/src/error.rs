use std::fmt::Display;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("roster: storage error: {0}")]
    Storage(String),

    #[error("roster: serialization error: {0}")]
    Serialization(String),

    #[error("roster: malformed document {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("roster: invalid embedding for {identity}: {source}")]
    InvalidEmbedding {
        identity: String,
        source: rollcall_vecstore::VecError,
    },

    #[error("roster: invalid identity id {0:?}")]
    InvalidIdentity(String),
}

pub(crate) fn storage<E: Display>(e: E) -> StoreError {
    StoreError::Storage(e.to_string())
}
