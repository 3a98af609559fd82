use std::time::Duration;

use thiserror::Error;

use rollcall_attendance::ErrorKind;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("dispatch: broker: {0}")]
    Broker(String),

    #[error("dispatch: blob store: {0}")]
    Blob(String),

    #[error("dispatch: codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// The result did not arrive in time. The job may still complete later.
    #[error("dispatch: no result for {correlation_id} after {waited:?}")]
    Timeout {
        correlation_id: String,
        waited: Duration,
    },

    #[error("dispatch: unknown correlation id {0}")]
    UnknownCorrelation(String),

    #[error("dispatch: closed")]
    Closed,
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Timeout { .. } => ErrorKind::TimeoutError,
            DispatchError::Broker(_) | DispatchError::Closed => ErrorKind::BrokerError,
            DispatchError::Blob(_)
            | DispatchError::Codec(_)
            | DispatchError::UnknownCorrelation(_) => ErrorKind::InternalError,
        }
    }
}

impl From<rumqttc::ClientError> for DispatchError {
    fn from(e: rumqttc::ClientError) -> Self {
        DispatchError::Broker(e.to_string())
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(e: std::io::Error) -> Self {
        DispatchError::Blob(e.to_string())
    }
}
