//! Asynchronous submission of class photos.
//!
//! A [`Dispatcher`] stores the photo in a [`BlobStore`], publishes a
//! [`Job`] carrying a fresh correlation ID and waits, with a timeout, for
//! the [`JobResult`] bearing the same ID. [`Worker`]s share the job topic
//! as one consumer group, run the session pipeline and publish results.
//!
//! ```text
//! Dispatcher --Job--> job topic ($share/group) --> Worker
//!     ^                                              |
//!     +------ result topic (all dispatchers) <--JobResult
//! ```
//!
//! Delivery is at-least-once. A job processed twice marks attendance twice
//! into the same record, which the attendance upsert makes harmless.

mod blob;
mod broker;
mod dispatcher;
mod error;
mod memory_broker;
mod mqtt_broker;
mod types;
mod worker;

#[cfg(test)]
mod tests;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore, blob_ref};
pub use broker::{MessageBroker, Subscription};
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use memory_broker::MemoryBroker;
pub use mqtt_broker::{MqttBroker, MqttConfig, subscription_filter};
pub use types::{DispatchConfig, Job, JobResult, JobState};
pub use worker::Worker;
