use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::DispatchError;

/// Subscription yields payloads published to one topic.
pub struct Subscription {
    pub(crate) rx: mpsc::UnboundedReceiver<Bytes>,
}

impl Subscription {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<Bytes>, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Subscription { rx })
    }

    /// Wait for the next payload. `None` once the broker is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// MessageBroker moves jobs and results between dispatchers and workers.
///
/// A subscription without a group receives every message on the topic.
/// Subscriptions sharing a group split the topic: each message goes to
/// exactly one member.
#[async_trait::async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), DispatchError>;

    async fn subscribe(
        &self,
        topic: &str,
        group: Option<&str>,
    ) -> Result<Subscription, DispatchError>;
}
