use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::broker::{MessageBroker, Subscription};
use crate::error::DispatchError;

#[derive(Default)]
struct Group {
    members: Vec<UnboundedSender<Bytes>>,
    next: usize,
}

impl Group {
    /// Deliver to the next live member, dropping closed ones.
    fn deliver(&mut self, payload: &Bytes) -> bool {
        while !self.members.is_empty() {
            let i = self.next % self.members.len();
            if self.members[i].send(payload.clone()).is_ok() {
                self.next = i + 1;
                return true;
            }
            self.members.remove(i);
        }
        false
    }
}

#[derive(Default)]
struct Topic {
    fanout: Vec<UnboundedSender<Bytes>>,
    groups: BTreeMap<String, Group>,
}

/// MemoryBroker is an in-process [`MessageBroker`].
///
/// Messages published to a topic nobody subscribes to are dropped, as with
/// a non-persistent MQTT session.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    topics: Arc<Mutex<HashMap<String, Topic>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MessageBroker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), DispatchError> {
        let mut topics = self.topics.lock();
        let Some(t) = topics.get_mut(topic) else {
            debug!(topic, "no subscribers, message dropped");
            return Ok(());
        };
        t.fanout.retain(|tx| tx.send(payload.clone()).is_ok());
        for (name, group) in t.groups.iter_mut() {
            if !group.deliver(&payload) {
                debug!(topic, group = %name, "group has no live members");
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: Option<&str>,
    ) -> Result<Subscription, DispatchError> {
        let (tx, sub) = Subscription::channel();
        let mut topics = self.topics.lock();
        let t = topics.entry(topic.to_string()).or_default();
        match group {
            Some(g) => t.groups.entry(g.to_string()).or_default().members.push(tx),
            None => t.fanout.push(tx),
        }
        Ok(sub)
    }
}
