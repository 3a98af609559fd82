//! [`MessageBroker`] over MQTT using rumqttc.
//!
//! Messages are published and subscribed with QoS 1. Grouped subscriptions
//! use MQTT 5 style shared subscriptions (`$share/{group}/{topic}`), which
//! most brokers also accept from 3.1.1 clients.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::{MessageBroker, Subscription};
use crate::error::DispatchError;

/// Connection settings for [`MqttBroker`].
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// `mqtt://[user:pass@]host[:port]`
    pub url: String,
    /// Defaults to a random ID.
    pub client_id: Option<String>,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl MqttConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client_id: None,
            keep_alive: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_client_id(mut self, id: &str) -> Self {
        self.client_id = Some(id.to_string());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Subscription filter for `topic`, shared across `group` when given.
pub fn subscription_filter(topic: &str, group: Option<&str>) -> String {
    match group {
        Some(g) => format!("$share/{g}/{topic}"),
        None => topic.to_string(),
    }
}

struct Route {
    topic: String,
    tx: UnboundedSender<Bytes>,
}

struct Shared {
    connected: AtomicBool,
    /// Filters to restore after a reconnect.
    filters: Mutex<Vec<String>>,
    routes: Mutex<Vec<Route>>,
}

impl Shared {
    fn dispatch(&self, topic: &str, payload: Bytes) {
        let mut routes = self.routes.lock();
        routes.retain(|r| r.topic != topic || r.tx.send(payload.clone()).is_ok());
    }
}

/// MqttBroker is a [`MessageBroker`] backed by an MQTT connection.
pub struct MqttBroker {
    client: AsyncClient,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl MqttBroker {
    /// Connect and wait until the broker acknowledges the session.
    pub async fn connect(cfg: MqttConfig) -> Result<Self, DispatchError> {
        let url = url::Url::parse(&cfg.url).map_err(|e| DispatchError::Broker(e.to_string()))?;
        let host = url.host_str().unwrap_or("127.0.0.1");
        let port = url.port().unwrap_or(1883);
        let id = cfg
            .client_id
            .clone()
            .unwrap_or_else(|| format!("rollcall-{}", Uuid::new_v4()));

        let mut opts = MqttOptions::new(&id, host, port);
        opts.set_keep_alive(cfg.keep_alive);
        if let Some(password) = url.password() {
            opts.set_credentials(url.username(), password);
        }

        let (client, event_loop) = AsyncClient::new(opts, 100);
        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            filters: Mutex::new(Vec::new()),
            routes: Mutex::new(Vec::new()),
        });
        let shutdown = CancellationToken::new();

        tokio::spawn(run_event_loop(
            client.clone(),
            event_loop,
            Arc::clone(&shared),
            shutdown.clone(),
        ));

        let start = Instant::now();
        while !shared.connected.load(Ordering::SeqCst) {
            if start.elapsed() > cfg.connect_timeout {
                shutdown.cancel();
                return Err(DispatchError::Broker(format!(
                    "connect to {} timed out",
                    cfg.url
                )));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        info!(client_id = %id, host, port, "connected to MQTT broker");

        Ok(Self {
            client,
            shared,
            shutdown,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub async fn close(&self) -> Result<(), DispatchError> {
        self.shutdown.cancel();
        self.client.disconnect().await?;
        Ok(())
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_event_loop(
    client: AsyncClient,
    mut event_loop: EventLoop,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("mqtt event loop stopped");
                break;
            }
            event = event_loop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        shared.connected.store(true, Ordering::SeqCst);
                        let filters = shared.filters.lock().clone();
                        for filter in filters {
                            if let Err(e) = client.subscribe(&filter, QoS::AtLeastOnce).await {
                                error!(filter = %filter, error = %e, "resubscribe failed");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!(topic = %publish.topic, bytes = publish.payload.len(), "message received");
                        shared.dispatch(&publish.topic, publish.payload);
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("disconnected by broker");
                        shared.connected.store(false, Ordering::SeqCst);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt event loop error");
                        shared.connected.store(false, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(3)).await;
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl MessageBroker for MqttBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), DispatchError> {
        if !self.is_connected() {
            debug!(topic, "broker offline, publish queued until reconnect");
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: Option<&str>,
    ) -> Result<Subscription, DispatchError> {
        let filter = subscription_filter(topic, group);
        let (tx, sub) = Subscription::channel();
        self.shared.routes.lock().push(Route {
            topic: topic.to_string(),
            tx,
        });
        self.shared.filters.lock().push(filter.clone());
        self.client.subscribe(&filter, QoS::AtLeastOnce).await?;
        debug!(filter = %filter, "subscribed");
        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_filter() {
        assert_eq!(
            subscription_filter("rollcall/jobs", Some("workers")),
            "$share/workers/rollcall/jobs"
        );
        assert_eq!(subscription_filter("rollcall/results", None), "rollcall/results");
    }

    #[test]
    fn config_builder() {
        let cfg = MqttConfig::new("mqtt://127.0.0.1:1883")
            .with_client_id("worker-1")
            .with_connect_timeout(Duration::from_secs(2));
        assert_eq!(cfg.client_id.as_deref(), Some("worker-1"));
        assert_eq!(cfg.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn routes_by_topic_and_drop_closed() {
        let shared = Shared {
            connected: AtomicBool::new(true),
            filters: Mutex::new(Vec::new()),
            routes: Mutex::new(Vec::new()),
        };
        let (tx_jobs, mut jobs) = Subscription::channel();
        let (tx_gone, gone) = Subscription::channel();
        shared.routes.lock().push(Route {
            topic: "jobs".into(),
            tx: tx_jobs,
        });
        shared.routes.lock().push(Route {
            topic: "jobs".into(),
            tx: tx_gone,
        });
        drop(gone);

        shared.dispatch("jobs", Bytes::from_static(b"j1"));
        shared.dispatch("results", Bytes::from_static(b"r1"));
        assert_eq!(shared.routes.lock().len(), 1);
        assert_eq!(jobs.rx.try_recv().unwrap(), "j1");
        assert!(jobs.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn connect_times_out_without_broker() {
        let cfg = MqttConfig::new("mqtt://127.0.0.1:1")
            .with_connect_timeout(Duration::from_millis(200));
        assert!(matches!(
            MqttBroker::connect(cfg).await,
            Err(DispatchError::Broker(_))
        ));
    }
}
