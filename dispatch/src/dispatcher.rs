use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use rollcall_attendance::Report;

use crate::blob::BlobStore;
use crate::broker::{MessageBroker, Subscription};
use crate::error::DispatchError;
use crate::types::{DispatchConfig, Job, JobResult, JobState};

struct Slot {
    state: JobState,
    /// Registration time, then the time the job settled.
    touched: Instant,
    tx: Option<oneshot::Sender<Report>>,
    rx: Option<oneshot::Receiver<Report>>,
}

impl Slot {
    /// Nobody is waiting on this slot.
    fn unclaimed(&self) -> bool {
        self.rx.is_some() || self.state == JobState::TimedOut
    }
}

/// Correlation table: one slot per job this dispatcher is tracking.
///
/// A slot leaves the table when its waiter returns or its future is
/// dropped. Slots nobody waits on are evicted once they have been idle for
/// the retention period.
struct Pending {
    slots: Mutex<HashMap<String, Slot>>,
    retention: Duration,
}

impl Pending {
    fn new(retention: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            retention,
        }
    }

    fn register(&self, id: &str) {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(
            id.to_string(),
            Slot {
                state: JobState::Submitted,
                touched: Instant::now(),
                tx: Some(tx),
                rx: Some(rx),
            },
        );
    }

    fn set_state(&self, id: &str, state: JobState) {
        if let Some(slot) = self.slots.lock().get_mut(id) {
            slot.state = state;
        }
    }

    /// Hand `result` to its waiter. Results for unknown IDs belong to
    /// another dispatcher or to a job whose wait already ended.
    fn resolve(&self, result: JobResult) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&result.correlation_id) else {
            debug!(correlation_id = %result.correlation_id, "ignoring result for unknown job");
            return;
        };
        let Some(tx) = slot.tx.take() else {
            debug!(correlation_id = %result.correlation_id, "ignoring result for settled job");
            return;
        };
        slot.state = JobState::of(&result.report);
        slot.touched = Instant::now();
        // The waiter may have given up between lookup and send.
        let _ = tx.send(result.report);
    }

    fn take_receiver(&self, id: &str) -> Option<oneshot::Receiver<Report>> {
        self.slots.lock().get_mut(id).and_then(|s| s.rx.take())
    }

    /// Keep the slot as `TimedOut` until it is evicted; a late result for
    /// it is ignored.
    fn time_out(&self, id: &str) {
        if let Some(slot) = self.slots.lock().get_mut(id) {
            slot.state = JobState::TimedOut;
            slot.touched = Instant::now();
            slot.tx = None;
        }
    }

    fn remove(&self, id: &str) {
        self.slots.lock().remove(id);
    }

    /// Drop unclaimed slots idle for longer than the retention period.
    fn evict_idle(&self) {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, s| !(s.unclaimed() && s.touched.elapsed() >= self.retention));
        let evicted = before - slots.len();
        if evicted > 0 {
            debug!(evicted, tracked = slots.len(), "evicted idle jobs");
        }
    }

    fn len(&self) -> usize {
        self.slots.lock().len()
    }

    fn close(&self) {
        // Dropping the senders wakes every waiter with a closed channel.
        for slot in self.slots.lock().values_mut() {
            slot.tx = None;
        }
    }
}

/// Removes a claimed slot when its waiter finishes or is dropped.
struct WaitGuard<'a> {
    pending: &'a Pending,
    id: &'a str,
    armed: bool,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pending.remove(self.id);
        }
    }
}

/// Dispatcher submits jobs to workers and correlates their results.
///
/// Every dispatcher subscribes to the result topic without a group, so it
/// sees all results and keeps only those it is waiting for. Any number of
/// callers may wait on different jobs concurrently.
pub struct Dispatcher {
    broker: Arc<dyn MessageBroker>,
    blobs: Arc<dyn BlobStore>,
    cfg: DispatchConfig,
    pending: Arc<Pending>,
    shutdown: CancellationToken,
    results: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Subscribe to results and start correlating them.
    pub async fn start(
        broker: Arc<dyn MessageBroker>,
        blobs: Arc<dyn BlobStore>,
        cfg: DispatchConfig,
    ) -> Result<Self, DispatchError> {
        let sub = broker.subscribe(&cfg.result_topic, None).await?;
        let pending = Arc::new(Pending::new(cfg.await_timeout));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(consume_results(
            sub,
            Arc::clone(&pending),
            sweep_period(cfg.await_timeout),
            shutdown.clone(),
        ));
        info!(result_topic = %cfg.result_topic, "dispatcher started");
        Ok(Self {
            broker,
            blobs,
            cfg,
            pending,
            shutdown,
            results: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.cfg
    }

    /// Store `image` and publish a job for it. Returns the correlation ID.
    pub async fn submit(
        &self,
        image: Bytes,
        class_name: &str,
        slot: &str,
    ) -> Result<String, DispatchError> {
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::Closed);
        }
        let id = Uuid::new_v4().to_string();
        let image_ref = self.blobs.put(&id, image).await?;
        let job = Job {
            correlation_id: id.clone(),
            image_ref: image_ref.clone(),
            class_name: class_name.to_string(),
            slot: slot.to_string(),
            submitted_at: Utc::now(),
        };
        let payload = Bytes::from(serde_json::to_vec(&job)?);

        // Registered before publishing so a fast result is never missed.
        self.pending.register(&id);
        if let Err(e) = self.broker.publish(&self.cfg.job_topic, payload).await {
            self.pending.remove(&id);
            if let Err(del) = self.blobs.delete(&image_ref).await {
                warn!(correlation_id = %id, error = %del, "failed to remove orphaned image");
            }
            return Err(e);
        }
        self.pending.set_state(&id, JobState::Dispatched);
        info!(correlation_id = %id, class_name, slot, "job dispatched");
        Ok(id)
    }

    /// Wait up to `timeout` for the report of job `correlation_id`.
    ///
    /// On [`DispatchError::Timeout`] the job's outcome is unknown: a worker
    /// may still process it, and its late result is discarded. The job then
    /// reports [`JobState::TimedOut`] until it is evicted.
    pub async fn await_result(
        &self,
        correlation_id: &str,
        timeout: Duration,
    ) -> Result<Report, DispatchError> {
        let Some(rx) = self.pending.take_receiver(correlation_id) else {
            return Err(DispatchError::UnknownCorrelation(correlation_id.to_string()));
        };
        let mut guard = WaitGuard {
            pending: &self.pending,
            id: correlation_id,
            armed: true,
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(report)) => {
                debug!(correlation_id, status = ?report.status, "result received");
                Ok(report)
            }
            Ok(Err(_)) => Err(DispatchError::Closed),
            Err(_) => {
                guard.armed = false;
                self.pending.time_out(correlation_id);
                warn!(correlation_id, waited = ?timeout, "timed out waiting for result");
                Err(DispatchError::Timeout {
                    correlation_id: correlation_id.to_string(),
                    waited: timeout,
                })
            }
        }
    }

    /// Submit and wait with the configured timeout.
    pub async fn submit_and_wait(
        &self,
        image: Bytes,
        class_name: &str,
        slot: &str,
    ) -> Result<Report, DispatchError> {
        let id = self.submit(image, class_name, slot).await?;
        self.await_result(&id, self.cfg.await_timeout).await
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.pending.len()
    }

    /// State of a job this dispatcher is still tracking.
    pub fn state(&self, correlation_id: &str) -> Option<JobState> {
        self.pending
            .slots
            .lock()
            .get(correlation_id)
            .map(|s| s.state)
    }

    /// Stop consuming results. Pending waiters fail with
    /// [`DispatchError::Closed`].
    pub async fn close(&self) {
        self.shutdown.cancel();
        let handle = self.results.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn sweep_period(retention: Duration) -> Duration {
    (retention / 2).clamp(Duration::from_millis(10), Duration::from_secs(5))
}

async fn consume_results(
    mut sub: Subscription,
    pending: Arc<Pending>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut sweep = tokio::time::interval(period);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sweep.tick() => pending.evict_idle(),
            msg = sub.recv() => {
                let Some(payload) = msg else {
                    warn!("result subscription ended");
                    break;
                };
                match serde_json::from_slice::<JobResult>(&payload) {
                    Ok(result) => pending.resolve(result),
                    Err(e) => warn!(error = %e, "dropping undecodable result"),
                }
            }
        }
    }
    shutdown.cancel();
    pending.close();
}
