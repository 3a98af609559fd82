use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rollcall_attendance::{ErrorKind, Report, SessionPipeline};
use rollcall_roster::namespace;

use crate::blob::BlobStore;
use crate::broker::{MessageBroker, Subscription};
use crate::error::DispatchError;
use crate::types::{DispatchConfig, Job, JobResult};

/// Worker consumes jobs from the shared job topic, runs the pipeline and
/// publishes one result per job.
///
/// Every job that can be decoded gets a result with its correlation ID,
/// including jobs whose image is missing or whose processing panicked.
pub struct Worker {
    broker: Arc<dyn MessageBroker>,
    blobs: Arc<dyn BlobStore>,
    pipeline: Arc<SessionPipeline>,
    cfg: DispatchConfig,
}

impl Worker {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        blobs: Arc<dyn BlobStore>,
        pipeline: Arc<SessionPipeline>,
        cfg: DispatchConfig,
    ) -> Self {
        Self {
            broker,
            blobs,
            pipeline,
            cfg,
        }
    }

    /// Join the worker group and start consuming in the background.
    ///
    /// Returns once the subscription is in place. The task ends when
    /// `cancel` fires or the subscription closes, after in-flight jobs
    /// finish.
    pub async fn start(self, cancel: CancellationToken) -> Result<JoinHandle<()>, DispatchError> {
        let sub = self
            .broker
            .subscribe(&self.cfg.job_topic, Some(&self.cfg.worker_group))
            .await?;
        info!(
            job_topic = %self.cfg.job_topic,
            group = %self.cfg.worker_group,
            max_in_flight = self.cfg.max_in_flight,
            "worker started"
        );
        Ok(tokio::spawn(Arc::new(self).run(sub, cancel)))
    }

    async fn run(self: Arc<Self>, mut sub: Subscription, cancel: CancellationToken) {
        let slots = Arc::new(Semaphore::new(self.cfg.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                p = Arc::clone(&slots).acquire_owned() => match p {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            let payload = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = sub.recv() => match msg {
                    Some(payload) => payload,
                    None => {
                        warn!("job subscription ended");
                        break;
                    }
                },
            };
            let job: Job = match serde_json::from_slice(&payload) {
                Ok(job) => job,
                Err(e) => {
                    warn!(error = %e, "dropping undecodable job");
                    continue;
                }
            };

            let this = Arc::clone(&self);
            tasks.spawn(async move {
                this.handle(job).await;
                drop(permit);
            });
            // Reap finished tasks so the set does not grow unbounded.
            while tasks.try_join_next().is_some() {}
        }

        while tasks.join_next().await.is_some() {}
        info!("worker stopped");
    }

    async fn handle(&self, job: Job) {
        let report = self.process(&job).await;
        let result = JobResult {
            correlation_id: job.correlation_id.clone(),
            report,
        };
        if let Err(e) = self.publish(&result).await {
            // The image stays so a redelivered job can run again.
            error!(correlation_id = %job.correlation_id, error = %e, "failed to publish result");
            return;
        }
        if let Err(e) = self.blobs.delete(&job.image_ref).await {
            warn!(correlation_id = %job.correlation_id, error = %e, "failed to remove image");
        }
    }

    async fn process(&self, job: &Job) -> Report {
        let ns = namespace(&job.class_name, &job.slot);
        let image = match self.blobs.get(&job.image_ref).await {
            Ok(image) => image,
            Err(e) => {
                warn!(correlation_id = %job.correlation_id, error = %e, "image unavailable");
                return Report::error(
                    ErrorKind::InternalError,
                    format!("image {} unavailable: {e}", job.image_ref),
                    &ns,
                );
            }
        };

        let pipeline = Arc::clone(&self.pipeline);
        let class_name = job.class_name.clone();
        let slot = job.slot.clone();
        let run = tokio::spawn(async move { pipeline.process(&image, &class_name, &slot).await });

        match run.await {
            Ok(report) => {
                info!(
                    correlation_id = %job.correlation_id,
                    status = ?report.status,
                    present = report.attendance.len(),
                    "job processed"
                );
                report
            }
            Err(e) => {
                error!(correlation_id = %job.correlation_id, error = %e, "job processing aborted");
                Report::error(ErrorKind::InternalError, abort_message(e), &ns)
            }
        }
    }

    async fn publish(&self, result: &JobResult) -> Result<(), DispatchError> {
        let payload = Bytes::from(serde_json::to_vec(result)?);
        self.broker.publish(&self.cfg.result_topic, payload).await
    }
}

fn abort_message(e: JoinError) -> String {
    if !e.is_panic() {
        return "processing cancelled".to_string();
    }
    let panic = e.into_panic();
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("processing panicked: {detail}")
}
