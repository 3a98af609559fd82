use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbImage};
use tokio_util::sync::CancellationToken;

use rollcall_attendance::{
    ErrorKind, FaceModel, PipelineConfig, PipelineError, ReportStatus, SessionPipeline,
    StaticFaceModel,
};
use rollcall_roster::{EmbeddingStore, MemoryRoster};

use crate::blob::{BlobStore, MemoryBlobStore};
use crate::broker::MessageBroker;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::memory_broker::MemoryBroker;
use crate::types::{DispatchConfig, Job, JobResult, JobState};
use crate::worker::Worker;

fn png() -> Bytes {
    let img = RgbImage::from_pixel(4, 4, image::Rgb([90, 120, 150]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    Bytes::from(buf)
}

fn roster() -> MemoryRoster {
    let roster = MemoryRoster::new();
    roster.put_embedding("Math101_9AM", "A", &[1.0, 0.0]).unwrap();
    roster.put_embedding("Chem_8AM", "C", &[1.0, 0.0]).unwrap();
    roster
}

fn pipeline(roster: &MemoryRoster, model: Arc<dyn FaceModel>) -> Arc<SessionPipeline> {
    Arc::new(
        SessionPipeline::new(
            Arc::new(roster.clone()),
            Arc::new(roster.clone()),
            model,
            PipelineConfig::default(),
        )
        .unwrap(),
    )
}

struct Harness {
    broker: MemoryBroker,
    blobs: MemoryBlobStore,
    cancel: CancellationToken,
    cfg: DispatchConfig,
}

impl Harness {
    fn new() -> Self {
        Self {
            broker: MemoryBroker::new(),
            blobs: MemoryBlobStore::new(),
            cancel: CancellationToken::new(),
            cfg: DispatchConfig::default().with_max_in_flight(4),
        }
    }

    async fn worker(&self, pipeline: Arc<SessionPipeline>) {
        Worker::new(
            Arc::new(self.broker.clone()),
            Arc::new(self.blobs.clone()),
            pipeline,
            self.cfg.clone(),
        )
        .start(self.cancel.clone())
        .await
        .unwrap();
    }

    async fn dispatcher(&self) -> Dispatcher {
        Dispatcher::start(
            Arc::new(self.broker.clone()),
            Arc::new(self.blobs.clone()),
            self.cfg.clone(),
        )
        .await
        .unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct PanickingModel;

#[async_trait::async_trait]
impl FaceModel for PanickingModel {
    async fn detect_faces(&self, _: &RgbImage) -> Result<Vec<Vec<f32>>, PipelineError> {
        panic!("model crashed");
    }

    fn dimension(&self) -> usize {
        2
    }
}

struct CountingModel {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl FaceModel for CountingModel {
    async fn detect_faces(&self, _: &RgbImage) -> Result<Vec<Vec<f32>>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![vec![1.0, 0.0]])
    }

    fn dimension(&self) -> usize {
        2
    }
}

#[tokio::test]
async fn submit_and_wait_returns_report() {
    let h = Harness::new();
    let roster = roster();
    h.worker(pipeline(&roster, Arc::new(StaticFaceModel::new(vec![vec![0.9, 0.1]]))))
        .await;
    let d = h.dispatcher().await;

    let report = d.submit_and_wait(png(), "Math 101", "9AM").await.unwrap();
    assert_eq!(report.status, ReportStatus::Completed);
    assert_eq!(report.collection_name, "Math101_9AM");
    assert_eq!(report.attendance.len(), 1);
    assert_eq!(report.attendance[0].identity_id, "A");
    assert_eq!(roster.attendance_len(), 1);
}

#[tokio::test]
async fn pipeline_errors_travel_as_reports() {
    let h = Harness::new();
    let roster = roster();
    h.worker(pipeline(&roster, Arc::new(StaticFaceModel::new(vec![vec![1.0, 0.0]]))))
        .await;
    let d = h.dispatcher().await;

    let report = d.submit_and_wait(png(), "History", "1PM").await.unwrap();
    assert!(report.is_error());
    assert_eq!(report.kind, Some(ErrorKind::NoRosterForSession));
    assert_eq!(report.collection_name, "History_1PM");
}

#[tokio::test]
async fn timeout_leaves_other_waiters_intact() {
    let h = Harness::new();
    let roster = roster();
    let slow = StaticFaceModel::new(vec![vec![1.0, 0.0]]).with_delay(Duration::from_millis(300));
    h.worker(pipeline(&roster, Arc::new(slow))).await;
    let d = h.dispatcher().await;

    let first = d.submit(png(), "Math 101", "9AM").await.unwrap();
    let second = d.submit(png(), "Chem", "8AM").await.unwrap();
    assert_ne!(first, second);

    let err = d
        .await_result(&first, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Timeout { ref correlation_id, .. } if *correlation_id == first));
    assert_eq!(err.kind(), ErrorKind::TimeoutError);
    assert_eq!(d.state(&first), Some(JobState::TimedOut));

    // The first job's late result must not be taken for the second.
    let report = d.await_result(&second, Duration::from_secs(5)).await.unwrap();
    assert_eq!(report.collection_name, "Chem_8AM");
    assert_eq!(report.attendance[0].identity_id, "C");
}

#[tokio::test]
async fn concurrent_waiters_get_their_own_results() {
    let h = Harness::new();
    let roster = roster();
    let model = StaticFaceModel::new(vec![vec![1.0, 0.0]]).with_delay(Duration::from_millis(20));
    h.worker(pipeline(&roster, Arc::new(model))).await;
    let d = Arc::new(h.dispatcher().await);

    let mut waits = Vec::new();
    for (class, slot, ns) in [("Math 101", "9AM", "Math101_9AM"), ("Chem", "8AM", "Chem_8AM")] {
        let d = Arc::clone(&d);
        waits.push(tokio::spawn(async move {
            let report = d.submit_and_wait(png(), class, slot).await.unwrap();
            assert_eq!(report.collection_name, ns);
        }));
    }
    for w in waits {
        w.await.unwrap();
    }
}

#[tokio::test]
async fn job_state_is_tracked_until_awaited() {
    let h = Harness::new();
    let d = h.dispatcher().await;

    // No worker: the job stays dispatched.
    let id = d.submit(png(), "Math 101", "9AM").await.unwrap();
    assert_eq!(d.state(&id), Some(JobState::Dispatched));
    assert_eq!(h.blobs.len(), 1);

    let err = d.await_result(&id, Duration::from_millis(20)).await.unwrap_err();
    assert!(matches!(err, DispatchError::Timeout { .. }));
    assert!(matches!(
        d.await_result(&id, Duration::from_millis(20)).await,
        Err(DispatchError::UnknownCorrelation(_))
    ));
}

#[tokio::test]
async fn unawaited_jobs_are_evicted_after_retention() {
    let mut h = Harness::new();
    h.cfg = h.cfg.clone().with_await_timeout(Duration::from_millis(100));
    let roster = roster();
    h.worker(pipeline(&roster, Arc::new(StaticFaceModel::new(vec![vec![1.0, 0.0]]))))
        .await;
    let d = h.dispatcher().await;

    let mut ids = Vec::new();
    for _ in 0..50 {
        ids.push(d.submit(png(), "Math 101", "9AM").await.unwrap());
    }
    for _ in 0..100 {
        if d.tracked() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(d.tracked(), 0);
    assert!(matches!(
        d.await_result(&ids[0], Duration::from_millis(10)).await,
        Err(DispatchError::UnknownCorrelation(_))
    ));
}

#[tokio::test]
async fn dropped_wait_releases_its_job() {
    let h = Harness::new();
    let d = h.dispatcher().await;

    // No worker: the wait is cancelled before any result.
    let id = d.submit(png(), "Math 101", "9AM").await.unwrap();
    let wait = d.await_result(&id, Duration::from_secs(30));
    assert!(
        tokio::time::timeout(Duration::from_millis(20), wait)
            .await
            .is_err()
    );
    assert_eq!(d.state(&id), None);
    assert_eq!(d.tracked(), 0);
}

#[tokio::test]
async fn timed_out_job_ignores_late_result() {
    let h = Harness::new();
    let d = h.dispatcher().await;

    let id = d.submit(png(), "Math 101", "9AM").await.unwrap();
    let err = d.await_result(&id, Duration::from_millis(20)).await.unwrap_err();
    assert!(matches!(err, DispatchError::Timeout { .. }));

    let late = JobResult {
        correlation_id: id.clone(),
        report: rollcall_attendance::Report::completed("Math101_9AM", 0, vec![], vec![]),
    };
    h.broker
        .publish(&h.cfg.result_topic, Bytes::from(serde_json::to_vec(&late).unwrap()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(d.state(&id), Some(JobState::TimedOut));
}

#[tokio::test]
async fn early_result_is_kept_for_waiter() {
    let h = Harness::new();
    let roster = roster();
    h.worker(pipeline(&roster, Arc::new(StaticFaceModel::new(vec![vec![1.0, 0.0]]))))
        .await;
    let d = h.dispatcher().await;

    let id = d.submit(png(), "Math 101", "9AM").await.unwrap();
    for _ in 0..100 {
        if d.state(&id) == Some(JobState::Completed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(d.state(&id), Some(JobState::Completed));
    let report = d.await_result(&id, Duration::from_millis(10)).await.unwrap();
    assert_eq!(report.attendance.len(), 1);
}

#[tokio::test]
async fn missing_image_yields_internal_error_result() {
    let h = Harness::new();
    let roster = roster();
    h.worker(pipeline(&roster, Arc::new(StaticFaceModel::new(vec![vec![1.0, 0.0]]))))
        .await;
    let mut results = h.broker.subscribe(&h.cfg.result_topic, None).await.unwrap();

    let job = Job {
        correlation_id: "lost-1".into(),
        image_ref: "lost-1.img".into(),
        class_name: "Math 101".into(),
        slot: "9AM".into(),
        submitted_at: chrono::Utc::now(),
    };
    h.broker
        .publish(&h.cfg.job_topic, Bytes::from(serde_json::to_vec(&job).unwrap()))
        .await
        .unwrap();

    let payload = results.recv().await.unwrap();
    let result: JobResult = serde_json::from_slice(&payload).unwrap();
    assert_eq!(result.correlation_id, "lost-1");
    assert_eq!(result.report.kind, Some(ErrorKind::InternalError));
    assert_eq!(roster.attendance_len(), 0);
}

/// Delivers jobs but refuses to carry results.
struct NoResultsBroker {
    inner: MemoryBroker,
    result_topic: String,
}

#[async_trait::async_trait]
impl MessageBroker for NoResultsBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), DispatchError> {
        if topic == self.result_topic {
            return Err(DispatchError::Broker("connection reset".into()));
        }
        self.inner.publish(topic, payload).await
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: Option<&str>,
    ) -> Result<crate::broker::Subscription, DispatchError> {
        self.inner.subscribe(topic, group).await
    }
}

#[tokio::test]
async fn image_is_kept_when_result_cannot_be_published() {
    let h = Harness::new();
    let model = Arc::new(CountingModel {
        calls: AtomicUsize::new(0),
    });
    let broker = NoResultsBroker {
        inner: h.broker.clone(),
        result_topic: h.cfg.result_topic.clone(),
    };
    Worker::new(
        Arc::new(broker),
        Arc::new(h.blobs.clone()),
        pipeline(&roster(), model.clone()),
        h.cfg.clone(),
    )
    .start(h.cancel.clone())
    .await
    .unwrap();

    let image_ref = h.blobs.put("kept-1", png()).await.unwrap();
    let job = Job {
        correlation_id: "kept-1".into(),
        image_ref,
        class_name: "Math 101".into(),
        slot: "9AM".into(),
        submitted_at: chrono::Utc::now(),
    };
    h.broker
        .publish(&h.cfg.job_topic, Bytes::from(serde_json::to_vec(&job).unwrap()))
        .await
        .unwrap();

    for _ in 0..100 {
        if model.calls.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.blobs.len(), 1);
}

#[tokio::test]
async fn blob_is_removed_after_result_is_published() {
    let h = Harness::new();
    let roster = roster();
    h.worker(pipeline(&roster, Arc::new(StaticFaceModel::new(vec![vec![1.0, 0.0]]))))
        .await;
    let d = h.dispatcher().await;

    d.submit_and_wait(png(), "Math 101", "9AM").await.unwrap();
    for _ in 0..100 {
        if h.blobs.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.blobs.is_empty());
}

#[tokio::test]
async fn panic_is_reported_with_same_correlation_id() {
    let h = Harness::new();
    h.worker(pipeline(&roster(), Arc::new(PanickingModel))).await;
    let d = h.dispatcher().await;

    let id = d.submit(png(), "Math 101", "9AM").await.unwrap();
    let report = d.await_result(&id, Duration::from_secs(5)).await.unwrap();
    assert_eq!(report.kind, Some(ErrorKind::InternalError));
    assert!(report.message.contains("model crashed"));

    // The worker keeps serving after a panic.
    let id = d.submit(png(), "Math 101", "9AM").await.unwrap();
    let report = d.await_result(&id, Duration::from_secs(5)).await.unwrap();
    assert_eq!(report.kind, Some(ErrorKind::InternalError));
}

#[tokio::test]
async fn undecodable_job_is_skipped() {
    let h = Harness::new();
    let roster = roster();
    h.worker(pipeline(&roster, Arc::new(StaticFaceModel::new(vec![vec![1.0, 0.0]]))))
        .await;
    let d = h.dispatcher().await;

    h.broker
        .publish(&h.cfg.job_topic, Bytes::from_static(b"{not json"))
        .await
        .unwrap();
    let report = d.submit_and_wait(png(), "Math 101", "9AM").await.unwrap();
    assert_eq!(report.status, ReportStatus::Completed);
}

#[tokio::test]
async fn each_job_runs_on_one_worker() {
    let h = Harness::new();
    let roster = roster();
    let model = Arc::new(CountingModel {
        calls: AtomicUsize::new(0),
    });
    h.worker(pipeline(&roster, model.clone())).await;
    h.worker(pipeline(&roster, model.clone())).await;
    let d = Arc::new(h.dispatcher().await);

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(d.submit(png(), "Math 101", "9AM").await.unwrap());
    }
    for id in ids {
        let report = d.await_result(&id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.attendance.len(), 1);
    }
    assert_eq!(model.calls.load(Ordering::SeqCst), 6);
    // Six deliveries of the same mark leave one record.
    assert_eq!(roster.attendance_len(), 1);
}

#[tokio::test]
async fn closed_dispatcher_rejects_work() {
    let h = Harness::new();
    let d = h.dispatcher().await;
    let id = d.submit(png(), "Math 101", "9AM").await.unwrap();

    d.close().await;
    assert!(matches!(
        d.await_result(&id, Duration::from_secs(5)).await,
        Err(DispatchError::Closed)
    ));
    assert!(matches!(
        d.submit(png(), "Math 101", "9AM").await,
        Err(DispatchError::Closed)
    ));
}

#[tokio::test]
async fn worker_stops_on_cancel() {
    let broker = MemoryBroker::new();
    let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let cancel = CancellationToken::new();
    let handle = Worker::new(
        Arc::new(broker),
        blobs,
        pipeline(&roster(), Arc::new(StaticFaceModel::new(vec![]))),
        DispatchConfig::default(),
    )
    .start(cancel.clone())
    .await
    .unwrap();

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}
