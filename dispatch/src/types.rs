use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rollcall_attendance::Report;

/// Job asks a worker to process one submitted photo.
///
/// The image itself stays in the blob store; the job carries only its
/// reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub correlation_id: String,
    pub image_ref: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub slot: String,
    pub submitted_at: DateTime<Utc>,
}

/// JobResult answers the [`Job`] with the same correlation ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub correlation_id: String,
    pub report: Report,
}

/// Lifecycle of a submitted job as seen by its dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Registered, not yet published.
    Submitted,
    /// Published, waiting for a result.
    Dispatched,
    /// Result arrived with a completed report.
    Completed,
    /// Result arrived with an error report.
    Failed,
    /// No result within the wait timeout; the outcome is unknown.
    TimedOut,
}

impl JobState {
    pub fn of(report: &Report) -> JobState {
        if report.is_error() {
            JobState::Failed
        } else {
            JobState::Completed
        }
    }
}

/// Topics, consumer group and timeouts shared by dispatchers and workers.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub job_topic: String,
    pub result_topic: String,
    /// Consumer group of workers; each job goes to one member.
    pub worker_group: String,
    pub await_timeout: Duration,
    /// Jobs a single worker processes at once.
    pub max_in_flight: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            job_topic: "rollcall/jobs".to_string(),
            result_topic: "rollcall/results".to_string(),
            worker_group: "rollcall-workers".to_string(),
            await_timeout: Duration::from_secs(30),
            max_in_flight: 4,
        }
    }
}

impl DispatchConfig {
    pub fn with_topics(mut self, job_topic: &str, result_topic: &str) -> Self {
        self.job_topic = job_topic.to_string();
        self.result_topic = result_topic.to_string();
        self
    }

    pub fn with_worker_group(mut self, group: &str) -> Self {
        self.worker_group = group.to_string();
        self
    }

    pub fn with_await_timeout(mut self, timeout: Duration) -> Self {
        self.await_timeout = timeout;
        self
    }

    pub fn with_max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n.max(1);
        self
    }
}
