use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, info, warn};

use rollcall_roster::{AttendanceStatus, AttendanceStore, EmbeddingStore, namespace};
use rollcall_vecstore::FlatIndex;

use crate::error::PipelineError;
use crate::index::{IndexBuilder, IndexCache};
use crate::matcher::{DEFAULT_THRESHOLD, Matcher};
use crate::model::{FaceModel, decode_image};
use crate::recorder::AttendanceRecorder;
use crate::report::{AttendanceEntry, RecordFailure, Report};

/// Configuration for [`SessionPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum L2 distance accepted as a match.
    pub threshold: f32,
    /// Reuse built indexes for this long. Zero rebuilds on every call.
    pub index_cache_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            index_cache_ttl: Duration::ZERO,
        }
    }
}

impl PipelineConfig {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_index_cache_ttl(mut self, ttl: Duration) -> Self {
        self.index_cache_ttl = ttl;
        self
    }
}

/// SessionPipeline turns one class photo into attendance marks.
///
/// Each call decodes the image, loads the session roster into an index,
/// detects faces and records every matched identity at most once. All
/// outcomes, including failures, are returned as a [`Report`].
pub struct SessionPipeline {
    builder: IndexBuilder,
    cache: Option<IndexCache>,
    matcher: Matcher,
    recorder: AttendanceRecorder,
    model: Arc<dyn FaceModel>,
}

impl SessionPipeline {
    pub fn new(
        embeddings: Arc<dyn EmbeddingStore>,
        attendance: Arc<dyn AttendanceStore>,
        model: Arc<dyn FaceModel>,
        cfg: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let matcher = Matcher::new(cfg.threshold)?;
        let cache = (!cfg.index_cache_ttl.is_zero()).then(|| IndexCache::new(cfg.index_cache_ttl));
        Ok(Self {
            builder: IndexBuilder::new(embeddings),
            cache,
            matcher,
            recorder: AttendanceRecorder::new(attendance),
            model,
        })
    }

    fn index_for(&self, namespace: &str) -> Option<Arc<FlatIndex>> {
        let dim = Some(self.model.dimension()).filter(|d| *d > 0);
        match &self.cache {
            Some(cache) => cache.get_or_build(namespace, dim, &self.builder),
            None => self.builder.build(namespace, dim).map(Arc::new),
        }
    }

    /// Process one photo for the session identified by `class_name` and `slot`.
    pub async fn process(&self, image: &[u8], class_name: &str, slot: &str) -> Report {
        let ns = namespace(class_name, slot);
        let now = Local::now();

        let decoded = match decode_image(image) {
            Ok(img) => img,
            Err(e) => {
                warn!(namespace = %ns, error = %e, "image rejected");
                return Report::from_error(&e, &ns);
            }
        };

        let Some(index) = self.index_for(&ns) else {
            let err = PipelineError::NoRoster {
                namespace: ns.clone(),
            };
            return Report::from_error(&err, &ns);
        };

        let faces = match self.model.detect_faces(&decoded).await {
            Ok(faces) => faces,
            Err(e) => {
                warn!(namespace = %ns, error = %e, "face detection failed");
                return Report::from_error(&e, &ns);
            }
        };
        if faces.is_empty() {
            info!(namespace = %ns, "no faces detected");
            return Report::completed(&ns, 0, Vec::new(), Vec::new());
        }

        // Nothing is written unless every face fits the roster.
        if let Some((i, face)) = faces.iter().enumerate().find(|(_, f)| f.len() != index.dim()) {
            let err = PipelineError::DimensionMismatch {
                got: face.len(),
                want: index.dim(),
            };
            warn!(namespace = %ns, face = i, error = %err, "face does not fit roster");
            return Report::from_error(&err, &ns);
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut attendance = Vec::new();
        let mut failures: Vec<RecordFailure> = Vec::new();

        for (i, face) in faces.iter().enumerate() {
            let found = match self.matcher.match_face(face, &index) {
                Ok(found) => found,
                Err(e) => {
                    warn!(namespace = %ns, face = i, error = %e, "skipping face");
                    continue;
                }
            };
            let Some(m) = found else {
                continue;
            };
            if seen.contains(&m.id) {
                debug!(namespace = %ns, face = i, identity = %m.id, "already recorded in this photo");
                continue;
            }

            match self.recorder.record_at(&ns, &m.id, class_name, slot, now) {
                Ok(_) => {
                    failures.retain(|f| f.identity_id != m.id);
                    attendance.push(AttendanceEntry {
                        identity_id: m.id.clone(),
                        distance: m.distance,
                        status: AttendanceStatus::Present,
                    });
                    seen.insert(m.id);
                }
                Err(e) => {
                    warn!(namespace = %ns, face = i, identity = %m.id, error = %e, "attendance write failed");
                    if !failures.iter().any(|f| f.identity_id == m.id) {
                        failures.push(RecordFailure {
                            identity_id: m.id,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            namespace = %ns,
            faces = faces.len(),
            present = attendance.len(),
            failed = failures.len(),
            "photo processed"
        );
        Report::completed(&ns, faces.len(), attendance, failures)
    }
}
