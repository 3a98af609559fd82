use tracing::debug;

use rollcall_vecstore::{FlatIndex, Match};

use crate::error::PipelineError;

/// Default L2 bound between unit vectors. Tuned for 512-d ArcFace
/// embeddings; revalidate when the face model changes.
pub const DEFAULT_THRESHOLD: f32 = 1.0;

/// Matcher accepts the nearest roster identity when it lies within an L2
/// distance threshold.
///
/// The threshold applies to Euclidean distance between unit vectors
/// (`[0, 2]`), not to cosine similarity.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    threshold: f32,
}

impl Matcher {
    pub fn new(threshold: f32) -> Result<Self, PipelineError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(PipelineError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Match one face embedding against `index`.
    ///
    /// Returns `Ok(None)` when the nearest identity is farther than the
    /// threshold. A face whose dimension differs from the index fails with
    /// [`PipelineError::DimensionMismatch`].
    pub fn match_face(
        &self,
        embedding: &[f32],
        index: &FlatIndex,
    ) -> Result<Option<Match>, PipelineError> {
        let Some(nearest) = index.nearest(embedding)? else {
            return Ok(None);
        };
        if nearest.distance > self.threshold {
            debug!(
                distance = nearest.distance,
                threshold = self.threshold,
                nearest = %nearest.id,
                "no match: distance exceeds threshold"
            );
            return Ok(None);
        }
        Ok(Some(nearest))
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}
