use std::io::Cursor;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, RgbImage};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::PipelineError;
use crate::model::FaceModel;

const DEFAULT_DIM: usize = 512;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder-style configuration for [`HttpFaceModel`].
#[derive(Debug, Clone, Default)]
pub struct HttpFaceModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub dimension: usize,
    /// Drop detections scoring below this value. 0 keeps all.
    pub min_score: f32,
    pub timeout: Option<Duration>,
}

impl HttpFaceModelConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = key.to_string();
        self
    }

    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.dimension = dim;
        self
    }

    pub fn with_min_score(mut self, score: f32) -> Self {
        self.min_score = score;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Detection service response.
#[derive(Deserialize)]
struct DetectResponse {
    #[serde(default)]
    faces: Vec<DetectedFace>,
}

#[derive(Deserialize)]
struct DetectedFace {
    embedding: Vec<f64>,
    #[serde(default)]
    score: Option<f32>,
}

/// HttpFaceModel calls an external face detection service.
///
/// The image is sent PNG-encoded as the body of `POST {base_url}/detect`.
/// The service answers `{"faces": [{"embedding": [...], "score": 0.98}]}`
/// with faces in detection order.
pub struct HttpFaceModel {
    client: Client,
    cfg: HttpFaceModelConfig,
}

impl HttpFaceModel {
    pub fn new(cfg: HttpFaceModelConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(cfg.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| PipelineError::FaceModel(e.to_string()))?;
        let mut cfg = cfg;
        if cfg.dimension == 0 {
            cfg.dimension = DEFAULT_DIM;
        }
        Ok(Self { client, cfg })
    }

    fn faces_from(&self, resp: DetectResponse) -> Result<Vec<Vec<f32>>, PipelineError> {
        let mut out = Vec::with_capacity(resp.faces.len());
        for (i, face) in resp.faces.into_iter().enumerate() {
            if self.cfg.min_score > 0.0 && face.score.unwrap_or(1.0) < self.cfg.min_score {
                debug!(face = i, score = ?face.score, "detection below min score");
                continue;
            }
            if face.embedding.len() != self.cfg.dimension {
                return Err(PipelineError::FaceModel(format!(
                    "face {i}: embedding has {} values, model declares {}",
                    face.embedding.len(),
                    self.cfg.dimension
                )));
            }
            out.push(face.embedding.iter().map(|&v| v as f32).collect());
        }
        Ok(out)
    }
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| PipelineError::FaceModel(e.to_string()))?;
    Ok(buf)
}

#[async_trait::async_trait]
impl FaceModel for HttpFaceModel {
    async fn detect_faces(&self, image: &RgbImage) -> Result<Vec<Vec<f32>>, PipelineError> {
        let body = encode_png(image)?;
        let url = format!("{}/detect", self.cfg.base_url);

        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "image/png")
            .body(body);
        if !self.cfg.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.cfg.api_key));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PipelineError::FaceModel(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::FaceModel(format!("HTTP {status}: {body}")));
        }

        let data: DetectResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::FaceModel(e.to_string()))?;
        self.faces_from(data)
    }

    fn dimension(&self) -> usize {
        self.cfg.dimension
    }
}
