use std::time::Duration;

use image::RgbImage;

use crate::error::PipelineError;

/// Detects faces in an RGB image and returns one embedding per face, in
/// detection order.
///
/// Every returned vector has [`FaceModel::dimension`] elements.
/// Implementations must be safe for concurrent use.
#[async_trait::async_trait]
pub trait FaceModel: Send + Sync {
    async fn detect_faces(&self, image: &RgbImage) -> Result<Vec<Vec<f32>>, PipelineError>;

    /// Returns the dimensionality of the embedding vectors (e.g., 512).
    fn dimension(&self) -> usize;
}

/// Decode encoded image bytes (PNG, JPEG) into an RGB pixel buffer.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::ImageDecode("empty image".to_string()));
    }
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| PipelineError::ImageDecode(e.to_string()))
}

/// StaticFaceModel returns the same embeddings for every image.
///
/// Intended for testing and dry runs against a real roster.
pub struct StaticFaceModel {
    faces: Vec<Vec<f32>>,
    dim: usize,
    delay: Duration,
}

impl StaticFaceModel {
    pub fn new(faces: Vec<Vec<f32>>) -> Self {
        let dim = faces.first().map(|f| f.len()).unwrap_or(0);
        Self {
            faces,
            dim,
            delay: Duration::ZERO,
        }
    }

    /// Sleep for `delay` before answering, simulating a slow model.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl FaceModel for StaticFaceModel {
    async fn detect_faces(&self, _image: &RgbImage) -> Result<Vec<Vec<f32>>, PipelineError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.faces.clone())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, image::Rgb([200, 180, 160]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}
