//! SigLIP image embedding generation via ONNX Runtime.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;

use crate::types::{VisionError, VisionResult};

/// Embedding dimension of SigLIP base (patch16, 384).
pub const EMBEDDING_DIM: usize = 768;

/// Input resolution expected by SigLIP base (patch16, 384).
pub const SIGLIP_IMAGE_SIZE: u32 = 384;

/// Default model directory, relative to the home directory.
const MODEL_DIR: &str = ".shopvision/models";

/// Default model filename.
const MODEL_FILENAME: &str = "siglip-base-patch16-384-vision.onnx";

/// SigLIP normalises every channel with mean 0.5 / std 0.5.
const SIGLIP_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
const SIGLIP_STD: [f32; 3] = [0.5, 0.5, 0.5];

/// Anything that turns a prepared image into a fixed-length vector.
///
/// Implementations are loaded once and shared read-only for a whole run.
pub trait ImageEmbedder: Send + Sync {
    /// Side length of the square input image.
    fn input_size(&self) -> u32;

    /// Length of every vector returned by [`ImageEmbedder::embed`].
    fn dimension(&self) -> usize;

    /// Embed an image already prepared at `input_size()`×`input_size()`.
    fn embed(&self, image: &RgbImage) -> VisionResult<Vec<f32>>;
}

/// Default location of the vision model: `~/.shopvision/models/…`.
pub fn default_model_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(MODEL_DIR).join(MODEL_FILENAME)
}

/// SigLIP vision tower exported to ONNX.
pub struct SiglipEmbedder {
    session: Mutex<Session>,
    output_index: usize,
    image_size: u32,
    dim: usize,
}

impl SiglipEmbedder {
    /// Load the model at `path`. A missing or unloadable model is an error.
    pub fn load(path: &Path, output_index: usize) -> VisionResult<Self> {
        if !path.exists() {
            return Err(VisionError::ModelNotAvailable(format!(
                "SigLIP model not found at {}",
                path.display()
            )));
        }

        tracing::info!("Loading SigLIP model from {}", path.display());

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| VisionError::Embedding(format!("Failed to load ONNX model: {e}")))?;

        tracing::info!("SigLIP model loaded successfully");
        Ok(Self {
            session: Mutex::new(session),
            output_index,
            image_size: SIGLIP_IMAGE_SIZE,
            dim: EMBEDDING_DIM,
        })
    }

    fn to_tensor(&self, image: &RgbImage) -> VisionResult<Array4<f32>> {
        let size = self.image_size;
        if image.dimensions() != (size, size) {
            return Err(VisionError::InvalidInput(format!(
                "expected a {size}x{size} image, got {}x{}",
                image.width(),
                image.height()
            )));
        }

        // NCHW [1, 3, size, size]
        let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in image.enumerate_pixels() {
            for c in 0..3usize {
                let val = f32::from(pixel[c]) / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (val - SIGLIP_MEAN[c]) / SIGLIP_STD[c];
            }
        }
        Ok(tensor)
    }
}

impl ImageEmbedder for SiglipEmbedder {
    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, image: &RgbImage) -> VisionResult<Vec<f32>> {
        let tensor = self.to_tensor(image)?;
        let input_tensor = Tensor::from_array(tensor)
            .map_err(|e| VisionError::Embedding(format!("Failed to create input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| VisionError::Embedding("model session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| VisionError::Embedding(format!("ONNX inference failed: {e}")))?;

        if self.output_index >= outputs.len() {
            return Err(VisionError::Embedding(format!(
                "model has {} outputs, output {} requested",
                outputs.len(),
                self.output_index
            )));
        }

        let (_shape, data) = outputs[self.output_index]
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Embedding(format!("Failed to extract output: {e}")))?;

        let embedding: Vec<f32> = data.to_vec();
        if embedding.len() != self.dim {
            return Err(VisionError::DimensionMismatch {
                expected: self.dim,
                actual: embedding.len(),
            });
        }

        // L2 normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            Ok(embedding.iter().map(|x| x / norm).collect())
        } else {
            Ok(embedding)
        }
    }
}
