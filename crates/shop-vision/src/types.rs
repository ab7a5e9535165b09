//! Core types shared by the embedding pipeline.

use serde::{Deserialize, Serialize};

/// A visual embedding whose length has been checked against the expected
/// model dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Wrap `values`, rejecting any vector whose length is not `dim`.
    pub fn new(values: Vec<f32>, dim: usize) -> VisionResult<Self> {
        if values.len() != dim {
            return Err(VisionError::DimensionMismatch {
                expected: dim,
                actual: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(VisionError::Embedding(
                "embedding contains non-finite values".to_string(),
            ));
        }
        Ok(Self(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

/// Errors that can occur in the vision library.
#[derive(thiserror::Error, Debug)]
pub enum VisionError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model not available: {0}")]
    ModelNotAvailable(String),
}

/// Convenience result type.
pub type VisionResult<T> = Result<T, VisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_accepts_exact_dimension() {
        let v = EmbeddingVector::new(vec![0.25; 768], 768).unwrap();
        assert_eq!(v.len(), 768);
    }

    #[test]
    fn test_vector_rejects_wrong_dimension() {
        let err = EmbeddingVector::new(vec![0.0; 512], 768).unwrap_err();
        assert!(matches!(
            err,
            VisionError::DimensionMismatch {
                expected: 768,
                actual: 512
            }
        ));
    }

    #[test]
    fn test_vector_rejects_nan() {
        let mut values = vec![0.1; 4];
        values[2] = f32::NAN;
        assert!(EmbeddingVector::new(values, 4).is_err());
    }

    #[test]
    fn test_vector_serializes_as_plain_array() {
        let v = EmbeddingVector::new(vec![1.0, 0.5], 2).unwrap();
        assert_eq!(serde_json::to_string(&v).unwrap(), "[1.0,0.5]");
    }
}
