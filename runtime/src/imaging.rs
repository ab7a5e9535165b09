//! Image download and embedding for one product.
//!
//! Candidates are tried in order and the first one that downloads, decodes
//! and embeds to the expected dimension wins. A product with no such image
//! gets no embedding and is never stored.

use std::sync::Arc;

use shop_vision::{decode_image, prepare_image, EmbeddingVector, ImageEmbedder, VisionError};

use crate::acquisition::{FetchError, HttpClient};
use crate::extraction::ImageCandidates;

/// Why a single candidate image was rejected.
#[derive(thiserror::Error, Debug)]
pub enum CandidateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error("embedding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// No usable image+embedding pair for a product.
#[derive(thiserror::Error, Debug)]
pub enum EmbedError {
    #[error("no image candidates")]
    NoCandidates,

    #[error("all {attempted} image candidate(s) failed, last: {last}")]
    AllCandidatesFailed {
        attempted: usize,
        #[source]
        last: CandidateError,
    },
}

/// The image that was embedded and its vector.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub image_url: String,
    pub embedding: EmbeddingVector,
}

/// Downloads candidate images and embeds them with a shared engine.
#[derive(Clone)]
pub struct ImageProcessor {
    http: HttpClient,
    engine: Arc<dyn ImageEmbedder>,
    dim: usize,
}

impl ImageProcessor {
    /// `http` should be the image client, with its own rate limit.
    pub fn new(http: HttpClient, engine: Arc<dyn ImageEmbedder>, dim: usize) -> Self {
        Self { http, engine, dim }
    }

    /// Embed the first candidate that works.
    pub async fn process_product_images(
        &self,
        candidates: &ImageCandidates,
    ) -> Result<EmbeddedImage, EmbedError> {
        if candidates.is_empty() {
            return Err(EmbedError::NoCandidates);
        }

        let mut last = None;
        for (i, url) in candidates.iter().enumerate() {
            match self.embed_url(url).await {
                Ok(embedding) => {
                    if i > 0 {
                        tracing::debug!("embedded fallback image #{} {url}", i + 1);
                    }
                    return Ok(EmbeddedImage {
                        image_url: url.to_string(),
                        embedding,
                    });
                }
                Err(e) => {
                    tracing::debug!("image candidate {url} rejected: {e}");
                    last = Some(e);
                }
            }
        }

        match last {
            Some(last) => Err(EmbedError::AllCandidatesFailed {
                attempted: candidates.len(),
                last,
            }),
            None => Err(EmbedError::NoCandidates),
        }
    }

    /// Download and embed one image. Oversized bodies fail like any other
    /// fetch error and the next candidate is tried.
    async fn embed_url(&self, url: &str) -> Result<EmbeddingVector, CandidateError> {
        let (bytes, content_type) = self.http.get_bytes(url).await?;
        let engine = Arc::clone(&self.engine);
        let dim = self.dim;

        let embedding = tokio::task::spawn_blocking(move || -> Result<EmbeddingVector, VisionError> {
            let img = decode_image(&bytes, content_type.as_deref())?;
            let rgb = prepare_image(&img, engine.input_size());
            EmbeddingVector::new(engine.embed(&rgb)?, dim)
        })
        .await??;

        Ok(embedding)
    }
}
