//! ShopVision: image preparation and visual embeddings for product imagery.

pub mod capture;
pub mod embedding;
pub mod types;

pub use capture::{decode_image, prepare_image};
pub use embedding::{
    default_model_path, ImageEmbedder, SiglipEmbedder, EMBEDDING_DIM, SIGLIP_IMAGE_SIZE,
};
pub use types::*;
