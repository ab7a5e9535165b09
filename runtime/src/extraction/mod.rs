//! Turning raw product data into image candidates and canonical records.

pub mod images;
pub mod mapper;
pub mod resolver;
pub mod text;

pub use images::{extract_image_urls, ImageCandidates};
pub use mapper::{validate_record, InvalidRecord, RecordMapper, UNKNOWN_TITLE};
pub use text::sanitize_text;
