//! Image decoding and model-input preparation.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::types::{VisionError, VisionResult};

/// Decode raw image bytes.
///
/// `content_type` is the HTTP `Content-Type` of the download, if known. It is
/// only a hint: unknown or missing types fall back to sniffing the bytes.
pub fn decode_image(bytes: &[u8], content_type: Option<&str>) -> VisionResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(VisionError::InvalidInput("empty image body".to_string()));
    }

    let mime = content_type
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_lowercase())
        .unwrap_or_default();

    let format = match mime.as_str() {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/webp" => Some(ImageFormat::WebP),
        "image/gif" => Some(ImageFormat::Gif),
        _ => None,
    };

    // CDNs mislabel formats often enough that a failed hinted decode
    // gets one more try with sniffing.
    let img = match format {
        Some(fmt) => image::load_from_memory_with_format(bytes, fmt)
            .or_else(|_| image::load_from_memory(bytes))?,
        None => image::load_from_memory(bytes)?,
    };
    Ok(img)
}

/// Convert to RGB and resize to exactly `size`×`size` with Lanczos3.
pub fn prepare_image(img: &DynamicImage, size: u32) -> RgbImage {
    let rgb = img.to_rgb8();
    if rgb.width() == size && rgb.height() == size {
        return rgb;
    }
    image::imageops::resize(&rgb, size, size, FilterType::Lanczos3)
}
