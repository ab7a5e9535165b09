//! Image candidate selection.
//!
//! Probes the known upstream image shapes in a fixed priority order and
//! produces an ordered, deduplicated list of URLs to try for embedding.

use std::collections::HashSet;

use serde_json::Value;

use crate::product::RawProduct;

/// Flat array fields holding image URLs.
const GALLERY_FIELDS: &[&str] = &["gallery_images", "product_images", "images"];

/// Ordered image URLs, unique by value, never containing empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageCandidates {
    urls: Vec<String>,
    seen: HashSet<String>,
}

impl ImageCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `url` unless it is empty or already listed.
    pub fn push(&mut self, url: &str) {
        let url = url.trim();
        if url.is_empty() || self.seen.contains(url) {
            return;
        }
        self.seen.insert(url.to_string());
        self.urls.push(url.to_string());
    }

    /// Make `url` the first candidate, moving it if already listed.
    pub fn push_front(&mut self, url: &str) {
        let url = url.trim();
        if url.is_empty() {
            return;
        }
        if self.seen.contains(url) {
            self.urls.retain(|u| u != url);
        } else {
            self.seen.insert(url.to_string());
        }
        self.urls.insert(0, url.to_string());
    }

    pub fn first(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.urls
    }
}

impl<S: AsRef<str>> FromIterator<S> for ImageCandidates {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = Self::new();
        for url in iter {
            list.push(url.as_ref());
        }
        list
    }
}

/// Collect image candidates from `raw`, in priority order:
///
/// 1. `images.cover_image`, then each `images.other[]` entry's
///    `mobile_image` (full resolution), falling back to its `image`.
/// 2. Flat URL arrays (`gallery_images`, `product_images`, `images`).
/// 3. Top-level `image` or `last_image`, always placed first.
/// 4. Per-variant `images`/`image` (list or single URL) from `variants`
///    or `color_variations`.
///
/// An empty result is not an error here.
pub fn extract_image_urls(raw: &RawProduct) -> ImageCandidates {
    let mut list = ImageCandidates::new();

    if let Some(images) = raw.get("images").filter(|v| v.is_object()) {
        if let Some(cover) = images.get("cover_image").and_then(Value::as_str) {
            list.push(cover);
        }
        if let Some(others) = images.get("other").and_then(Value::as_array) {
            for obj in others.iter().filter(|o| o.is_object()) {
                if let Some(url) = first_str(obj, &["mobile_image", "image"]) {
                    list.push(url);
                }
            }
        }
    }

    for field in GALLERY_FIELDS {
        if let Some(items) = raw.get(field).and_then(Value::as_array) {
            for url in items.iter().filter_map(Value::as_str) {
                list.push(url);
            }
        }
    }

    if let Some(main) = raw.str_field("image").or_else(|| raw.str_field("last_image")) {
        list.push_front(main);
    }

    let variants = ["variants", "color_variations"]
        .iter()
        .find_map(|k| raw.get(k).and_then(Value::as_array).filter(|a| !a.is_empty()));
    if let Some(variants) = variants {
        for variant in variants.iter().filter(|v| v.is_object()) {
            let value = ["images", "image"]
                .iter()
                .find_map(|k| variant.get(*k).filter(|v| is_truthy(v)));
            match value {
                Some(Value::Array(items)) => {
                    for url in items.iter().filter_map(Value::as_str) {
                        list.push(url);
                    }
                }
                Some(Value::String(url)) => list.push(url),
                _ => {}
            }
        }
    }

    list
}

fn first_str<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    }
}
