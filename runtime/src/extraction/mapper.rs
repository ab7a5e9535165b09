//! Mapping of raw product data onto the canonical [`ProductRecord`].

use chrono::Utc;
use md5::{Digest, Md5};
use serde_json::{Map, Value};
use shop_vision::EmbeddingVector;

use super::resolver::{self, resolve_number, resolve_text};
use crate::config::SourceProfile;
use crate::product::{ProductRecord, RawProduct};

/// Title used when no title field resolves.
pub const UNKNOWN_TITLE: &str = "Unknown Product";

/// Raw fields without a dedicated column, kept in `metadata`.
const METADATA_FIELDS: &[&str] = &[
    "code",
    "type",
    "color",
    "color_en",
    "variants",
    "specifications",
    "materials",
    "care_instructions",
    "weight",
    "dimensions",
];

/// Path segment swapped for the compressed image variant.
const FULL_SEGMENT: &str = "full_product";
const MEDIUM_SEGMENT: &str = "medium_product";

/// Why a mapped record cannot be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRecord {
    #[error("missing id")]
    MissingId,
    #[error("missing title")]
    MissingTitle,
    #[error("missing image_url")]
    MissingImage,
    #[error("missing embedding")]
    MissingEmbedding,
}

/// Maps [`RawProduct`]s for one source. Pure apart from the timestamp.
#[derive(Debug, Clone)]
pub struct RecordMapper {
    profile: SourceProfile,
}

impl RecordMapper {
    pub fn new(profile: SourceProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    /// Build the record for `raw`.
    ///
    /// `image_url` is the image the embedding was computed from; without one
    /// the main image field of `raw` is used.
    pub fn map_product_data(
        &self,
        raw: &RawProduct,
        image_url: Option<&str>,
        embedding: Option<EmbeddingVector>,
    ) -> ProductRecord {
        let product_url = raw.product_url().unwrap_or_default().to_string();
        let image_url = image_url
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .or_else(|| resolve_text(raw, resolver::MAIN_IMAGE));

        let brand = resolve_text(raw, resolver::BRAND);
        let category = resolve_text(raw, resolver::CATEGORY);
        let gender = resolve_text(raw, resolver::GENDER);
        let color = resolve_text(raw, resolver::COLOR);
        let tags = build_tags(
            brand.as_deref(),
            category.as_deref(),
            gender.as_deref(),
            color.as_deref(),
        );

        ProductRecord {
            id: self.product_id(raw, &product_url),
            source: self.profile.source.clone(),
            product_url,
            affiliate_url: None,
            compressed_image_url: image_url.as_deref().map(|u| self.compressed_image_url(u)),
            image_url,
            brand,
            title: resolve_text(raw, resolver::TITLE).unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            description: resolve_text(raw, resolver::DESCRIPTION),
            category,
            gender,
            price: resolve_number(raw, resolver::PRICE),
            currency: resolve_text(raw, resolver::CURRENCY)
                .unwrap_or_else(|| self.profile.default_currency.clone()),
            country: resolve_text(raw, resolver::COUNTRY).or_else(|| Some(self.profile.country.clone())),
            size: None,
            second_hand: false,
            tags,
            metadata: build_metadata(raw),
            embedding,
            created_at: Utc::now(),
        }
    }

    /// `{source}_{native id}`, or `{source}_` plus the first 16 hex digits of
    /// the URL's MD5 when the product has no native id.
    pub fn product_id(&self, raw: &RawProduct, product_url: &str) -> String {
        let suffix = match resolve_text(raw, resolver::NATIVE_ID) {
            Some(native) => native,
            None => {
                let digest = Md5::digest(product_url.as_bytes());
                let mut hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
                hex.truncate(16);
                hex
            }
        };
        format!("{}_{}", self.profile.source, suffix)
    }

    /// Medium-size variant of an image on the source's asset host; other URLs
    /// pass through unchanged.
    pub fn compressed_image_url(&self, image_url: &str) -> String {
        let on_asset_host = url::Url::parse(image_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|host| {
                let asset = self.profile.asset_host.to_ascii_lowercase();
                host == asset || host.ends_with(&format!(".{asset}"))
            });
        if on_asset_host {
            image_url.replace(FULL_SEGMENT, MEDIUM_SEGMENT)
        } else {
            image_url.to_string()
        }
    }
}

fn tag(value: &str) -> String {
    value.trim().to_lowercase().replace(' ', "_")
}

fn build_tags(
    brand: Option<&str>,
    category: Option<&str>,
    gender: Option<&str>,
    color: Option<&str>,
) -> Option<Vec<String>> {
    let candidates = [
        brand.map(tag),
        category.map(tag),
        gender
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(|g| format!("gender_{g}")),
        color.map(tag),
    ];

    // ordered set: first occurrence wins
    let mut tags: Vec<String> = Vec::new();
    for t in candidates.into_iter().flatten() {
        if !t.is_empty() && !tags.contains(&t) {
            tags.push(t);
        }
    }
    (!tags.is_empty()).then_some(tags)
}

fn build_metadata(raw: &RawProduct) -> Option<String> {
    let fields: Map<String, Value> = METADATA_FIELDS
        .iter()
        .filter_map(|key| {
            raw.get(key)
                .filter(|v| !v.is_null())
                .map(|v| (key.to_string(), v.clone()))
        })
        .collect();
    if fields.is_empty() {
        return None;
    }
    match serde_json::to_string(&fields) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!("failed to serialize metadata: {e}");
            None
        }
    }
}

/// Check that `record` carries everything a stored product needs.
pub fn validate_record(record: &ProductRecord) -> Result<(), InvalidRecord> {
    if record.id.trim().is_empty() {
        return Err(InvalidRecord::MissingId);
    }
    if record.title.trim().is_empty() {
        return Err(InvalidRecord::MissingTitle);
    }
    if record.image_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
        return Err(InvalidRecord::MissingImage);
    }
    if record.embedding.is_none() {
        return Err(InvalidRecord::MissingEmbedding);
    }
    Ok(())
}
