//! Product data as it flows through the pipeline: the raw, schema-less field
//! mapping scraped from a page, and the canonical persisted record.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use shop_vision::EmbeddingVector;

/// Field mapping scraped from one product page.
///
/// No fixed schema: keys and value shapes vary with the upstream template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawProduct(Map<String, Value>);

impl RawProduct {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build from a JSON value; `None` unless it is an object.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// A string field, if present and non-empty.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Set `key`, replacing any existing value.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Set `key` only if it is absent, null, or an empty string.
    pub fn fill(&mut self, key: &str, value: impl Into<Value>) {
        let is_gap = match self.0.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if is_gap {
            self.0.insert(key.to_string(), value.into());
        }
    }

    pub fn product_url(&self) -> Option<&str> {
        self.str_field("product_url")
    }

    /// Display name for log lines.
    pub fn label(&self) -> &str {
        self.str_field("name").unwrap_or("Unknown")
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

/// Canonical persisted product. `(source, product_url)` is the natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub source: String,
    pub product_url: String,
    #[serde(default)]
    pub affiliate_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub compressed_image_url: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    pub currency: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub second_hand: bool,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "metadata_from_text_or_json")]
    pub metadata: Option<String>,
    #[serde(default, deserialize_with = "embedding_from_array_or_text")]
    pub embedding: Option<EmbeddingVector>,
    pub created_at: DateTime<Utc>,
}

/// Vector columns come back from PostgREST as text (`"[0.1,0.2]"`), JSON
/// stores give arrays.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEmbedding {
    Values(Vec<f32>),
    Text(String),
}

fn embedding_from_array_or_text<'de, D>(d: D) -> Result<Option<EmbeddingVector>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = match Option::<StoredEmbedding>::deserialize(d)? {
        None => return Ok(None),
        Some(StoredEmbedding::Values(v)) => v,
        Some(StoredEmbedding::Text(s)) => serde_json::from_str::<Vec<f32>>(&s).map_err(D::Error::custom)?,
    };
    let dim = values.len();
    EmbeddingVector::new(values, dim)
        .map(Some)
        .map_err(D::Error::custom)
}

/// Metadata is written as serialized JSON text; a `jsonb` column returns it
/// as structured JSON instead.
fn metadata_from_text_or_json<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
