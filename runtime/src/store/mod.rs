//! Product persistence.
//!
//! Records are keyed by `(source, product_url)`. Upsert is an existence
//! check followed by an update or an insert; the two steps are not atomic,
//! which is fine for the single writer a run uses but can race between
//! concurrent writers of the same key.

pub mod postgrest;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::product::ProductRecord;

pub use postgrest::PostgrestStore;
pub use sqlite::SqliteStore;

/// Errors from a [`ProductStore`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The backend cannot be reached or is failing as a whole.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected request (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid stored row: {0}")]
    Decode(String),

    #[error("invalid store configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether the whole backend is down, as opposed to one record failing.
    pub fn is_outage(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// A table of [`ProductRecord`]s.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Backend name for log lines.
    fn backend(&self) -> &str;

    async fn exists(&self, source: &str, product_url: &str) -> Result<bool, StoreError>;

    async fn insert(&self, record: &ProductRecord) -> Result<(), StoreError>;

    /// Overwrite the row with `record`'s natural key. `false` if none matched.
    async fn update(&self, record: &ProductRecord) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn list_by_source(&self, source: &str, limit: usize) -> Result<Vec<ProductRecord>, StoreError>;

    /// Remove the row with this natural key. `false` if none matched.
    async fn delete(&self, source: &str, product_url: &str) -> Result<bool, StoreError>;

    /// Insert `record`, or update it in place if its natural key exists.
    async fn upsert(&self, record: &ProductRecord) -> Result<UpsertOutcome, StoreError> {
        if self.exists(&record.source, &record.product_url).await? && self.update(record).await? {
            return Ok(UpsertOutcome::Updated);
        }
        self.insert(record).await?;
        Ok(UpsertOutcome::Inserted)
    }

    /// Upsert each record, returning how many succeeded.
    ///
    /// A failing record is logged and skipped. An outage aborts the batch
    /// with an error.
    async fn upsert_batch(&self, records: &[ProductRecord]) -> Result<usize, StoreError> {
        let mut stored = 0;
        for record in records {
            match self.upsert(record).await {
                Ok(outcome) => {
                    tracing::debug!("{outcome:?} {} ({})", record.id, record.product_url);
                    stored += 1;
                }
                Err(e) if e.is_outage() => return Err(e),
                Err(e) => tracing::error!("failed to store {}: {e}", record.product_url),
            }
        }
        Ok(stored)
    }
}

/// Open the configured backend.
pub fn open(config: &StoreConfig, timeout: Duration) -> Result<Arc<dyn ProductStore>, StoreError> {
    Ok(match config {
        StoreConfig::Postgrest { url, key, table } => {
            Arc::new(PostgrestStore::new(url, key, table, timeout)?)
        }
        StoreConfig::Sqlite { path, table } => Arc::new(SqliteStore::open(path, table)?),
    })
}

/// Table names are interpolated into SQL and URLs, so only plain
/// identifiers are accepted.
pub(crate) fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::Config(format!("invalid table name '{table}'")))
    }
}
