//! Local SQLite product table.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use shop_vision::EmbeddingVector;

use super::{validate_table_name, ProductStore, StoreError};
use crate::product::ProductRecord;

const COLUMNS: &str = "id, source, product_url, affiliate_url, image_url, compressed_image_url, \
                       brand, title, description, category, gender, price, currency, country, \
                       size, second_hand, tags, metadata, embedding, created_at";

/// Product table in a SQLite file. Tags, metadata and embeddings are JSON text.
pub struct SqliteStore {
    db: Mutex<Connection>,
    table: String,
}

impl SqliteStore {
    /// Open or create the database at `path` and ensure the table exists.
    pub fn open(path: &Path, table: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let db = Connection::open(path)?;
        Self::with_connection(db, table)
    }

    /// In-memory store, for tests and dry runs.
    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(db: Connection, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        db.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                product_url TEXT NOT NULL,
                affiliate_url TEXT,
                image_url TEXT,
                compressed_image_url TEXT,
                brand TEXT,
                title TEXT NOT NULL,
                description TEXT,
                category TEXT,
                gender TEXT,
                price REAL,
                currency TEXT NOT NULL,
                country TEXT,
                size TEXT,
                second_hand INTEGER NOT NULL DEFAULT 0,
                tags TEXT,
                metadata TEXT,
                embedding TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(source, product_url)
            );"
        ))?;
        Ok(Self {
            db: Mutex::new(db),
            table: table.to_string(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

/// JSON-encoded optional columns.
struct EncodedRow {
    tags: Option<String>,
    embedding: Option<String>,
    created_at: String,
}

fn encode(record: &ProductRecord) -> Result<EncodedRow, StoreError> {
    Ok(EncodedRow {
        tags: record.tags.as_ref().map(serde_json::to_string).transpose()?,
        embedding: record.embedding.as_ref().map(serde_json::to_string).transpose()?,
        created_at: record.created_at.to_rfc3339(),
    })
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<Result<ProductRecord, StoreError>> {
    let tags: Option<String> = row.get(16)?;
    let embedding: Option<String> = row.get(18)?;
    let created_at: String = row.get(19)?;
    let (tags, embedding, created_at) =
        match decode_columns(tags.as_deref(), embedding.as_deref(), &created_at) {
            Ok(decoded) => decoded,
            Err(e) => return Ok(Err(e)),
        };

    Ok(Ok(ProductRecord {
        id: row.get(0)?,
        source: row.get(1)?,
        product_url: row.get(2)?,
        affiliate_url: row.get(3)?,
        image_url: row.get(4)?,
        compressed_image_url: row.get(5)?,
        brand: row.get(6)?,
        title: row.get(7)?,
        description: row.get(8)?,
        category: row.get(9)?,
        gender: row.get(10)?,
        price: row.get(11)?,
        currency: row.get(12)?,
        country: row.get(13)?,
        size: row.get(14)?,
        second_hand: row.get(15)?,
        tags,
        metadata: row.get(17)?,
        embedding,
        created_at,
    }))
}

type DecodedColumns = (Option<Vec<String>>, Option<EmbeddingVector>, DateTime<Utc>);

fn decode_columns(
    tags: Option<&str>,
    embedding: Option<&str>,
    created_at: &str,
) -> Result<DecodedColumns, StoreError> {
    let tags = tags.map(serde_json::from_str::<Vec<String>>).transpose()?;
    let embedding = match embedding {
        Some(text) => {
            let values: Vec<f32> = serde_json::from_str(text)?;
            let dim = values.len();
            Some(EmbeddingVector::new(values, dim).map_err(|e| StoreError::Decode(e.to_string()))?)
        }
        None => None,
    };
    let created_at = DateTime::parse_from_rfc3339(created_at)
        .map_err(|e| StoreError::Decode(format!("created_at '{created_at}': {e}")))?
        .with_timezone(&Utc);
    Ok((tags, embedding, created_at))
}

#[async_trait]
impl ProductStore for SqliteStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn exists(&self, source: &str, product_url: &str) -> Result<bool, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT 1 FROM {} WHERE source = ?1 AND product_url = ?2 LIMIT 1",
            self.table
        ))?;
        Ok(stmt.exists(params![source, product_url])?)
    }

    async fn insert(&self, record: &ProductRecord) -> Result<(), StoreError> {
        let enc = encode(record)?;
        let db = self.conn()?;
        db.execute(
            &format!(
                "INSERT INTO {} ({COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
                self.table
            ),
            params![
                record.id,
                record.source,
                record.product_url,
                record.affiliate_url,
                record.image_url,
                record.compressed_image_url,
                record.brand,
                record.title,
                record.description,
                record.category,
                record.gender,
                record.price,
                record.currency,
                record.country,
                record.size,
                record.second_hand,
                enc.tags,
                record.metadata,
                enc.embedding,
                enc.created_at,
            ],
        )?;
        Ok(())
    }

    async fn update(&self, record: &ProductRecord) -> Result<bool, StoreError> {
        let enc = encode(record)?;
        let db = self.conn()?;
        let rows = db.execute(
            &format!(
                "UPDATE {} SET id = ?1, affiliate_url = ?4, image_url = ?5, \
                 compressed_image_url = ?6, brand = ?7, title = ?8, description = ?9, \
                 category = ?10, gender = ?11, price = ?12, currency = ?13, country = ?14, \
                 size = ?15, second_hand = ?16, tags = ?17, metadata = ?18, embedding = ?19, \
                 created_at = ?20 \
                 WHERE source = ?2 AND product_url = ?3",
                self.table
            ),
            params![
                record.id,
                record.source,
                record.product_url,
                record.affiliate_url,
                record.image_url,
                record.compressed_image_url,
                record.brand,
                record.title,
                record.description,
                record.category,
                record.gender,
                record.price,
                record.currency,
                record.country,
                record.size,
                record.second_hand,
                enc.tags,
                record.metadata,
                enc.embedding,
                enc.created_at,
            ],
        )?;
        Ok(rows > 0)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let db = self.conn()?;
        let n: i64 = db.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
            row.get(0)
        })?;
        Ok(n.max(0) as u64)
    }

    async fn list_by_source(&self, source: &str, limit: usize) -> Result<Vec<ProductRecord>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {COLUMNS} FROM {} WHERE source = ?1 ORDER BY created_at LIMIT ?2",
            self.table
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![source, limit], decode_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    async fn delete(&self, source: &str, product_url: &str) -> Result<bool, StoreError> {
        let db = self.conn()?;
        let rows = db.execute(
            &format!("DELETE FROM {} WHERE source = ?1 AND product_url = ?2", self.table),
            params![source, product_url],
        )?;
        Ok(rows > 0)
    }
}
