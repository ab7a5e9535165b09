//! Batch orchestration: discover → extract → embed → map → persist.
//!
//! Page extraction for a batch runs on a bounded pool. Embedding then runs
//! one item at a time with a fixed pause between calls, and the batch's
//! valid records are upserted together. Losing an item never aborts its
//! batch and a failing batch never aborts the run; only URL discovery is
//! fatal.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use shop_vision::ImageEmbedder;

use crate::acquisition::{ExtractError, FetchError, HttpClient, PageExtractor};
use crate::config::ScraperConfig;
use crate::discovery::{
    paginate, DiscoveryError, FallbackProvider, SitemapProvider, StaticUrlProvider, UrlProvider,
};
use crate::extraction::{extract_image_urls, validate_record, InvalidRecord, RecordMapper};
use crate::imaging::{EmbedError, ImageProcessor};
use crate::product::{ProductRecord, RawProduct};
use crate::store::{ProductStore, StoreError, UpsertOutcome};

/// Default number of URLs per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Records scanned when counting one source's products.
pub const SOURCE_STATS_LIMIT: usize = 1000;

/// Why one product was dropped.
#[derive(thiserror::Error, Debug)]
pub enum ItemError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("invalid record: {0}")]
    Invalid(#[from] InvalidRecord),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counters for one full run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// URLs left after `limit`/`offset`.
    pub discovered: usize,
    pub batches: usize,
    pub extracted: usize,
    pub embedded: usize,
    pub persisted: usize,
    pub failed_batches: usize,
}

/// Counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub extracted: usize,
    pub embedded: usize,
    pub persisted: usize,
}

/// Storage totals for the `stats` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub backend: String,
    pub total: u64,
    pub source: String,
    pub source_count: usize,
}

/// The scrape pipeline for one source.
pub struct Pipeline {
    urls: Box<dyn UrlProvider>,
    extractor: PageExtractor,
    images: ImageProcessor,
    mapper: RecordMapper,
    store: Arc<dyn ProductStore>,
    concurrency: usize,
    pacing_delay: Duration,
}

impl Pipeline {
    pub fn new(
        urls: Box<dyn UrlProvider>,
        extractor: PageExtractor,
        images: ImageProcessor,
        mapper: RecordMapper,
        store: Arc<dyn ProductStore>,
    ) -> Self {
        Self {
            urls,
            extractor,
            images,
            mapper,
            store,
            concurrency: 5,
            pacing_delay: Duration::from_secs(1),
        }
    }

    /// Worker pool size for page extraction.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Pause between embedding calls and between batches.
    pub fn with_pacing_delay(mut self, delay: Duration) -> Self {
        self.pacing_delay = delay;
        self
    }

    /// Wire the pipeline from configuration.
    ///
    /// Pages and images get separate HTTP clients so each has its own rate
    /// limit. The sitemap is fetched through the page client.
    pub fn from_config(
        config: &ScraperConfig,
        engine: Arc<dyn ImageEmbedder>,
        store: Arc<dyn ProductStore>,
    ) -> Result<Self, FetchError> {
        let pages = HttpClient::new(config.request_timeout, config.retry, config.page_interval)?;
        let images = HttpClient::new(config.request_timeout, config.retry, config.image_interval)?
            .with_max_body_bytes(config.max_image_bytes);

        let sitemap = Box::new(SitemapProvider::new(pages.clone(), config.sitemap_url.clone()));
        let urls: Box<dyn UrlProvider> = if config.fallback_urls.is_empty() {
            sitemap
        } else {
            Box::new(FallbackProvider::new(
                sitemap,
                Box::new(StaticUrlProvider::new(config.fallback_urls.clone())),
            ))
        };

        Ok(Self::new(
            urls,
            PageExtractor::new(pages, config.profile.clone()),
            ImageProcessor::new(images, engine, config.embedding_dim),
            RecordMapper::new(config.profile.clone()),
            store,
        )
        .with_concurrency(config.concurrency)
        .with_pacing_delay(config.pacing_delay))
    }

    pub fn store(&self) -> &Arc<dyn ProductStore> {
        &self.store
    }

    /// Scrape every discovered URL (after `offset`, at most `limit`) in
    /// batches of `batch_size`.
    pub async fn scrape_all(
        &self,
        batch_size: usize,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<RunReport, DiscoveryError> {
        let urls = paginate(self.urls.list_product_urls().await?, limit, offset);
        let batch_size = batch_size.max(1);
        let total_batches = urls.len().div_ceil(batch_size);
        let mut report = RunReport {
            discovered: urls.len(),
            ..RunReport::default()
        };
        tracing::info!("processing {} product URLs in {total_batches} batch(es)", urls.len());

        for (i, batch) in urls.chunks(batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pacing_delay).await;
            }
            tracing::info!("batch {}/{total_batches}: {} URL(s)", i + 1, batch.len());
            report.batches += 1;

            match self.scrape_product_batch(batch).await {
                Ok(b) => {
                    report.extracted += b.extracted;
                    report.embedded += b.embedded;
                    report.persisted += b.persisted;
                    tracing::info!(
                        "batch {}/{total_batches}: stored {} of {} URL(s)",
                        i + 1,
                        b.persisted,
                        batch.len()
                    );
                }
                Err(e) => {
                    report.failed_batches += 1;
                    tracing::error!("batch {}/{total_batches} failed: {e}", i + 1);
                }
            }
        }

        tracing::info!(
            "run finished: {} stored, {} extracted, {} embedded, {} failed batch(es)",
            report.persisted,
            report.extracted,
            report.embedded,
            report.failed_batches
        );
        Ok(report)
    }

    /// Process one batch of URLs. Only a store outage is an error.
    pub async fn scrape_product_batch(&self, urls: &[String]) -> Result<BatchReport, StoreError> {
        let raws: Vec<RawProduct> = stream::iter(urls)
            .map(|url| self.extractor.scrape_product(url))
            .buffer_unordered(self.concurrency)
            .filter_map(|raw| async move { raw })
            .collect()
            .await;

        let mut report = BatchReport {
            extracted: raws.len(),
            ..BatchReport::default()
        };

        let mut records = Vec::with_capacity(raws.len());
        for (i, raw) in raws.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pacing_delay).await;
            }
            match self.prepare_record(raw).await {
                Ok(record) => records.push(record),
                Err(e) => tracing::error!(
                    "dropping {} ({}): {e}",
                    raw.label(),
                    raw.product_url().unwrap_or("?")
                ),
            }
        }
        report.embedded = records.len();

        if !records.is_empty() {
            report.persisted = self.store.upsert_batch(&records).await?;
        }
        Ok(report)
    }

    /// Embed an extracted product and map it to a persistable record.
    pub async fn prepare_record(&self, raw: &RawProduct) -> Result<ProductRecord, ItemError> {
        let candidates = extract_image_urls(raw);
        tracing::debug!("{} image candidate(s) for {}", candidates.len(), raw.label());

        let embedded = self.images.process_product_images(&candidates).await?;
        let record = self.mapper.map_product_data(
            raw,
            Some(embedded.image_url.as_str()),
            Some(embedded.embedding),
        );
        validate_record(&record)?;
        Ok(record)
    }

    /// Scrape, embed and store a single product page.
    pub async fn scrape_single_product(&self, url: &str) -> Result<(ProductRecord, UpsertOutcome), ItemError> {
        let raw = self.extractor.extract(url).await?;
        let record = self.prepare_record(&raw).await?;
        let outcome = self.store.upsert(&record).await?;
        tracing::info!("{outcome:?} {} ({})", record.id, record.title);
        Ok((record, outcome))
    }

    /// Totals from the store.
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        store_stats(self.store.as_ref(), &self.mapper.profile().source).await
    }
}

/// Totals from `store`; the per-source figure is capped at
/// [`SOURCE_STATS_LIMIT`].
pub async fn store_stats(store: &dyn ProductStore, source: &str) -> Result<StoreStats, StoreError> {
    let total = store.count().await?;
    let source_count = store.list_by_source(source, SOURCE_STATS_LIMIT).await?.len();
    Ok(StoreStats {
        backend: store.backend().to_string(),
        total,
        source: source.to_string(),
        source_count,
    })
}
