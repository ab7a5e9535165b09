//! CLI subcommand implementations for the `shopvision` binary.

pub mod full_cmd;
pub mod output;
pub mod single_cmd;
pub mod stats_cmd;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use shop_vision::{ImageEmbedder, SiglipEmbedder};

use crate::config::{load_url_list, ScraperConfig, StoreChoice, StoreConfig};
use crate::pipeline::Pipeline;
use crate::store;

/// Command-line overrides applied on top of the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub store: StoreChoice,
    pub db: Option<PathBuf>,
    pub model: Option<PathBuf>,
    pub fallback_urls: Option<PathBuf>,
    pub concurrency: Option<usize>,
}

impl Overrides {
    /// Resolve the full configuration: defaults, then environment, then flags.
    pub fn resolve(&self) -> Result<ScraperConfig> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Like [`Overrides::resolve`], reading variables through `lookup`.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<ScraperConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ScraperConfig::from_lookup(lookup, self.store)?;

        if let (Some(db), StoreConfig::Sqlite { path, .. }) = (&self.db, &mut config.store) {
            *path = db.clone();
        }
        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(list) = &self.fallback_urls {
            config.fallback_urls = load_url_list(list)?;
        }
        if let Some(n) = self.concurrency {
            if n == 0 {
                bail!("--concurrency must be at least 1");
            }
            config.concurrency = n;
        }
        Ok(config)
    }
}

/// Load the embedding model. A missing model is fatal: products are never
/// stored without an embedding.
pub fn load_embedder(config: &ScraperConfig) -> Result<Arc<dyn ImageEmbedder>> {
    let engine = SiglipEmbedder::load(&config.model_path, config.model_output_index)
        .with_context(|| format!("loading embedding model {}", config.model_path.display()))?;
    check_engine(&engine, config)?;
    tracing::info!("loaded embedding model {}", config.model_path.display());
    Ok(Arc::new(engine))
}

/// The engine must take `image_size` inputs and emit `embedding_dim` vectors.
pub fn check_engine(engine: &dyn ImageEmbedder, config: &ScraperConfig) -> Result<()> {
    if engine.input_size() != config.image_size {
        bail!(
            "model expects {0}x{0} images, configured for {1}x{1}",
            engine.input_size(),
            config.image_size
        );
    }
    if engine.dimension() != config.embedding_dim {
        bail!(
            "model produces {}-dimensional embeddings, expected {}",
            engine.dimension(),
            config.embedding_dim
        );
    }
    Ok(())
}

/// Build the full pipeline (model, store, HTTP clients) for scrape commands.
pub fn build_pipeline(config: &ScraperConfig) -> Result<Pipeline> {
    let engine = load_embedder(config)?;
    let store = store::open(&config.store, config.request_timeout).context("opening product store")?;
    tracing::info!("storing products via {}", store.backend());
    Ok(Pipeline::from_config(config, engine, store)?)
}
