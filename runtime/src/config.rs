//! Configuration loading and resolution.
//!
//! Every value starts from a built-in default, may be overridden by an
//! environment variable, and finally by a command-line flag (applied by the
//! CLI layer directly on the resolved struct).

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Products sitemap of the default source.
pub const DEFAULT_SITEMAP_URL: &str =
    "https://sitemaps.footshop.eu/sitemaps/sitemap_products_6_1.xml";

/// Default storage table.
pub const DEFAULT_TABLE: &str = "products";

/// Static description of the scraped source, stamped onto every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceProfile {
    /// Source identifier, part of the natural key and of every record id.
    pub source: String,
    /// Country/market the storefront serves.
    pub country: String,
    /// Currency used when the page does not state one.
    pub default_currency: String,
    /// Host serving product images; only its URLs get a compressed variant.
    pub asset_host: String,
}

impl Default for SourceProfile {
    fn default() -> Self {
        Self {
            source: "footshop_eu".to_string(),
            country: "EU".to_string(),
            default_currency: "EUR".to_string(),
            asset_host: "static.ftshp.digital".to_string(),
        }
    }
}

/// Retry policy for fetches: exponential backoff up to a fixed attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Which store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum StoreChoice {
    /// PostgREST when Supabase credentials are present, SQLite otherwise.
    #[default]
    Auto,
    Postgrest,
    Sqlite,
}

/// Resolved store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// Supabase / PostgREST over HTTP.
    Postgrest {
        url: String,
        key: String,
        table: String,
    },
    /// Local SQLite file.
    Sqlite { path: PathBuf, table: String },
}

/// Full scraper configuration.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub sitemap_url: String,
    /// Secondary discovery source used when the sitemap is unreachable.
    pub fallback_urls: Vec<String>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Worker pool size for page extraction.
    pub concurrency: usize,
    /// Pause between embedding calls and between batches.
    pub pacing_delay: Duration,
    /// Minimum interval between page (and sitemap) requests.
    pub page_interval: Duration,
    /// Minimum interval between image requests.
    pub image_interval: Duration,
    /// Largest image body downloaded; bigger candidates are skipped.
    pub max_image_bytes: usize,
    /// Square input side the loaded model must expect.
    pub image_size: u32,
    pub embedding_dim: usize,
    pub model_path: PathBuf,
    pub model_output_index: usize,
    pub profile: SourceProfile,
    pub store: StoreConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            sitemap_url: DEFAULT_SITEMAP_URL.to_string(),
            fallback_urls: Vec::new(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            concurrency: 5,
            pacing_delay: Duration::from_secs(1),
            page_interval: Duration::from_secs(1),
            image_interval: Duration::from_millis(500),
            max_image_bytes: 20 * 1024 * 1024,
            image_size: shop_vision::SIGLIP_IMAGE_SIZE,
            embedding_dim: shop_vision::EMBEDDING_DIM,
            model_path: shop_vision::default_model_path(),
            model_output_index: 0,
            profile: SourceProfile::default(),
            store: StoreConfig::Sqlite {
                path: default_db_path(),
                table: DEFAULT_TABLE.to_string(),
            },
        }
    }
}

impl ScraperConfig {
    /// Resolve from the process environment.
    pub fn from_env(choice: StoreChoice) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), choice)
    }

    /// Resolve using `lookup` as the environment.
    pub fn from_lookup<F>(lookup: F, choice: StoreChoice) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(url) = get("SHOPVISION_SITEMAP_URL") {
            cfg.sitemap_url = url;
        }
        if let Some(path) = get("SHOPVISION_FALLBACK_URLS") {
            cfg.fallback_urls = load_url_list(Path::new(&path))?;
        }
        if let Some(model) = get("SHOPVISION_MODEL") {
            cfg.model_path = PathBuf::from(model);
        }
        if let Some(raw) = get("SHOPVISION_CONCURRENCY") {
            cfg.concurrency = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("SHOPVISION_CONCURRENCY must be a positive integer, got '{raw}'"))?;
        }

        let table = get("SHOPVISION_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());
        let supabase = (get("SUPABASE_URL"), get("SUPABASE_KEY"));

        cfg.store = match (choice, supabase) {
            (StoreChoice::Auto | StoreChoice::Postgrest, (Some(url), Some(key))) => {
                url::Url::parse(&url).with_context(|| format!("SUPABASE_URL is not a valid URL: {url}"))?;
                StoreConfig::Postgrest { url, key, table }
            }
            (StoreChoice::Postgrest, _) => {
                bail!("SUPABASE_URL and SUPABASE_KEY must be set in environment variables")
            }
            (StoreChoice::Auto | StoreChoice::Sqlite, _) => StoreConfig::Sqlite {
                path: get("SHOPVISION_DB").map(PathBuf::from).unwrap_or_else(default_db_path),
                table,
            },
        };

        Ok(cfg)
    }
}

/// Default SQLite location: `~/.shopvision/products.db`.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".shopvision")
        .join("products.db")
}

/// Read a URL list: one URL per line, blank lines and `#` comments skipped.
pub fn load_url_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading URL list {}", path.display()))?;
    Ok(parse_url_list(&text))
}

fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}
