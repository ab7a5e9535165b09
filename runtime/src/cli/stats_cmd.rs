//! `shopvision stats`: product counts from the store.

use anyhow::{Context, Result};

use super::{output, Overrides};
use crate::pipeline::{store_stats, SOURCE_STATS_LIMIT};
use crate::store;

pub async fn run(overrides: &Overrides) -> Result<()> {
    let config = overrides.resolve()?;
    let store = store::open(&config.store, config.request_timeout).context("opening product store")?;
    let stats = store_stats(store.as_ref(), &config.profile.source).await?;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&stats)?);
        return Ok(());
    }

    println!("Total products: {}", stats.total);
    let capped = if stats.source_count >= SOURCE_STATS_LIMIT { "+" } else { "" };
    println!("Products from {}: {}{capped}", stats.source, stats.source_count);
    if !output::is_quiet() {
        println!("Store: {}", stats.backend);
    }
    Ok(())
}
