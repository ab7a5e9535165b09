//! `shopvision full`: scrape every discovered product in batches.

use anyhow::{Context, Result};

use super::{build_pipeline, output, Overrides};

pub async fn run(
    overrides: &Overrides,
    batch_size: usize,
    limit: Option<usize>,
    offset: usize,
) -> Result<()> {
    let config = overrides.resolve()?;
    let pipeline = build_pipeline(&config)?;

    let report = match pipeline.scrape_all(batch_size, limit, offset).await {
        Ok(report) => report,
        Err(e) => {
            if !output::is_json() {
                println!("Scraping completed. Processed 0 products.");
            }
            return Err(e).context("URL discovery failed");
        }
    };

    if output::is_json() {
        output::print_json(&serde_json::to_value(&report)?);
    } else {
        println!("Scraping completed. Processed {} products.", report.persisted);
        if !output::is_quiet() && report.failed_batches > 0 {
            eprintln!("  {} batch(es) failed to store", report.failed_batches);
        }
    }
    Ok(())
}
