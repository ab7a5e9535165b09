//! `shopvision single --url URL`: scrape and store one product page.

use anyhow::Result;

use super::{build_pipeline, output, Overrides};

pub async fn run(overrides: &Overrides, url: &str) -> Result<()> {
    let config = overrides.resolve()?;
    let pipeline = build_pipeline(&config)?;

    match pipeline.scrape_single_product(url).await {
        Ok((record, outcome)) => {
            if output::is_json() {
                output::print_json(&serde_json::json!({
                    "success": true,
                    "url": url,
                    "id": record.id,
                    "title": record.title,
                    "image_url": record.image_url,
                    "outcome": format!("{outcome:?}").to_lowercase(),
                }));
            } else {
                println!("Single product scraping successful");
            }
            Ok(())
        }
        Err(e) => {
            if !output::is_json() {
                println!("Single product scraping failed");
            }
            Err(anyhow::Error::new(e).context(format!("scraping {url}")))
        }
    }
}
