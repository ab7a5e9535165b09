//! HTTP acquisition: the shared fetch client, request pacing, and product
//! page extraction.

pub mod http_client;
pub mod product_page;
pub mod rate_limit;

pub use http_client::{FetchError, HttpClient, HttpResponse};
pub use product_page::{parse_product_page, ExtractError, PageExtractor};
pub use rate_limit::IntervalLimiter;
