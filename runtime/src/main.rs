// Copyright 2026 ShopVision Contributors
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use shopvision_runtime::cli::{self, output, Overrides};
use shopvision_runtime::config::StoreChoice;
use shopvision_runtime::pipeline::DEFAULT_BATCH_SIZE;

#[derive(Parser)]
#[command(
    name = "shopvision",
    about = "ShopVision: scrape product pages, embed their images, upsert the records",
    version,
    after_help = "Run 'shopvision <command> --help' for details on each command.\nRun 'shopvision' with no command to show store statistics."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Storage backend
    #[arg(long, global = true, value_enum, default_value_t = StoreChoice::Auto)]
    store: StoreChoice,

    /// SQLite database path (overrides SHOPVISION_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// ONNX vision model path (overrides SHOPVISION_MODEL)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// File of fallback product URLs, one per line
    #[arg(long, global = true)]
    fallback_urls: Option<PathBuf>,

    /// Concurrent page extractions per batch
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every product in the sitemap
    Full {
        /// URLs per batch
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Maximum number of URLs to process
        #[arg(long)]
        limit: Option<usize>,
        /// Number of discovered URLs to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Scrape one product page
    Single {
        /// Product page URL
        #[arg(long)]
        url: String,
    },
    /// Show product counts from the store (default)
    Stats,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        cli.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);
    output::init(cli.json, cli.quiet);

    let overrides = Overrides {
        store: cli.store,
        db: cli.db.clone(),
        model: cli.model.clone(),
        fallback_urls: cli.fallback_urls.clone(),
        concurrency: cli.concurrency,
    };

    let result = match cli.command.unwrap_or(Commands::Stats) {
        Commands::Full {
            batch_size,
            limit,
            offset,
        } => cli::full_cmd::run(&overrides, batch_size, limit, offset).await,
        Commands::Single { url } => cli::single_cmd::run(&overrides, &url).await,
        Commands::Stats => cli::stats_cmd::run(&overrides).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "shopvision", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
