mod assemble;
mod browser;
mod config;
mod discover;
mod document;
mod error;
mod extract;
mod proxy;
mod record;
mod runner;
mod sink;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::config::RunConfig;
use crate::sink::DatasetSink;

#[derive(Parser)]
#[command(name = "ws_scraper", about = "Wine-Searcher merchant domain scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every wine linked from a merchant domain page
    Run {
        /// Merchant domain page URL to start from
        #[arg(long)]
        domain_url: String,
        /// Max wines to scrape (0 = unlimited)
        #[arg(short = 'n', long, default_value_t = 0)]
        max_wines: usize,
        /// Skip the analytics tab (no search rank extraction)
        #[arg(long)]
        no_analytics: bool,
        /// Route the browser through a provisioned proxy
        #[arg(long)]
        use_proxy: bool,
        /// Output feed (JSON lines, appended)
        #[arg(long, default_value = "data/wines.jsonl")]
        out: PathBuf,
    },
    /// Scrape a single wine detail page and print the record
    Probe {
        /// Wine detail page URL
        #[arg(long)]
        url: String,
        /// Skip the analytics tab (no search rank extraction)
        #[arg(long)]
        no_analytics: bool,
        /// Route the browser through a provisioned proxy
        #[arg(long)]
        use_proxy: bool,
        /// Output feed (JSON lines, appended)
        #[arg(long, default_value = "data/wines.jsonl")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            domain_url,
            max_wines,
            no_analytics,
            use_proxy,
            out,
        } => {
            let config = RunConfig {
                domain_url,
                max_wines,
                include_analytics: !no_analytics,
                use_proxy,
            };
            let mut sink = DatasetSink::open(&out)?;
            let summary = runner::run(&config, &mut sink).await?;
            println!(
                "Done: {} attempted ({} saved, {} skipped) -> {}",
                summary.attempted,
                summary.succeeded,
                summary.skipped,
                sink.path().display()
            );
            Ok(())
        }
        Commands::Probe {
            url,
            no_analytics,
            use_proxy,
            out,
        } => {
            let config = RunConfig {
                domain_url: url.clone(),
                max_wines: 1,
                include_analytics: !no_analytics,
                use_proxy,
            };
            let mut sink = DatasetSink::open(&out)?;
            match runner::probe(&config, &url, &mut sink).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("No record extracted from {}", url),
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
