use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::assemble::{self, RecordOutcome};
use crate::browser::BrowserSession;
use crate::config::RunConfig;
use crate::discover;
use crate::proxy;
use crate::record::{RunSummary, WineRecord};
use crate::sink::DatasetSink;

/// Pause between detail pages; sequential pacing keeps the session under
/// rate-based anti-bot thresholds.
const PACING_DELAY: Duration = Duration::from_secs(2);

/// The whole pipeline: validate, discover, then work the LinkSet one URL
/// at a time. Only a configuration problem or a start-page failure is
/// fatal; everything per-record is absorbed into the summary.
pub async fn run(config: &RunConfig, sink: &mut DatasetSink) -> Result<RunSummary> {
    config.validate()?;

    info!("Starting scraper for: {}", config.domain_url);
    info!(
        "Max wines: {}",
        if config.max_wines > 0 {
            config.max_wines.to_string()
        } else {
            "unlimited".to_string()
        }
    );
    info!("Include analytics: {}", config.include_analytics);

    let proxy = if config.use_proxy {
        proxy::provision().await
    } else {
        None
    };

    let session = BrowserSession::launch(proxy.as_deref()).await?;
    let result = run_links(&session, config, sink).await;
    // The session closes on every exit path, fatal errors included.
    session.close().await;
    result
}

/// Assemble one detail URL outside the listing flow; used to debug a
/// single page.
pub async fn probe(
    config: &RunConfig,
    url: &str,
    sink: &mut DatasetSink,
) -> Result<Option<WineRecord>> {
    config.validate()?;

    let proxy = if config.use_proxy {
        proxy::provision().await
    } else {
        None
    };

    let session = BrowserSession::launch(proxy.as_deref()).await?;
    let result = assemble::assemble(&session, url, config, sink).await;
    session.close().await;

    match result? {
        RecordOutcome::Assembled(record) => Ok(Some(record)),
        RecordOutcome::Skipped(_) => Ok(None),
    }
}

async fn run_links(
    session: &BrowserSession,
    config: &RunConfig,
    sink: &mut DatasetSink,
) -> Result<RunSummary> {
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    info!("Loading domain page...");
    let listing = session.load(&config.domain_url).await?;
    let mut links = discover::discover(&listing);
    links.truncate(config.max_wines);

    let mut summary = RunSummary::default();
    if links.is_empty() {
        info!("Nothing to process");
        return Ok(summary);
    }

    let total = links.len();
    info!("Processing {} wines...", total);

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for (i, url) in links.iter().enumerate() {
        if stop.load(Ordering::SeqCst) {
            warn!("Interrupted; stopping after {} of {} wines", i, total);
            break;
        }

        info!("Processing wine {}/{}: {}", i + 1, total, url);
        summary.attempted += 1;

        match assemble::assemble(session, url, config, sink).await {
            Ok(RecordOutcome::Assembled(_)) => summary.succeeded += 1,
            Ok(RecordOutcome::Skipped(_)) => summary.skipped += 1,
            Err(e) => {
                warn!("Failed to assemble {}: {}", url, e);
                summary.skipped += 1;
            }
        }
        pb.inc(1);

        if i + 1 < total {
            sleep(PACING_DELAY).await;
        }
    }

    pb.finish_and_clear();
    info!(
        "Scraped {} wines ({} saved, {} skipped)",
        summary.attempted, summary.succeeded, summary.skipped
    );
    Ok(summary)
}
