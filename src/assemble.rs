use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::RunConfig;
use crate::document::LoadedDocument;
use crate::extract::{self, fields};
use crate::record::WineRecord;
use crate::sink::DatasetSink;

const ANALYTICS_TAB_SELECTORS: &[&str] = &[r#"a[href*="analytics"]"#, r#"[data-tab="analytics"]"#];
const ANALYTICS_SETTLE: Duration = Duration::from_secs(2);
const ANALYTICS_CONTENT_WAIT: Duration = Duration::from_secs(6);
const ANALYTICS_CONTENT_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    NavigationFailed,
    NameMissing,
}

pub enum RecordOutcome {
    Assembled(WineRecord),
    Skipped(SkipReason),
}

/// Primary fields pulled from one detail-page snapshot. Independent and
/// read-only, so extraction order does not matter.
struct FieldSet {
    name: Option<String>,
    appellation: Option<String>,
    rating: Option<u32>,
    style: Option<String>,
    avg_price: Option<String>,
}

fn extract_fields(doc: &LoadedDocument) -> FieldSet {
    FieldSet {
        name: extract::extract(doc, &fields::NAME),
        appellation: extract::extract(doc, &fields::APPELLATION),
        rating: extract::extract(doc, &fields::RATING).and_then(|v| v.parse().ok()),
        style: extract::extract(doc, &fields::STYLE),
        avg_price: extract::extract(doc, &fields::AVG_PRICE),
    }
}

/// A record exists iff the name resolved; everything else may be unknown.
fn finish_record(url: &str, f: FieldSet, search_rank: Option<u32>) -> Option<WineRecord> {
    let name = f.name?;
    Some(WineRecord {
        url: url.to_string(),
        name,
        appellation: f.appellation,
        rating: f.rating,
        style: f.style,
        search_rank,
        avg_price: f.avg_price,
        scraped_at: Utc::now(),
    })
}

/// Work one detail URL: load, extract the fixed field set, optionally pull
/// the analytics rank, emit iff the name resolved. A navigation failure
/// abandons this URL only; the run continues.
pub async fn assemble(
    session: &BrowserSession,
    url: &str,
    config: &RunConfig,
    sink: &mut DatasetSink,
) -> anyhow::Result<RecordOutcome> {
    let doc = match session.load(url).await {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Skipping {}: {}", url, e);
            return Ok(RecordOutcome::Skipped(SkipReason::NavigationFailed));
        }
    };

    let fieldset = extract_fields(&doc);

    let search_rank = if fieldset.name.is_some() && config.include_analytics {
        open_analytics(session, &doc.body_text).await
    } else {
        None
    };

    match finish_record(url, fieldset, search_rank) {
        Some(record) => {
            sink.emit(&record)?;
            info!("Saved: {}", record.name);
            Ok(RecordOutcome::Assembled(record))
        }
        None => {
            warn!("Could not extract data from {}", url);
            Ok(RecordOutcome::Skipped(SkipReason::NameMissing))
        }
    }
}

/// Activate the analytics tab and scan its text for a search rank. Any
/// failure along the way just means the record goes out without a rank.
async fn open_analytics(session: &BrowserSession, pre_click_text: &str) -> Option<u32> {
    let clicked = session.click_any(ANALYTICS_TAB_SELECTORS).await
        || session.click_text("button", "Analytics").await;
    if !clicked {
        debug!("No analytics affordance on this page");
        return None;
    }

    sleep(ANALYTICS_SETTLE).await;

    // Wait for the panel to actually swap content in before scanning; the
    // settle delay alone races client-side rendering on slow pages.
    let deadline = Instant::now() + ANALYTICS_CONTENT_WAIT;
    let mut text = session.body_text().await;
    while text == pre_click_text && fields::scan_search_rank(&text).is_none() {
        if Instant::now() >= deadline {
            break;
        }
        sleep(ANALYTICS_CONTENT_POLL).await;
        text = session.body_text().await;
    }

    let rank = fields::scan_search_rank(&text);
    if rank.is_none() {
        warn!("Could not extract analytics rank");
    }
    rank
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> LoadedDocument {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        LoadedDocument::from_html("https://www.wine-searcher.com/find/test", html)
    }

    #[test]
    fn name_only_page_still_yields_a_record() {
        let doc = fixture("detail_basic");
        let fieldset = extract_fields(&doc);
        let record = finish_record(&doc.url, fieldset, None).unwrap();
        assert_eq!(record.name, "Château Test 2015");
        assert_eq!(record.rating, None);
        assert_eq!(record.search_rank, None);
    }

    #[test]
    fn missing_name_invalidates_the_whole_record() {
        let doc = LoadedDocument::from_html(
            "https://www.wine-searcher.com/find/test",
            "<html><body><span class=\"critic-score\">95/100</span></body></html>",
        );
        let fieldset = extract_fields(&doc);
        assert_eq!(fieldset.rating, Some(95));
        assert!(finish_record(&doc.url, fieldset, None).is_none());
    }

    #[test]
    fn full_page_populates_every_field() {
        let doc = fixture("detail_full");
        let fieldset = extract_fields(&doc);
        let record = finish_record(&doc.url, fieldset, Some(12)).unwrap();
        assert_eq!(record.name, "Château Margaux 2015");
        assert_eq!(record.appellation.as_deref(), Some("Margaux, Bordeaux"));
        assert_eq!(record.rating, Some(97));
        assert_eq!(record.style.as_deref(), Some("Savory and Classic Red"));
        assert_eq!(record.avg_price.as_deref(), Some("$645.00"));
        assert_eq!(record.search_rank, Some(12));
    }
}
