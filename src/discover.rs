use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::Selector;
use tracing::{info, warn};
use url::Url;

use crate::document::LoadedDocument;

const SITE_ORIGIN: &str = "https://www.wine-searcher.com";
const DETAIL_PATH_MARKER: &str = "/find/";
const FALLBACK_KEYWORD: &str = "wine";
const FALLBACK_LOG_LIMIT: usize = 5;

static DETAIL_ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/find/"]"#).unwrap());
static ALL_ANCHORS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Deduplicated detail-page URLs in first-seen order.
#[derive(Debug, Default)]
pub struct LinkSet {
    urls: Vec<String>,
    seen: HashSet<String>,
}

impl LinkSet {
    pub fn insert(&mut self, url: String) {
        if self.seen.insert(url.clone()) {
            self.urls.push(url);
        }
    }

    /// Keep at most `max` links; `max = 0` means unbounded.
    pub fn truncate(&mut self, max: usize) {
        if max > 0 && self.urls.len() > max {
            self.urls.truncate(max);
        }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }
}

/// Collect detail-page links from a listing document.
///
/// Primary heuristic: anchors whose href carries the `/find/` path marker,
/// resolved absolute against the site origin. If that yields nothing, a
/// broad scan of every anchor is logged for diagnosis but its candidates
/// are not merged into the result.
pub fn discover(doc: &LoadedDocument) -> LinkSet {
    let dom = doc.dom();
    let mut links = LinkSet::default();

    for anchor in dom.select(&DETAIL_ANCHORS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.contains(DETAIL_PATH_MARKER) {
            continue;
        }
        if let Some(absolute) = resolve(href) {
            links.insert(absolute);
        }
    }

    info!("Found {} wine links", links.len());

    if links.is_empty() {
        log_broad_scan(doc);
    }

    links
}

fn resolve(href: &str) -> Option<String> {
    static ORIGIN: LazyLock<Url> = LazyLock::new(|| Url::parse(SITE_ORIGIN).unwrap());
    ORIGIN.join(href).ok().map(String::from)
}

/// Diagnostic-only fallback: when the primary heuristic comes up empty,
/// surface what the page does link to so a template change is visible in
/// the logs. Candidates are deliberately not promoted into the LinkSet.
fn log_broad_scan(doc: &LoadedDocument) {
    let dom = doc.dom();
    let candidates: Vec<String> = dom
        .select(&ALL_ANCHORS)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let text: String = anchor.text().collect::<Vec<_>>().join(" ");
            let loose_match = href.to_lowercase().contains(FALLBACK_KEYWORD)
                || text.to_lowercase().contains(FALLBACK_KEYWORD);
            loose_match.then(|| href.to_string())
        })
        .collect();

    if candidates.is_empty() {
        warn!("No wine links found and broad scan produced no candidates");
        return;
    }

    warn!(
        "No wine links via {} marker; broad scan found {} loose candidates (showing {}): {:?}",
        DETAIL_PATH_MARKER,
        candidates.len(),
        candidates.len().min(FALLBACK_LOG_LIMIT),
        &candidates[..candidates.len().min(FALLBACK_LOG_LIMIT)]
    );
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(html: &str) -> LoadedDocument {
        LoadedDocument::from_html("https://www.wine-searcher.com/merchant/test", html)
    }

    #[test]
    fn duplicate_anchors_dedupe_in_first_seen_order() {
        let doc = listing(
            r#"<html><body>
            <a href="/find/wine-a">Wine A</a>
            <a href="/find/wine-b">Wine B</a>
            <a href="/find/wine-a">Wine A again</a>
            </body></html>"#,
        );
        let links = discover(&doc);
        let urls: Vec<&str> = links.iter().collect();
        assert_eq!(
            urls,
            vec![
                "https://www.wine-searcher.com/find/wine-a",
                "https://www.wine-searcher.com/find/wine-b",
            ]
        );
    }

    #[test]
    fn absolute_hrefs_pass_through_unchanged() {
        let doc = listing(
            r#"<html><body>
            <a href="https://www.wine-searcher.com/find/wine-c">Wine C</a>
            </body></html>"#,
        );
        let links = discover(&doc);
        assert_eq!(
            links.iter().collect::<Vec<_>>(),
            vec!["https://www.wine-searcher.com/find/wine-c"]
        );
    }

    #[test]
    fn unrelated_anchors_are_ignored() {
        let doc = listing(
            r#"<html><body>
            <a href="/merchant/other">Other merchant</a>
            <a href="/find/wine-a">Wine A</a>
            <a href="/regions/bordeaux">Bordeaux</a>
            </body></html>"#,
        );
        assert_eq!(discover(&doc).len(), 1);
    }

    #[test]
    fn broad_scan_does_not_populate_the_link_set() {
        let doc = listing(
            r#"<html><body>
            <a href="/wines/red">Red wines</a>
            <a href="/about">About our wine shop</a>
            </body></html>"#,
        );
        let links = discover(&doc);
        assert!(links.is_empty());
    }

    #[test]
    fn truncate_keeps_min_of_cap_and_count() {
        let mut links = LinkSet::default();
        for i in 0..10 {
            links.insert(format!("https://www.wine-searcher.com/find/wine-{i}"));
        }
        links.truncate(2);
        assert_eq!(links.len(), 2);

        let mut unbounded = LinkSet::default();
        for i in 0..3 {
            unbounded.insert(format!("https://www.wine-searcher.com/find/wine-{i}"));
        }
        unbounded.truncate(0);
        assert_eq!(unbounded.len(), 3);

        let mut short = LinkSet::default();
        short.insert("https://www.wine-searcher.com/find/wine-a".to_string());
        short.truncate(5);
        assert_eq!(short.len(), 1);
    }
}
