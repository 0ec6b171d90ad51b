pub mod fields;

use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::document::LoadedDocument;

/// Semantic check applied to a candidate value. Returns the accepted
/// (trimmed, possibly normalized) value, or `None` to reject.
pub type Accept = fn(&str) -> Option<String>;

/// One extraction attempt for a field. Stateless; safe to re-run against
/// the same snapshot.
pub enum LookupStrategy {
    /// Take the first element matching each selector, broad to narrow.
    /// A rejected value moves on to the next selector, not the next element.
    SelectorFirst {
        selectors: Vec<scraper::Selector>,
        accept: Accept,
    },
    /// Walk every element matching each selector in document order and
    /// keep the first accepted value.
    SelectorScan {
        selectors: Vec<scraper::Selector>,
        accept: Accept,
    },
    /// Ordered regex scan over the visible body text, most specific first.
    BodyPatterns { patterns: Vec<Regex>, accept: Accept },
}

/// Ordered fallback cascade for one output field.
pub struct FieldSpec {
    pub field: &'static str,
    pub strategies: Vec<LookupStrategy>,
}

/// Run the cascade. First strategy producing an accepted value wins; if
/// none do, the field is unknown (`None`). Never an error.
pub fn extract(doc: &LoadedDocument, spec: &FieldSpec) -> Option<String> {
    let dom = doc.dom();
    for (i, strategy) in spec.strategies.iter().enumerate() {
        if let Some(value) = apply(&dom, &doc.body_text, strategy) {
            debug!(field = spec.field, strategy = i, %value, "field resolved");
            return Some(value);
        }
    }
    debug!(field = spec.field, "field unknown");
    None
}

fn apply(dom: &Html, body_text: &str, strategy: &LookupStrategy) -> Option<String> {
    match strategy {
        LookupStrategy::SelectorFirst { selectors, accept } => selectors.iter().find_map(|sel| {
            let el = dom.select(sel).next()?;
            accept(&element_text(&el))
        }),
        LookupStrategy::SelectorScan { selectors, accept } => selectors
            .iter()
            .find_map(|sel| dom.select(sel).find_map(|el| accept(&element_text(&el)))),
        LookupStrategy::BodyPatterns { patterns, accept } => {
            scan_patterns(body_text, patterns, *accept)
        }
    }
}

/// Scan `text` against an ordered pattern list and validate the first
/// structural match. Shared with the analytics rank extraction, which runs
/// against post-click body text rather than a full document.
pub fn scan_patterns(text: &str, patterns: &[Regex], accept: Accept) -> Option<String> {
    patterns.iter().find_map(|re| {
        let caps = re.captures(text)?;
        let m = caps.get(1).or_else(|| caps.get(0))?;
        accept(m.as_str())
    })
}

fn element_text(el: &ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
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
    fn full_detail_page_resolves_every_field() {
        let doc = fixture("detail_full");
        assert_eq!(
            extract(&doc, &fields::NAME).as_deref(),
            Some("Château Margaux 2015")
        );
        assert_eq!(
            extract(&doc, &fields::APPELLATION).as_deref(),
            Some("Margaux, Bordeaux")
        );
        assert_eq!(extract(&doc, &fields::RATING).as_deref(), Some("97"));
        assert_eq!(
            extract(&doc, &fields::STYLE).as_deref(),
            Some("Savory and Classic Red")
        );
        assert_eq!(extract(&doc, &fields::AVG_PRICE).as_deref(), Some("$645.00"));
    }

    #[test]
    fn missing_markup_yields_unknown_not_error() {
        let doc = fixture("detail_basic");
        assert_eq!(
            extract(&doc, &fields::NAME).as_deref(),
            Some("Château Test 2015")
        );
        assert_eq!(extract(&doc, &fields::RATING), None);
        assert_eq!(extract(&doc, &fields::AVG_PRICE), None);
    }

    #[test]
    fn rating_falls_back_to_body_text() {
        // No selector-matching element anywhere; "Critic Score: 93" in prose.
        let doc = fixture("detail_text_only");
        assert_eq!(extract(&doc, &fields::RATING).as_deref(), Some("93"));
        assert_eq!(extract(&doc, &fields::AVG_PRICE).as_deref(), Some("$32.50"));
    }

    #[test]
    fn extraction_is_idempotent_on_a_snapshot() {
        let doc = fixture("detail_full");
        let first: Vec<Option<String>> = [
            &fields::NAME,
            &fields::APPELLATION,
            &fields::RATING,
            &fields::STYLE,
            &fields::AVG_PRICE,
        ]
        .iter()
        .map(|spec| extract(&doc, spec))
        .collect();
        let second: Vec<Option<String>> = [
            &fields::NAME,
            &fields::APPELLATION,
            &fields::RATING,
            &fields::STYLE,
            &fields::AVG_PRICE,
        ]
        .iter()
        .map(|spec| extract(&doc, spec))
        .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn rating_outside_range_is_rejected() {
        let doc = LoadedDocument::from_html(
            "https://www.wine-searcher.com/find/test",
            "<html><body><span class=\"critic-score\">12/100</span>\
             <p>Rating: 101/100</p></body></html>",
        );
        assert_eq!(extract(&doc, &fields::RATING), None);
    }

    #[test]
    fn style_label_boilerplate_is_rejected() {
        // An element whose class matches but whose text is the literal label.
        let doc = LoadedDocument::from_html(
            "https://www.wine-searcher.com/find/test",
            "<html><body><div class=\"wine-style\">Style</div>\
             <p>Style: Rich and Intense White</p></body></html>",
        );
        assert_eq!(
            extract(&doc, &fields::STYLE).as_deref(),
            Some("Rich and Intense White")
        );
    }

    #[test]
    fn search_rank_scans_post_click_text() {
        assert_eq!(
            fields::scan_search_rank("Analytics\nSearch Rank: #17 this month"),
            Some(17)
        );
        assert_eq!(fields::scan_search_rank("#4 last month"), Some(4));
        assert_eq!(fields::scan_search_rank("no rank info here"), None);
    }
}
