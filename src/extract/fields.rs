//! Field cascades for wine detail pages.
//!
//! The merchant sub-sites share one template family but markup and class
//! names drift between them, so every field is an ordered cascade of
//! independent lookups rather than a single selector.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;

use super::{scan_patterns, FieldSpec, LookupStrategy};

const RATING_MIN: u32 = 50;
const RATING_MAX: u32 = 100;

static RATING_NUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2,3})(?:/100)?").unwrap());
static PRICE_NUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\$€£]?\s*\d+(?:[.,]\d{2})?").unwrap());

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
}

fn patterns(list: &[&str]) -> Vec<Regex> {
    list.iter().map(|p| Regex::new(p).unwrap()).collect()
}

fn accept_name(text: &str) -> Option<String> {
    let t = text.trim();
    (t.chars().count() > 2).then(|| t.to_string())
}

fn accept_nonempty(text: &str) -> Option<String> {
    let t = text.trim();
    (!t.is_empty()).then(|| t.to_string())
}

/// Reject the literal column label a template sometimes renders where the
/// value belongs.
fn accept_style(text: &str) -> Option<String> {
    let t = text.trim();
    (!t.is_empty() && !t.to_lowercase().contains("style")).then(|| t.to_string())
}

/// Ratings are critic scores out of 100; anything outside [50, 100] is a
/// mismatched number (vintage year, bottle size), not a score.
fn accept_rating(text: &str) -> Option<String> {
    let caps = RATING_NUM_RE.captures(text)?;
    let n: u32 = caps.get(1)?.as_str().parse().ok()?;
    (RATING_MIN..=RATING_MAX).contains(&n).then(|| n.to_string())
}

fn accept_price(text: &str) -> Option<String> {
    let t = text.trim();
    PRICE_NUM_RE.is_match(t).then(|| t.to_string())
}

fn accept_rank(text: &str) -> Option<String> {
    let n: u32 = text.trim().parse().ok()?;
    Some(n.to_string())
}

pub static NAME: LazyLock<FieldSpec> = LazyLock::new(|| FieldSpec {
    field: "name",
    strategies: vec![LookupStrategy::SelectorFirst {
        selectors: selectors(&[
            "h1.wine-name",
            r#"h1[class*="wine"]"#,
            "h1",
            ".wine-name",
            r#"[data-testid="wine-name"]"#,
            ".header-name",
        ]),
        accept: accept_name,
    }],
});

pub static APPELLATION: LazyLock<FieldSpec> = LazyLock::new(|| FieldSpec {
    field: "appellation",
    strategies: vec![LookupStrategy::SelectorFirst {
        selectors: selectors(&[
            r#"[class*="appellation"]"#,
            r#"[data-testid="appellation"]"#,
            ".wine-appellation",
            r#"a[href*="/regions/"]"#,
        ]),
        accept: accept_nonempty,
    }],
});

pub static RATING: LazyLock<FieldSpec> = LazyLock::new(|| FieldSpec {
    field: "rating",
    strategies: vec![
        // Score elements are often duplicated per critic; scan all of them
        // for the first in-range number.
        LookupStrategy::SelectorScan {
            selectors: selectors(&[
                r#"[class*="rating"]"#,
                r#"[class*="score"]"#,
                ".critic-score",
                r#"[data-testid="rating"]"#,
            ]),
            accept: accept_rating,
        },
        LookupStrategy::BodyPatterns {
            patterns: patterns(&[
                r"(?i)Critic Score[:\s]*(\d{2,3})",
                r"(?i)Rating[:\s]*(\d{2,3})/100",
                r"(\d{2,3})/100",
            ]),
            accept: accept_rating,
        },
    ],
});

pub static STYLE: LazyLock<FieldSpec> = LazyLock::new(|| FieldSpec {
    field: "style",
    strategies: vec![
        LookupStrategy::SelectorFirst {
            selectors: selectors(&[
                r#"[class*="style"]"#,
                ".wine-style",
                r#"[data-testid="style"]"#,
            ]),
            accept: accept_style,
        },
        LookupStrategy::BodyPatterns {
            patterns: patterns(&[
                r"(?i)Style[:\s]*([A-Za-z\s,]+(?:Red|White|Rosé|Sparkling|Dessert)[A-Za-z\s,]*)",
            ]),
            accept: accept_style,
        },
    ],
});

pub static AVG_PRICE: LazyLock<FieldSpec> = LazyLock::new(|| FieldSpec {
    field: "avg_price",
    strategies: vec![
        LookupStrategy::SelectorScan {
            selectors: selectors(&[
                r#"[class*="price"]"#,
                r#"[class*="avg"]"#,
                ".average-price",
                r#"[data-testid="price"]"#,
            ]),
            accept: accept_price,
        },
        LookupStrategy::BodyPatterns {
            patterns: patterns(&[
                r"(?i)Avg\.?\s*Price[:\s]*([\$€£]?\s*\d+(?:[.,]\d{2})?)",
                r"(?i)Average[:\s]*([\$€£]\s*\d+(?:[.,]\d{2})?)",
            ]),
            accept: accept_price,
        },
    ],
});

static RANK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    patterns(&[
        r"(?i)Search Rank[:\s]*#?(\d+)",
        r"(?i)Rank[:\s]*#?(\d+)",
        r"(?i)#(\d+)\s*(?:this month|last month)",
    ])
});

/// Scan analytics-panel text for the merchant search rank. Runs against
/// body text captured after the analytics tab was activated.
pub fn scan_search_rank(body_text: &str) -> Option<u32> {
    scan_patterns(body_text, &RANK_PATTERNS, accept_rank).and_then(|v| v.parse().ok())
}
