use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// Static snapshot of a rendered page. All extraction runs against this,
/// never against the live browser tab, so every strategy is idempotent
/// for the duration of one record assembly.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub url: String,
    pub html: String,
    pub body_text: String,
}

impl LoadedDocument {
    pub fn new(url: impl Into<String>, html: String, body_text: String) -> Self {
        let url = url.into();
        let body_text = if body_text.trim().is_empty() {
            derive_body_text(&html)
        } else {
            body_text
        };
        LoadedDocument {
            url,
            html,
            body_text,
        }
    }

    /// Build a snapshot from raw HTML alone, deriving the visible text.
    /// Used when the browser cannot report `innerText`, and by tests.
    pub fn from_html(url: impl Into<String>, html: impl Into<String>) -> Self {
        let html = html.into();
        let body_text = derive_body_text(&html);
        LoadedDocument {
            url: url.into(),
            html,
            body_text,
        }
    }

    pub fn dom(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// Approximate `document.body.innerText` from an HTML snapshot: drop
/// script/style payloads, then join the body's text nodes line by line.
fn derive_body_text(html: &str) -> String {
    let cleaned = SCRIPT_RE.replace_all(html, "");
    let cleaned = STYLE_RE.replace_all(&cleaned, "");
    let dom = Html::parse_document(&cleaned);

    let Some(body) = dom.select(&BODY_SEL).next() else {
        return String::new();
    };

    body.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_text_skips_script_and_style() {
        let doc = LoadedDocument::from_html(
            "https://example.com",
            "<html><head><style>.a{color:red}</style></head>\
             <body><h1>Château Brane</h1><script>var x = 'Critic Score: 99';</script>\
             <p>Critic Score: 93</p></body></html>",
        );
        assert!(doc.body_text.contains("Château Brane"));
        assert!(doc.body_text.contains("Critic Score: 93"));
        assert!(!doc.body_text.contains("99"));
        assert!(!doc.body_text.contains("color:red"));
    }

    #[test]
    fn empty_runtime_text_falls_back_to_derivation() {
        let doc = LoadedDocument::new(
            "https://example.com",
            "<html><body><p>Pomerol</p></body></html>".to_string(),
            "   ".to_string(),
        );
        assert_eq!(doc.body_text, "Pomerol");
    }
}
