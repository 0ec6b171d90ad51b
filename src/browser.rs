use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::document::LoadedDocument;
use crate::error::ScrapeError;

const NAV_TIMEOUT: Duration = Duration::from_secs(60);
const DOM_READY_TIMEOUT: Duration = Duration::from_secs(15);
const DOM_READY_POLL: Duration = Duration::from_millis(250);
const SETTLE_DELAY: Duration = Duration::from_secs(2);
const MAX_NAV_RETRIES: u32 = 3;
const NAV_BACKOFF_STEP: Duration = Duration::from_secs(2);
const CHALLENGE_COOLDOWN: Duration = Duration::from_secs(10);
const CHALLENGE_RECHECK_WINDOW: Duration = Duration::from_secs(30);
const CHALLENGE_RECHECK_POLL: Duration = Duration::from_secs(2);
const SNAPSHOT_RETRY_DELAYS_MS: &[u64] = &[200, 500, 1200];
const DIAGNOSTIC_SNIPPET_LEN: usize = 600;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const CHALLENGE_MARKERS: &[&str] = &[
    "checking your browser",
    "verify you are human",
    "captcha",
    "just a moment",
];

const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', {get: () => undefined});
Object.defineProperty(navigator, 'plugins', {get: () => [1, 2, 3, 4, 5]});
"#;

/// True when the rendered body text carries a known anti-bot interstitial
/// marker. Recomputed per load; never persisted.
pub fn challenge_present(body_text: &str) -> bool {
    let lower = body_text.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| lower.contains(m))
}

#[derive(Debug)]
enum NavAttempt {
    Timeout(String),
    Fatal(String),
}

/// One headless Chromium session, shared by the whole run. Owns every
/// timing and retry decision the pipeline makes against the network.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(proxy: Option<&str>) -> Result<Self> {
        let mut args = vec![
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-dev-shm-usage".to_string(),
            format!("--user-agent={USER_AGENT}"),
            "--lang=en-US".to_string(),
        ];
        if let Some(proxy) = proxy {
            args.push(format!("--proxy-server={proxy}"));
        }

        let config = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .request_timeout(NAV_TIMEOUT)
            .args(args)
            .build()
            .map_err(|e| anyhow!("browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch browser")?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open page")?;
        let stealth = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(STEALTH_SCRIPT)
            .build()
            .map_err(|e| anyhow!("stealth script: {e}"))?;
        page.execute(stealth)
            .await
            .context("failed to install stealth script")?;

        info!("Browser session ready (proxy: {})", proxy.unwrap_or("none"));
        Ok(BrowserSession {
            browser,
            page,
            handler_task,
        })
    }

    /// Navigate to `url` and return a settled snapshot of the page.
    ///
    /// The outer navigation is retried with linear backoff for
    /// timeout-class failures only; connection-level failures propagate
    /// immediately. The wait/settle/challenge phase is never retried. A
    /// persistent challenge page is returned as-is rather than failing the
    /// load: downstream extraction will simply find nothing.
    pub async fn load(&self, url: &str) -> Result<LoadedDocument, ScrapeError> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.navigate(url).await {
                Ok(()) => break,
                Err(NavAttempt::Timeout(msg)) if attempts <= MAX_NAV_RETRIES => {
                    let backoff = NAV_BACKOFF_STEP * attempts;
                    warn!(
                        "Timeout loading {} (attempt {}/{}), backing off {}s: {}",
                        url,
                        attempts,
                        MAX_NAV_RETRIES + 1,
                        backoff.as_secs(),
                        msg
                    );
                    sleep(backoff).await;
                }
                Err(failure) => {
                    self.log_diagnostic_snapshot(url).await;
                    let message = match failure {
                        NavAttempt::Timeout(m) => format!("timed out: {m}"),
                        NavAttempt::Fatal(m) => m,
                    };
                    return Err(ScrapeError::Navigation {
                        url: url.to_string(),
                        attempts,
                        message,
                    });
                }
            }
        }

        self.wait_dom_ready().await;
        sleep(SETTLE_DELAY).await;

        let mut body_text = self.body_text().await;
        if challenge_present(&body_text) {
            body_text = self.ride_out_challenge(url).await;
        }

        let html = self.html_snapshot().await.unwrap_or_default();
        Ok(LoadedDocument::new(url, html, body_text))
    }

    async fn navigate(&self, url: &str) -> Result<(), NavAttempt> {
        match timeout(NAV_TIMEOUT, self.page.goto(url)).await {
            Err(_) => Err(NavAttempt::Timeout(format!(
                "no response within {}s",
                NAV_TIMEOUT.as_secs()
            ))),
            Ok(Err(e)) => {
                let msg = e.to_string();
                if msg.to_lowercase().contains("timeout") {
                    Err(NavAttempt::Timeout(msg))
                } else {
                    Err(NavAttempt::Fatal(msg))
                }
            }
            Ok(Ok(_)) => Ok(()),
        }
    }

    /// Wait for the DOM to be built. Deliberately not network-idle: the
    /// site keeps polling endpoints alive indefinitely, so network idle
    /// never arrives on some pages.
    async fn wait_dom_ready(&self) {
        let deadline = Instant::now() + DOM_READY_TIMEOUT;
        loop {
            let state: Option<String> = self
                .page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.into_value().ok());
            if matches!(state.as_deref(), Some("interactive") | Some("complete")) {
                return;
            }
            if Instant::now() >= deadline {
                warn!(
                    "DOM not ready within {}s, proceeding anyway",
                    DOM_READY_TIMEOUT.as_secs()
                );
                return;
            }
            sleep(DOM_READY_POLL).await;
        }
    }

    async fn ride_out_challenge(&self, url: &str) -> String {
        warn!(
            "Detected anti-bot challenge on {}, cooling down {}s",
            url,
            CHALLENGE_COOLDOWN.as_secs()
        );
        sleep(CHALLENGE_COOLDOWN).await;

        // One fresh navigation after the cooldown; challenges frequently
        // clear on reload once the cooldown has passed.
        if matches!(timeout(NAV_TIMEOUT, self.page.goto(url)).await, Ok(Ok(_))) {
            self.wait_dom_ready().await;
            sleep(SETTLE_DELAY).await;
        }

        let deadline = Instant::now() + CHALLENGE_RECHECK_WINDOW;
        loop {
            let text = self.body_text().await;
            if !challenge_present(&text) {
                info!("Challenge cleared on {}", url);
                return text;
            }
            if Instant::now() >= deadline {
                warn!(
                    "Challenge still present on {} after {}s; continuing with the page as-is",
                    url,
                    CHALLENGE_RECHECK_WINDOW.as_secs()
                );
                return text;
            }
            sleep(CHALLENGE_RECHECK_POLL).await;
        }
    }

    /// Rendered body text of the current page.
    pub async fn body_text(&self) -> String {
        self.page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
            .ok()
            .and_then(|v| v.into_value::<String>().ok())
            .unwrap_or_default()
    }

    /// Outer HTML of the current page. JS snapshot first; `Page::content`
    /// with short retries as fallback, since the CDP transport gets
    /// fragile right after challenge pages.
    async fn html_snapshot(&self) -> Option<String> {
        if let Ok(val) = self.page.evaluate("document.documentElement.outerHTML").await {
            if let Ok(html) = val.into_value::<String>() {
                if !html.is_empty() {
                    return Some(html);
                }
            }
        }
        for delay_ms in SNAPSHOT_RETRY_DELAYS_MS {
            match self.page.content().await {
                Ok(html) => return Some(html),
                Err(e) => {
                    debug!("page content snapshot failed: {}", e);
                    sleep(Duration::from_millis(*delay_ms)).await;
                }
            }
        }
        None
    }

    async fn log_diagnostic_snapshot(&self, url: &str) {
        if let Some(html) = self.html_snapshot().await {
            let snippet: String = html.chars().take(DIAGNOSTIC_SNIPPET_LEN).collect();
            debug!("Last rendered content before giving up on {}: {}", url, snippet);
        }
    }

    /// Click the first element matching any of the selector candidates.
    pub async fn click_any(&self, selectors: &[&str]) -> bool {
        for sel in selectors {
            if let Ok(el) = self.page.find_element(*sel).await {
                if el.click().await.is_ok() {
                    debug!("Clicked {}", sel);
                    return true;
                }
            }
        }
        false
    }

    /// Click the first `tag` element whose rendered text contains `needle`.
    pub async fn click_text(&self, tag: &str, needle: &str) -> bool {
        let Ok(elements) = self.page.find_elements(tag).await else {
            return false;
        };
        for el in elements {
            let text = el.inner_text().await.ok().flatten().unwrap_or_default();
            if text.contains(needle) {
                return el.click().await.is_ok();
            }
        }
        false
    }

    /// Close the session. Called on every exit path of a run.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_markers_detected_case_insensitively() {
        assert!(challenge_present("Checking your browser before accessing"));
        assert!(challenge_present("Please VERIFY YOU ARE HUMAN to continue"));
        assert!(challenge_present("Complete the CAPTCHA below"));
        assert!(challenge_present("Just a moment..."));
    }

    #[test]
    fn ordinary_content_is_clean() {
        assert!(!challenge_present(
            "Château Margaux 2015\nMargaux, Bordeaux\nCritic Score: 97"
        ));
        assert!(!challenge_present(""));
    }
}
