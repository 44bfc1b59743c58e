use anyhow::{bail, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use rand::Rng;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::PlaybackDriver;
use crate::cancel::CancelToken;
use crate::config::PlaybackConfig;
use crate::retry::retry_with_backoff;

/// How often the playback loop re-checks the deadline and sweeps dialogs.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for search results to render.
const RESULTS_TIMEOUT: Duration = Duration::from_secs(20);

/// Clicks away consent/interstitial dialogs by their visible button labels.
/// Returns the number of buttons clicked.
const DISMISS_DIALOGS_JS: &str = r#"
    (() => {
        const labels = ['No thanks', 'Accept all', 'Accept', 'I agree', 'Dismiss'];
        let clicked = 0;
        for (const button of document.querySelectorAll('button')) {
            const text = (button.textContent || '').trim();
            if (labels.some(l => text.includes(l))) {
                try { button.click(); clicked++; } catch (_) {}
            }
        }
        return clicked;
    })()
"#;

/// Drives a visible Chromium instance against the configured video site.
pub struct BrowserDriver {
    browser: Mutex<Browser>,
    _handler_task: JoinHandle<()>,
    config: PlaybackConfig,
}

impl BrowserDriver {
    /// Launch the browser. A failure here is a setup failure: the caller
    /// aborts the whole session rather than running a capture with nothing
    /// playing.
    pub async fn launch(config: PlaybackConfig) -> Result<Self> {
        info!("Launching browser for {}", config.site_url);

        let browser_config = BrowserConfig::builder()
            .with_head()
            .window_size(1920, 1080)
            .build()
            .map_err(anyhow::Error::msg)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;

        // The handler future must be polled for the CDP connection to make
        // progress; it ends when the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            _handler_task: handler_task,
            config,
        })
    }

    async fn open_site(&self, browser: &Browser) -> Result<Page> {
        let url = self.config.site_url.clone();
        let wait = Duration::from_secs(self.config.load_retry_wait_secs);

        let page = retry_with_backoff("Page load", self.config.load_retries, wait, || {
            let url = url.clone();
            async move {
                let page = browser.new_page(url).await?;
                Ok(page)
            }
        })
        .await?;

        // Best effort; some sites never settle.
        let _ = page.wait_for_navigation().await;
        Ok(page)
    }

    async fn dismiss_dialogs(&self, page: &Page) {
        match page.evaluate(DISMISS_DIALOGS_JS).await {
            Ok(result) => {
                let clicked = result
                    .value()
                    .and_then(serde_json::Value::as_i64)
                    .unwrap_or(0);
                if clicked > 0 {
                    info!("Dismissed {} dialog button(s)", clicked);
                }
            }
            Err(e) => warn!("Dialog sweep failed: {}", e),
        }
    }

    async fn search(&self, page: &Page, query: &str) -> Result<()> {
        info!("Searching for: {}", query);

        let search_box = page
            .find_element("input#search, input[name='search_query']")
            .await
            .context("Search input not found")?;

        search_box
            .click()
            .await
            .context("Failed to focus search input")?;
        search_box
            .type_str(query)
            .await
            .context("Failed to type search query")?;
        search_box
            .press_key("Enter")
            .await
            .context("Failed to submit search")?;

        Ok(())
    }

    /// Wait for result links, then click one picked uniformly at random.
    async fn pick_random_result(&self, page: &Page, cancel: &CancelToken) -> Result<()> {
        let deadline = Instant::now() + RESULTS_TIMEOUT;

        let results = loop {
            if cancel.is_cancelled() {
                bail!("Cancelled while waiting for search results");
            }

            let found = page
                .find_elements("a#video-title")
                .await
                .unwrap_or_default();
            if !found.is_empty() {
                break found;
            }
            if Instant::now() >= deadline {
                bail!("No search results appeared within {:?}", RESULTS_TIMEOUT);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        };

        let index = rand::thread_rng().gen_range(0..results.len());
        info!("Selecting result {} of {}", index + 1, results.len());

        results[index]
            .click()
            .await
            .context("Failed to click selected result")?;
        Ok(())
    }

    async fn try_fullscreen(&self, page: &Page) {
        // Fullscreen gives a cleaner recording; failing to find or click the
        // button is not an error.
        match page.find_element("button.ytp-fullscreen-button").await {
            Ok(button) => {
                if let Err(e) = button.click().await {
                    warn!("Fullscreen button not clickable: {}", e);
                }
            }
            Err(e) => warn!("Fullscreen button not found: {}", e),
        }
    }
}

impl BrowserDriver {
    /// The playback body: navigate, search, click a result and hold until
    /// the deadline or the token.
    async fn drive(
        &self,
        browser: &Browser,
        query: &str,
        duration: Duration,
        cancel: &CancelToken,
    ) -> Result<()> {
        let start = Instant::now();

        let page = self.open_site(browser).await?;
        self.dismiss_dialogs(&page).await;

        self.search(&page, query).await?;
        self.pick_random_result(&page, cancel).await?;
        self.try_fullscreen(&page).await;

        info!("Playback started; holding for {:.0}s", duration.as_secs_f64());
        while start.elapsed() < duration && !cancel.is_cancelled() {
            self.dismiss_dialogs(&page).await;
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Ok(())
    }
}

/// Await the playback body, then run the shutdown step on both the success
/// and the error path, preserving the body's result. An abandoned browser
/// window would keep being screen-recorded for the rest of the session.
async fn with_shutdown<T, B, S, Fut>(body: B, shutdown: S) -> Result<T>
where
    B: std::future::Future<Output = Result<T>>,
    S: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let result = body.await;
    shutdown().await;
    result
}

#[async_trait::async_trait]
impl PlaybackDriver for BrowserDriver {
    async fn play(&self, query: &str, duration: Duration, cancel: CancelToken) -> Result<()> {
        with_shutdown(
            async {
                let browser = self.browser.lock().await;
                self.drive(&browser, query, duration, &cancel).await
            },
            || async {
                info!("Playback finished; closing browser");
                let mut browser = self.browser.lock().await;
                if let Err(e) = browser.close().await {
                    warn!("Browser close failed: {}", e);
                }
                let _ = browser.wait().await;
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn shutdown_runs_after_success() {
        let closed = AtomicBool::new(false);

        let result = with_shutdown(async { Ok(42) }, || async {
            closed.store(true, Ordering::SeqCst);
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_runs_when_body_fails() {
        let closed = AtomicBool::new(false);

        let result: Result<()> = with_shutdown(async { bail!("navigation failed") }, || async {
            closed.store(true, Ordering::SeqCst);
        })
        .await;

        assert!(result.is_err());
        assert!(closed.load(Ordering::SeqCst), "browser must close on the error path");
    }
}
