//! Chrome DevTools Protocol driver built on chromiumoxide

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{DriverError, PageDriver};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

impl From<CdpError> for DriverError {
    fn from(err: CdpError) -> Self {
        DriverError::Protocol(err.to_string())
    }
}

/// A single Chromium page driven over CDP
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumDriver {
    /// Launch a browser and open a blank page
    #[instrument]
    pub async fn launch(headless: bool) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder();
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        info!("Browser launched");

        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    async fn poll_for(&self, selector: &str) -> bool {
        self.page
            .find_elements(selector)
            .await
            .map(|elements| !elements.is_empty())
            .unwrap_or(false)
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn goto(&mut self, url: &str) -> Result<(), DriverError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn type_text(
        &mut self,
        selector: &str,
        text: &str,
        delay: Duration,
    ) -> Result<(), DriverError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::NotFound(selector.to_string()))?;
        element.click().await?;
        for ch in text.chars() {
            element.type_str(ch.to_string()).await?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), DriverError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::NotFound(selector.to_string()))?;
        element.click().await?;
        Ok(())
    }

    async fn press(&mut self, key: &str) -> Result<(), DriverError> {
        let focused = self
            .page
            .find_element(":focus")
            .await
            .map_err(|_| DriverError::NotFound(":focus".to_string()))?;
        focused.press_key(key).await?;
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        let timed_out = || DriverError::Timeout {
            selector: selector.to_string(),
            timeout,
        };

        let found = tokio::time::timeout(timeout, async {
            loop {
                if self.poll_for(selector).await {
                    return true;
                }
                if Instant::now() >= deadline {
                    return false;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await
        .map_err(|_| timed_out())?;

        if found { Ok(()) } else { Err(timed_out()) }
    }

    async fn exists(&mut self, selector: &str) -> Result<bool, DriverError> {
        let elements = self.page.find_elements(selector).await?;
        Ok(!elements.is_empty())
    }

    async fn inner_text(&mut self, selector: &str) -> Result<String, DriverError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::NotFound(selector.to_string()))?;
        Ok(element.inner_text().await?.unwrap_or_default())
    }

    async fn grouped_texts(
        &mut self,
        group_selector: &str,
        value_selector: &str,
    ) -> Result<Vec<Vec<String>>, DriverError> {
        let group = serde_json::to_string(group_selector)
            .map_err(|e| DriverError::Protocol(e.to_string()))?;
        let value = serde_json::to_string(value_selector)
            .map_err(|e| DriverError::Protocol(e.to_string()))?;
        let script = format!(
            "Array.from(document.querySelectorAll({group})).map(g => \
             Array.from(g.querySelectorAll({value})).map(v => v.innerText.trim()))"
        );

        self.page
            .evaluate(script)
            .await?
            .into_value::<Vec<Vec<String>>>()
            .map_err(|e| DriverError::Protocol(e.to_string()))
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> Result<(), DriverError> {
        let params = ScreenshotParams::builder().full_page(full_page).build();
        self.page.save_screenshot(params, path).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let browser = &mut self.browser;
        let shutdown = within(CLOSE_TIMEOUT, "browser shutdown", async {
            browser.close().await?;
            browser.wait().await?;
            Ok::<(), DriverError>(())
        })
        .await;

        if let Err(e) = &shutdown {
            warn!("Browser did not shut down cleanly, killing it: {}", e);
            if let Some(Err(kill_err)) = self.browser.kill().await {
                warn!("Failed to kill browser: {}", kill_err);
            }
        } else {
            info!("Browser closed");
        }
        self.handler.abort();
        shutdown
    }
}

/// Run `operation`, failing with a timeout for `what` once `bound` expires
async fn within<F>(bound: Duration, what: &str, operation: F) -> Result<(), DriverError>
where
    F: Future<Output = Result<(), DriverError>>,
{
    tokio::time::timeout(bound, operation)
        .await
        .map_err(|_| DriverError::Timeout {
            selector: what.to_string(),
            timeout: bound,
        })?
}
