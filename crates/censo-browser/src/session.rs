use crate::actions::{visibility_script, BrowserActions};
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::DisposeBrowserContextParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One isolated page inside its own browser context.
///
/// Cookies and storage never leak between sessions. Call [`close`] when done;
/// a session dropped without closing disposes its context in the background.
/// Both teardown steps give up after the close timeout.
///
/// [`close`]: BrowserSession::close
pub struct BrowserSession {
    browser: Arc<Browser>,
    page: Option<Page>,
    context_id: Option<BrowserContextId>,
    close_timeout: Duration,
}

impl BrowserSession {
    pub(crate) fn new(
        browser: Arc<Browser>,
        page: Page,
        context_id: BrowserContextId,
        close_timeout: Duration,
    ) -> Self {
        Self {
            browser,
            page: Some(page),
            context_id: Some(context_id),
            close_timeout,
        }
    }

    /// Bound page close and context disposal by `timeout`
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Apply user agent, viewport and timezone overrides to the page
    pub(crate) async fn apply_fingerprint(&self, fingerprint: &FingerprintConfig) -> Result<()> {
        let page = self.page()?;

        page.execute(SetUserAgentOverrideParams::new(
            fingerprint.user_agent.clone(),
        ))
        .await?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(fingerprint.viewport_width),
            i64::from(fingerprint.viewport_height),
            1.0,
            false,
        ))
        .await?;
        page.execute(SetTimezoneOverrideParams::new(fingerprint.timezone.clone()))
            .await?;

        Ok(())
    }

    fn page(&self) -> Result<&Page> {
        self.page.as_ref().ok_or(BrowserError::SessionClosed)
    }

    /// Close the page and dispose of the browser context.
    pub async fn close(mut self) {
        teardown(
            Arc::clone(&self.browser),
            self.page.take(),
            self.context_id.take(),
            self.close_timeout,
        )
        .await;
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let value = self.evaluate(&visibility_script(selector)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn poll_visibility(
        &self,
        selector: &str,
        want_visible: bool,
        timeout: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.is_visible(selector).await? == want_visible {
                return Ok(());
            }

            if started.elapsed() >= timeout {
                let state = if want_visible { "visible" } else { "hidden" };
                return Err(BrowserError::timeout(
                    format!("waiting for {selector} to be {state}"),
                    started.elapsed(),
                ));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let page = self.page.take();
        let context_id = self.context_id.take();
        if page.is_none() && context_id.is_none() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        handle.spawn(teardown(
            Arc::clone(&self.browser),
            page,
            context_id,
            self.close_timeout,
        ));
    }
}

async fn teardown(
    browser: Arc<Browser>,
    page: Option<Page>,
    context_id: Option<BrowserContextId>,
    limit: Duration,
) {
    if let Some(page) = page {
        bounded("close page", limit, page.close()).await;
    }
    if let Some(context_id) = context_id {
        bounded(
            "dispose browser context",
            limit,
            browser.execute(DisposeBrowserContextParams::new(context_id)),
        )
        .await;
    }
}

/// Await a teardown step for at most `limit`. Returns true if it succeeded.
async fn bounded<T, E: Display>(
    what: &str,
    limit: Duration,
    step: impl Future<Output = std::result::Result<T, E>>,
) -> bool {
    match tokio::time::timeout(limit, step).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::debug!("Failed to {}: {}", what, e);
            false
        }
        Err(_) => {
            tracing::warn!("Gave up trying to {} after {:?}", what, limit);
            false
        }
    }
}

#[async_trait::async_trait]
impl BrowserActions for BrowserSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let page = self.page()?;
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::NavigationError(e.to_string())),
            Err(_) => Err(BrowserError::timeout(format!("navigating to {url}"), timeout)),
        }
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.poll_visibility(selector, true, timeout).await
    }

    async fn wait_for_hidden(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.poll_visibility(selector, false, timeout).await
    }

    async fn fill_field(&self, selector: &str, value: &str) -> Result<()> {
        let page = self.page()?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::SelectorNotFound(selector.to_string()))?;

        element.click().await?;
        element.type_str(value).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let page = self.page()?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::SelectorNotFound(selector.to_string()))?;

        element.click().await?;
        Ok(())
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let page = self.page()?;
        match page.find_element(selector).await {
            Ok(element) => Ok(element.attribute(name).await?),
            Err(_) => Ok(None),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let page = self.page()?;
        let result = page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptError(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String> {
        Ok(self.page()?.content().await?)
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page()?.url().await?.unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder().full_page(true).build();
        Ok(self.page()?.screenshot(params).await?)
    }
}
