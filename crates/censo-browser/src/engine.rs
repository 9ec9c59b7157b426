use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use crate::session::BrowserSession;
use censo_core::BrowserConfig;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::browser::CloseParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use futures_util::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

struct Running {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
}

/// Browser automation engine.
///
/// The Chromium process is launched on first use and shared by every
/// session. If the process dies, the next [`acquire`](Self::acquire)
/// relaunches it.
pub struct BrowserEngine {
    config: BrowserConfig,
    running: Mutex<Option<Running>>,
}

impl BrowserEngine {
    /// Create an engine; no browser is started until a session is requested
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            running: Mutex::new(None),
        }
    }

    /// Whether a browser process is currently up
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handler.is_finished())
    }

    /// Return the shared browser, launching it if needed.
    pub async fn acquire(&self) -> Result<Arc<Browser>> {
        let mut running = self.running.lock().await;

        if let Some(current) = running.as_ref() {
            if !current.handler.is_finished() {
                return Ok(Arc::clone(&current.browser));
            }
            tracing::warn!("Browser process exited, relaunching");
        }

        let launched = self.launch().await?;
        let browser = Arc::clone(&launched.browser);
        *running = Some(launched);
        Ok(browser)
    }

    async fn launch(&self) -> Result<Running> {
        let mut builder = ChromeConfig::builder()
            .window_size(self.config.window_width, self.config.window_height)
            .launch_timeout(Duration::from_secs(self.config.launch_timeout_secs))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage");

        if self.config.no_sandbox {
            builder = builder.no_sandbox();
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.config.executable {
            builder = builder.chrome_executable(executable);
        }

        let chrome_config = builder.build().map_err(BrowserError::ChromiumError)?;

        tracing::info!(headless = self.config.headless, "Launching browser");
        let (browser, mut handler) = Browser::launch(chrome_config).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
            tracing::debug!("Browser handler finished");
        });

        Ok(Running {
            browser: Arc::new(browser),
            handler,
        })
    }

    /// Open a page in a fresh browser context with a randomized fingerprint.
    pub async fn new_session(&self) -> Result<BrowserSession> {
        let browser = self.acquire().await?;

        let context_id = browser
            .execute(CreateBrowserContextParams::default())
            .await?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(BrowserError::ChromiumError)?;

        let page = browser.new_page(target).await?;
        let session = BrowserSession::new(
            Arc::clone(&browser),
            page,
            context_id,
            Duration::from_secs(self.config.launch_timeout_secs),
        );

        let fingerprint = FingerprintConfig::randomized();
        if let Err(e) = session.apply_fingerprint(&fingerprint).await {
            session.close().await;
            return Err(e);
        }

        Ok(session)
    }

    /// Close the browser process if it is running.
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        if let Err(e) = running.browser.execute(CloseParams::default()).await {
            tracing::debug!("Browser close command failed: {}", e);
        }
        running.handler.abort();
        tracing::info!("Browser shut down");
    }
}
