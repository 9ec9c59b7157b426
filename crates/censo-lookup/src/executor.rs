//! Lookup executor.
//!
//! Drives the census form in a fresh browser session. Every step has its own
//! timeout and the whole flow sits under an overall ceiling. Failures are
//! returned as values; nothing past this module sees a browser error.

use crate::captcha::{site_key_from_iframe_src, token_injection_script, CaptchaSolver};
use crate::classifier::classify;
use crate::error::LookupError;
use censo_browser::{BrowserActions, BrowserEngine, BrowserError, RateLimiter};
use censo_core::{Cedula, LookupConfig, Outcome, TransientFailure};
use std::sync::Arc;
use std::time::Duration;

const FILL_SETTLE: Duration = Duration::from_millis(500);
const TOKEN_SETTLE: Duration = Duration::from_secs(1);
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// What the executor saw, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutcome {
    /// The result region rendered; the page HTML
    Rendered {
        /// Full page HTML
        html: String,
    },
    /// The flow failed at some step
    Failed {
        /// Which step failed and how
        error: LookupError,
        /// Page HTML at the time of failure, when it could be read
        snapshot: Option<String>,
    },
}

impl RawOutcome {
    /// Classify a rendered page or turn a failure into a transient outcome.
    #[must_use]
    pub fn into_outcome(self) -> Outcome {
        match self {
            Self::Rendered { html } => classify(&html),
            Self::Failed { error, snapshot } => {
                let failure = TransientFailure::new(error.failure_kind(), error.to_string());
                Outcome::Transient(match snapshot {
                    Some(raw) => failure.with_raw_response(raw),
                    None => failure,
                })
            }
        }
    }
}

/// Anything that can answer "what is this cedula's census status".
#[async_trait::async_trait]
pub trait CensusLookup: Send + Sync {
    /// Run one lookup attempt. Never fails; failures are transient outcomes.
    async fn lookup(&self, cedula: &Cedula) -> Outcome;
}

/// The form flow itself, run against any [`BrowserActions`] page.
pub struct LookupFlow<'a> {
    config: &'a LookupConfig,
    solver: &'a dyn CaptchaSolver,
}

impl<'a> LookupFlow<'a> {
    /// Create a flow over the given site profile and solver.
    pub fn new(config: &'a LookupConfig, solver: &'a dyn CaptchaSolver) -> Self {
        Self { config, solver }
    }

    /// Run the flow under the overall ceiling and capture failure evidence.
    pub async fn execute_on(&self, page: &dyn BrowserActions, cedula: &Cedula) -> RawOutcome {
        let ceiling = self.config.operation_timeout();
        let result = match tokio::time::timeout(ceiling, self.run(page, cedula)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::ResultTimeout(format!(
                "lookup exceeded {}s",
                ceiling.as_secs()
            ))),
        };

        match result {
            Ok(html) => RawOutcome::Rendered { html },
            Err(error) => {
                tracing::warn!("Lookup failed: {}", error);
                if matches!(error, LookupError::NetworkError(_)) {
                    self.save_screenshot(page, cedula).await;
                }
                let snapshot = capture_snapshot(page).await;
                RawOutcome::Failed { error, snapshot }
            }
        }
    }

    /// Run the form steps and return the rendered result page.
    pub async fn run(
        &self,
        page: &dyn BrowserActions,
        cedula: &Cedula,
    ) -> Result<String, LookupError> {
        let selectors = &self.config.selectors;

        tracing::debug!("Navigating to {} for cedula={}", self.config.url, cedula);
        page.navigate(&self.config.url, self.config.navigation_timeout())
            .await
            .map_err(|e| step_failure(e, LookupError::NavigationTimeout))?;

        match page
            .wait_for_hidden(&selectors.spinner_overlay, self.config.element_timeout())
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_timeout() => tracing::debug!("Spinner still visible, continuing"),
            Err(e) => return Err(LookupError::NetworkError(e.to_string())),
        }

        page.wait_for_visible(&selectors.cedula_input, self.config.element_timeout())
            .await
            .map_err(|e| step_failure(e, LookupError::ResultTimeout))?;

        page.fill_field(&selectors.cedula_input, cedula.as_str())
            .await
            .map_err(|e| LookupError::NetworkError(e.to_string()))?;
        tokio::time::sleep(FILL_SETTLE).await;

        if let Some(site_key) = self.discover_site_key(page).await {
            self.solve_challenge(page, &site_key).await?;
        }

        self.submit(page).await?;

        page.wait_for_visible(&selectors.result_region, self.config.result_timeout())
            .await
            .map_err(|e| step_failure(e, LookupError::ResultTimeout))?;
        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        page.content()
            .await
            .map_err(|e| LookupError::NetworkError(e.to_string()))
    }

    /// Site key from the `data-sitekey` element, else from the iframe `src`.
    async fn discover_site_key(&self, page: &dyn BrowserActions) -> Option<String> {
        let selectors = &self.config.selectors;

        match page.attribute(&selectors.sitekey_element, "data-sitekey").await {
            Ok(Some(key)) if !key.is_empty() => return Some(key),
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to read data-sitekey: {}", e),
        }

        match page.attribute(&selectors.recaptcha_iframe, "src").await {
            Ok(Some(src)) => site_key_from_iframe_src(&src),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read reCAPTCHA iframe: {}", e);
                None
            }
        }
    }

    async fn solve_challenge(
        &self,
        page: &dyn BrowserActions,
        site_key: &str,
    ) -> Result<(), LookupError> {
        let token = self
            .solver
            .solve(site_key, &self.config.url)
            .await
            .map_err(|e| LookupError::ChallengeSolveFailed(e.to_string()))?;

        page.evaluate(&token_injection_script(&token))
            .await
            .map_err(|e| LookupError::ChallengeSolveFailed(format!("token injection: {e}")))?;
        tracing::debug!("reCAPTCHA token injected");

        tokio::time::sleep(TOKEN_SETTLE).await;
        Ok(())
    }

    async fn submit(&self, page: &dyn BrowserActions) -> Result<(), LookupError> {
        let selectors = &self.config.selectors;

        let clicked = page
            .evaluate(&submit_script(&selectors.submit_text))
            .await
            .map_err(|e| LookupError::NetworkError(e.to_string()))?;

        if clicked.as_bool() != Some(true) {
            page.click(&selectors.submit_button)
                .await
                .map_err(|e| LookupError::NetworkError(e.to_string()))?;
        }

        tracing::debug!("Submitted lookup form");
        Ok(())
    }

    async fn save_screenshot(&self, page: &dyn BrowserActions, cedula: &Cedula) {
        let Some(dir) = &self.config.screenshot_dir else {
            return;
        };

        let path = dir.join(format!("scraper_error_{cedula}.png"));
        let result = match page.screenshot().await {
            Ok(bytes) => tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(()) => tracing::debug!("Error screenshot saved to {}", path.display()),
            Err(e) => tracing::debug!("Could not save error screenshot: {}", e),
        }
    }
}

fn step_failure(err: BrowserError, on_timeout: fn(String) -> LookupError) -> LookupError {
    if err.is_timeout() {
        on_timeout(err.to_string())
    } else {
        LookupError::NetworkError(err.to_string())
    }
}

async fn capture_snapshot(page: &dyn BrowserActions) -> Option<String> {
    match tokio::time::timeout(SNAPSHOT_TIMEOUT, page.content()).await {
        Ok(Ok(html)) => Some(html),
        _ => None,
    }
}

/// JavaScript that clicks the first button whose text contains `text`.
/// Evaluates to `true` when a button was clicked.
pub fn submit_script(text: &str) -> String {
    let wanted = serde_json::Value::from(text.to_uppercase());
    format!(
        "(() => {{ \
            const wanted = {wanted}; \
            const target = Array.from(document.querySelectorAll('button, input[type=\"submit\"]')) \
                .find((el) => (el.innerText || el.value || '').toUpperCase().includes(wanted)); \
            if (!target) return false; \
            target.click(); \
            return true; \
        }})()"
    )
}

/// Production lookup: rate limited, one isolated browser session per call.
pub struct LookupExecutor {
    engine: Arc<BrowserEngine>,
    limiter: Arc<RateLimiter>,
    solver: Arc<dyn CaptchaSolver>,
    config: LookupConfig,
}

impl LookupExecutor {
    /// Create an executor over a shared engine and limiter.
    pub fn new(
        engine: Arc<BrowserEngine>,
        limiter: Arc<RateLimiter>,
        solver: Arc<dyn CaptchaSolver>,
        config: LookupConfig,
    ) -> Self {
        Self {
            engine,
            limiter,
            solver,
            config,
        }
    }

    /// Run one lookup and return what the page showed.
    pub async fn execute(&self, cedula: &Cedula) -> RawOutcome {
        self.limiter.throttle().await;

        let session = match self.engine.new_session().await {
            Ok(session) => session.with_close_timeout(self.config.element_timeout()),
            Err(e) => {
                tracing::error!("Could not open browser session: {}", e);
                return RawOutcome::Failed {
                    error: LookupError::NetworkError(e.to_string()),
                    snapshot: None,
                };
            }
        };

        let flow = LookupFlow::new(&self.config, self.solver.as_ref());
        let raw = flow.execute_on(&session, cedula).await;
        session.close().await;
        raw
    }
}

#[async_trait::async_trait]
impl CensusLookup for LookupExecutor {
    async fn lookup(&self, cedula: &Cedula) -> Outcome {
        let outcome = self.execute(cedula).await.into_outcome();
        tracing::debug!("Lookup {}: {}", cedula, outcome.label());
        outcome
    }
}
