//! reCAPTCHA solving.
//!
//! The lookup form is protected by reCAPTCHA v2. A [`CaptchaSolver`] turns a
//! site key and page URL into a response token; the executor injects it.

use crate::error::{CaptchaError, Result};
use censo_core::{CaptchaConfig, CaptchaProvider};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Produces a reCAPTCHA response token for a page.
#[async_trait::async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Solve the challenge identified by `site_key` on `page_url`.
    async fn solve(&self, site_key: &str, page_url: &str) -> Result<String>;
}

/// Solver used when no provider is configured; every challenge fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSolver;

#[async_trait::async_trait]
impl CaptchaSolver for DisabledSolver {
    async fn solve(&self, _site_key: &str, _page_url: &str) -> Result<String> {
        Err(CaptchaError::Disabled)
    }
}

/// Build the solver selected by the configuration.
///
/// Falls back to [`DisabledSolver`] when 2captcha is selected without a key.
pub fn solver_from_config(config: &CaptchaConfig) -> Arc<dyn CaptchaSolver> {
    match (config.provider, config.api_key.as_deref()) {
        (CaptchaProvider::TwoCaptcha, Some(key)) if !key.is_empty() => {
            Arc::new(TwoCaptchaSolver::new(key, config))
        }
        (CaptchaProvider::TwoCaptcha, _) => {
            tracing::warn!("2captcha selected but no API key set; challenges will fail");
            Arc::new(DisabledSolver)
        }
        (CaptchaProvider::Disabled, _) => Arc::new(DisabledSolver),
    }
}

/// 2captcha.com HTTP API client.
pub struct TwoCaptchaSolver {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    solve_timeout: Duration,
    poll_interval: Duration,
}

/// JSON envelope of both `in.php` and `res.php` with `json=1`.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: i64,
    request: String,
}

/// State of a submitted task, as reported by `res.php`.
#[derive(Debug, PartialEq, Eq)]
enum PollState {
    Pending,
    Ready(String),
}

impl TwoCaptchaSolver {
    /// Create a solver using the given key and the timing from `config`.
    pub fn new(api_key: impl Into<String>, config: &CaptchaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            solve_timeout: Duration::from_secs(config.solve_timeout_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }

    async fn submit(&self, site_key: &str, page_url: &str) -> Result<String> {
        let body = self
            .client
            .get(format!("{}/in.php", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("method", "userrecaptcha"),
                ("googlekey", site_key),
                ("pageurl", page_url),
                ("json", "1"),
            ])
            .send()
            .await?
            .text()
            .await?;

        parse_submit_response(&body)
    }

    async fn poll(&self, task_id: &str) -> Result<PollState> {
        let body = self
            .client
            .get(format!("{}/res.php", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("action", "get"),
                ("id", task_id),
                ("json", "1"),
            ])
            .send()
            .await?
            .text()
            .await?;

        parse_poll_response(&body)
    }

    async fn solve_inner(&self, site_key: &str, page_url: &str) -> Result<String> {
        let task_id = self.submit(site_key, page_url).await?;
        tracing::debug!("2captcha task {} submitted", task_id);

        loop {
            tokio::time::sleep(self.poll_interval).await;
            match self.poll(&task_id).await? {
                PollState::Pending => continue,
                PollState::Ready(token) => return Ok(token),
            }
        }
    }
}

#[async_trait::async_trait]
impl CaptchaSolver for TwoCaptchaSolver {
    async fn solve(&self, site_key: &str, page_url: &str) -> Result<String> {
        tracing::info!("Sending reCAPTCHA to 2captcha");
        match tokio::time::timeout(self.solve_timeout, self.solve_inner(site_key, page_url)).await
        {
            Ok(Ok(token)) => {
                tracing::info!("reCAPTCHA solved");
                Ok(token)
            }
            Ok(Err(e)) => {
                tracing::warn!("2captcha solve failed: {}", e);
                Err(e)
            }
            Err(_) => Err(CaptchaError::Timeout(self.solve_timeout)),
        }
    }
}

fn parse_envelope(body: &str) -> Result<ApiResponse> {
    serde_json::from_str(body).map_err(|_| CaptchaError::InvalidResponse(body.to_string()))
}

fn parse_submit_response(body: &str) -> Result<String> {
    let response = parse_envelope(body)?;
    if response.status == 1 {
        Ok(response.request)
    } else {
        Err(CaptchaError::Rejected(response.request))
    }
}

fn parse_poll_response(body: &str) -> Result<PollState> {
    let response = parse_envelope(body)?;
    match (response.status, response.request.as_str()) {
        (1, _) => Ok(PollState::Ready(response.request)),
        (_, "CAPCHA_NOT_READY") => Ok(PollState::Pending),
        _ => Err(CaptchaError::Rejected(response.request)),
    }
}

/// Recover the site key from the `k=` query parameter of a reCAPTCHA iframe
/// `src`. Protocol-relative and relative sources are accepted.
pub fn site_key_from_iframe_src(src: &str) -> Option<String> {
    let base = Url::parse("https://www.google.com/").ok()?;
    let url = base.join(src).ok()?;
    url.query_pairs()
        .find(|(name, _)| name == "k")
        .map(|(_, value)| value.into_owned())
        .filter(|key| !key.is_empty())
}

/// JavaScript that writes `token` into the reCAPTCHA response field and fires
/// every known success callback.
pub fn token_injection_script(token: &str) -> String {
    let token = serde_json::Value::from(token);
    format!(
        r#"(() => {{
    const token = {token};
    document
        .querySelectorAll('#g-recaptcha-response, textarea[name="g-recaptcha-response"]')
        .forEach((el) => {{ el.value = token; el.innerHTML = token; }});
    const invoke = (cb) => {{
        try {{
            if (typeof cb === 'function') cb(token);
            else if (typeof cb === 'string' && typeof window[cb] === 'function') window[cb](token);
        }} catch (e) {{}}
    }};
    const visit = (node, depth) => {{
        if (!node || typeof node !== 'object' || depth > 4) return;
        for (const key of Object.keys(node)) {{
            if (key === 'callback') invoke(node[key]);
            else visit(node[key], depth + 1);
        }}
    }};
    if (typeof ___grecaptcha_cfg !== 'undefined' && ___grecaptcha_cfg.clients) {{
        visit(___grecaptcha_cfg.clients, 0);
    }}
    if (typeof grecaptchaCallback === 'function') grecaptchaCallback(token);
    if (typeof onRecaptchaSuccess === 'function') onRecaptchaSuccess(token);
    return true;
}})()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_submit_ok() {
        let id = parse_submit_response(r#"{"status":1,"request":"2122988149"}"#).unwrap();
        assert_eq!(id, "2122988149");
    }

    #[test]
    fn test_parse_submit_rejected() {
        let err = parse_submit_response(r#"{"status":0,"request":"ERROR_WRONG_USER_KEY"}"#)
            .unwrap_err();
        assert!(matches!(err, CaptchaError::Rejected(ref code) if code == "ERROR_WRONG_USER_KEY"));
    }

    #[test]
    fn test_parse_submit_garbage() {
        let err = parse_submit_response("OK|123").unwrap_err();
        assert!(matches!(err, CaptchaError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_poll_states() {
        assert_eq!(
            parse_poll_response(r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#).unwrap(),
            PollState::Pending
        );
        assert_eq!(
            parse_poll_response(r#"{"status":1,"request":"03AGdBq24..."}"#).unwrap(),
            PollState::Ready("03AGdBq24...".to_string())
        );
        assert!(matches!(
            parse_poll_response(r#"{"status":0,"request":"ERROR_CAPTCHA_UNSOLVABLE"}"#),
            Err(CaptchaError::Rejected(_))
        ));
    }

    #[test]
    fn test_site_key_from_iframe_src() {
        let src = "https://www.google.com/recaptcha/api2/anchor?ar=1&k=6LcAbCdEf&co=aHR0cHM6&hl=es";
        assert_eq!(site_key_from_iframe_src(src).as_deref(), Some("6LcAbCdEf"));

        let relative = "//www.google.com/recaptcha/api2/anchor?k=6LcRel";
        assert_eq!(site_key_from_iframe_src(relative).as_deref(), Some("6LcRel"));

        assert_eq!(site_key_from_iframe_src("https://www.google.com/recaptcha/api2/anchor?ar=1"), None);
        assert_eq!(site_key_from_iframe_src("https://www.google.com/?k="), None);
    }

    #[test]
    fn test_token_injection_script_escapes_token() {
        let script = token_injection_script(r#"abc"); alert("x"#);
        assert!(script.contains(r#"const token = "abc\"); alert(\"x";"#));
        assert!(script.contains("___grecaptcha_cfg"));
        assert!(script.contains("onRecaptchaSuccess"));
    }

    #[tokio::test]
    async fn test_solver_from_config() {
        let mut config = CaptchaConfig::default();
        let solver = solver_from_config(&config);
        let result = solver.solve("key", "https://example.com").await;
        assert!(matches!(result, Err(CaptchaError::Disabled)));

        // 2captcha without a key degrades to the disabled solver
        config.provider = CaptchaProvider::TwoCaptcha;
        config.api_key = None;
        let solver = solver_from_config(&config);
        let result = solver.solve("key", "https://example.com").await;
        assert!(matches!(result, Err(CaptchaError::Disabled)));
    }
}
