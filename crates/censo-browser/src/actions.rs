use crate::error::Result;
use std::time::Duration;

/// Page-level operations the lookup flow needs.
///
/// Implemented by [`crate::BrowserSession`] over a live Chromium page; the
/// trait boundary lets the lookup flow be driven against scripted pages in
/// tests.
#[async_trait::async_trait]
pub trait BrowserActions: Send + Sync {
    /// Navigate to a URL and wait for the load event
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Wait until any element matching the selector is visible
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Wait until no element matching the selector is visible
    async fn wait_for_hidden(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Fill a form field by selector
    async fn fill_field(&self, selector: &str, value: &str) -> Result<()>;

    /// Click an element by selector
    async fn click(&self, selector: &str) -> Result<()>;

    /// Read an attribute of the first element matching the selector
    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Evaluate a JavaScript expression and return its JSON value
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Full HTML of the current document
    async fn content(&self) -> Result<String>;

    /// URL of the current document
    async fn current_url(&self) -> Result<String>;

    /// Take a full-page PNG screenshot
    async fn screenshot(&self) -> Result<Vec<u8>>;
}

/// JavaScript expression that is true when any element matching `selector`
/// is rendered and visible.
pub fn visibility_script(selector: &str) -> String {
    let selector = serde_json::Value::from(selector);
    format!(
        "(() => Array.from(document.querySelectorAll({selector})).some((el) => {{ \
            const style = window.getComputedStyle(el); \
            const rect = el.getBoundingClientRect(); \
            return style.display !== 'none' && style.visibility !== 'hidden' \
                && (rect.width > 0 || rect.height > 0); \
        }}))()"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_script_quotes_selector() {
        let script = visibility_script("input[name=\"cedula\"]");
        assert!(script.contains(r#"querySelectorAll("input[name=\"cedula\"]")"#));
        assert!(script.starts_with("(() =>"));
    }
}
