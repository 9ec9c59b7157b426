//! Configuration management for the census validation pipeline.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/censo/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Record store settings
    pub database: DatabaseConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Census lookup site settings
    pub lookup: LookupConfig,
    /// CAPTCHA provider settings
    pub captcha: CaptchaConfig,
    /// Retry/backoff schedule
    pub retry: RetryConfig,
    /// Staleness detection windows
    pub staleness: StalenessConfig,
    /// Manual refresh policy
    pub refresh: RefreshConfig,
    /// Worker pool settings
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }
        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `CENSO_DATABASE_PATH`: Override the `SQLite` database path
    /// - `CENSO_HEADLESS`: Override browser headless mode (true/false)
    /// - `CENSO_WORKERS`: Override worker pool size
    /// - `CENSO_LOOKUP_URL`: Override the census lookup URL
    /// - `CENSO_TWOCAPTCHA_API_KEY`: 2captcha API key (enables the provider)
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `CENSO_*` environment overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CENSO_DATABASE_PATH") {
            tracing::debug!("Override database.path from env: {}", val);
            self.database.path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("CENSO_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Ok(val) = std::env::var("CENSO_WORKERS") {
            if let Ok(pool_size) = val.parse() {
                self.worker.pool_size = pool_size;
                tracing::debug!("Override worker.pool_size from env: {}", pool_size);
            }
        }

        if let Ok(val) = std::env::var("CENSO_LOOKUP_URL") {
            tracing::debug!("Override lookup.url from env: {}", val);
            self.lookup.url = val;
        }

        if let Ok(key) = std::env::var("CENSO_TWOCAPTCHA_API_KEY") {
            if !key.is_empty() {
                self.captcha.api_key = Some(key);
                self.captcha.provider = CaptchaProvider::TwoCaptcha;
                tracing::debug!("Override captcha.api_key from env");
            }
        }
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        let needed = usize::from(self.retry.max_attempts - 1);
        if self.retry.backoff_secs.len() < needed {
            return Err(invalid(
                "retry.backoff_secs",
                &format!(
                    "needs at least {needed} entries for {} attempts, got {}",
                    self.retry.max_attempts,
                    self.retry.backoff_secs.len()
                ),
            ));
        }
        if self.worker.pool_size == 0 {
            return Err(invalid("worker.pool_size", "must be at least 1"));
        }
        if self.refresh.bulk_batch_size == 0 {
            return Err(invalid("refresh.bulk_batch_size", "must be at least 1"));
        }
        for (field, secs) in [
            ("browser.launch_timeout_secs", self.browser.launch_timeout_secs),
            ("lookup.navigation_timeout_secs", self.lookup.navigation_timeout_secs),
            ("lookup.element_timeout_secs", self.lookup.element_timeout_secs),
            ("lookup.result_timeout_secs", self.lookup.result_timeout_secs),
            ("lookup.operation_timeout_secs", self.lookup.operation_timeout_secs),
            ("captcha.solve_timeout_secs", self.captcha.solve_timeout_secs),
            ("captcha.poll_interval_secs", self.captcha.poll_interval_secs),
        ] {
            if secs == 0 {
                return Err(invalid(field, "must be at least 1 second"));
            }
        }
        if self.captcha.provider == CaptchaProvider::TwoCaptcha
            && self.captcha.api_key.as_deref().map_or(true, str::is_empty)
        {
            return Err(invalid(
                "captcha.api_key",
                "required when provider is two_captcha",
            ));
        }
        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| invalid("config_path", "no parent directory"))?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/censo/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("co", "censo", "censo").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/censo`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("co", "censo", "censo").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Record store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` file path, or `:memory:`
    pub path: PathBuf,
    /// Maximum pooled connections
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("censo.db"),
            max_connections: 5,
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Disable the Chromium sandbox (needed in most containers)
    pub no_sandbox: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Explicit Chromium executable, auto-detected when unset
    pub executable: Option<PathBuf>,
    /// How long to wait for the browser process to come up
    pub launch_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            no_sandbox: true,
            window_width: 1280,
            window_height: 800,
            executable: None,
            launch_timeout_secs: 30,
        }
    }
}

/// CSS selectors describing the census lookup page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSelectors {
    /// Loading overlay that must disappear before the form is usable
    pub spinner_overlay: String,
    /// Cedula text input
    pub cedula_input: String,
    /// Fallback submit selector when no button carries `submit_text`
    pub submit_button: String,
    /// Upper-case text of the submit button
    pub submit_text: String,
    /// Element carrying the reCAPTCHA `data-sitekey` attribute
    pub sitekey_element: String,
    /// reCAPTCHA iframe, used to recover the site key from its `k=` parameter
    pub recaptcha_iframe: String,
    /// Region that appears once a result (table or message) is rendered
    pub result_region: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            spinner_overlay: ".loading, .spinner, .overlay, [class*=\"loading\"]".to_string(),
            cedula_input:
                "input#cedula, input[name=\"cedula\"], input[type=\"text\"], input[type=\"number\"]"
                    .to_string(),
            submit_button: "button[type=\"submit\"], input[type=\"submit\"]".to_string(),
            submit_text: "CONSULTAR".to_string(),
            sitekey_element: "[data-sitekey]".to_string(),
            recaptcha_iframe: "iframe[src*=\"recaptcha\"]".to_string(),
            result_region: "table, .alert, [role=\"alert\"], .resultado, .mensaje".to_string(),
        }
    }
}

/// Census lookup site settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Lookup form URL
    pub url: String,
    /// Page navigation and load timeout in seconds
    pub navigation_timeout_secs: u64,
    /// Timeout for individual DOM waits (overlay, input) in seconds
    pub element_timeout_secs: u64,
    /// Timeout for the result region to become visible in seconds
    pub result_timeout_secs: u64,
    /// Ceiling for one whole lookup in seconds
    pub operation_timeout_secs: u64,
    /// Minimum spacing between lookups in seconds
    pub rate_limit_secs: u64,
    /// Pause after submit before reading the result, in milliseconds
    pub settle_delay_ms: u64,
    /// Where to drop screenshots of failed lookups; disabled when unset
    pub screenshot_dir: Option<PathBuf>,
    /// Page selectors
    pub selectors: SiteSelectors,
}

impl LookupConfig {
    /// Navigation timeout as a `Duration`.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    /// DOM wait timeout as a `Duration`.
    #[must_use]
    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    /// Result wait timeout as a `Duration`.
    #[must_use]
    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }

    /// Whole-lookup ceiling as a `Duration`.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Rate limit spacing as a `Duration`.
    #[must_use]
    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs(self.rate_limit_secs)
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            url: "https://consultacenso.registraduria.gov.co/consultar/".to_string(),
            navigation_timeout_secs: 60,
            element_timeout_secs: 30,
            result_timeout_secs: 30,
            operation_timeout_secs: 240,
            rate_limit_secs: 5,
            settle_delay_ms: 2000,
            screenshot_dir: None,
            selectors: SiteSelectors::default(),
        }
    }
}

/// Which CAPTCHA provider to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaProvider {
    /// No provider; any challenge fails the attempt
    Disabled,
    /// 2captcha.com HTTP API
    TwoCaptcha,
}

/// CAPTCHA provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaConfig {
    /// Provider selection
    pub provider: CaptchaProvider,
    /// Provider API key (never written back to disk)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Provider API base URL
    pub api_base_url: String,
    /// Upper bound for one solve in seconds
    pub solve_timeout_secs: u64,
    /// Delay between result polls in seconds
    pub poll_interval_secs: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            provider: CaptchaProvider::Disabled,
            api_key: None,
            api_base_url: "https://2captcha.com".to_string(),
            solve_timeout_secs: 120,
            poll_interval_secs: 5,
        }
    }
}

/// Retry/backoff schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempt cap per validation run
    pub max_attempts: u8,
    /// Delay before attempt `n + 1`, indexed by `n - 1`
    pub backoff_secs: Vec<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: vec![60, 300, 900],
        }
    }
}

/// Staleness detection windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessConfig {
    /// `PENDING` records older than this are stale
    pub pending_timeout_secs: u64,
    /// `PROCESSING` records older than this are stale
    pub processing_timeout_secs: u64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            pending_timeout_secs: 120,
            processing_timeout_secs: 300,
        }
    }
}

/// Manual refresh policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Minimum seconds between refreshes of one record
    pub cooldown_secs: u64,
    /// Maximum records handled by one bulk refresh
    pub bulk_batch_size: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 30,
            bulk_batch_size: 10,
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent workers
    pub pool_size: usize,
    /// Idle poll interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 1,
            poll_interval_ms: 1000,
        }
    }
}
