//! Configuration management with serde serialization/deserialization
//!
//! Defines the `Config` struct that drives one run: what to crawl, how many
//! workers to use, which audit modules are enabled, and how retries and rate
//! limiting behave.

use serde::{Deserialize, Serialize};

/// Main configuration structure for one audit run.
///
/// Deserialized directly from the `POST /audit` body and from an optional
/// config file passed to the `audit`/`validate` CLI subcommands.
///
/// # Examples
///
/// ```rust
/// use site_auditor::Config;
///
/// let config = Config {
///     sitemap_url: Some("https://example.com/sitemap.xml".to_string()),
///     output_dir: "./audit-output".to_string(),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Sitemap URL to crawl. Required unless `urls` is given directly.
    #[serde(default)]
    pub sitemap_url: Option<String>,

    /// Direct URL list, used instead of (or in addition to) a sitemap.
    #[serde(default)]
    pub urls: Vec<String>,

    /// Directory the run's artifacts are written under.
    pub output_dir: String,

    /// Number of concurrent workers (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Maximum number of pages to process, after filtering (default: 1000).
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Case-insensitive substring regex; only matching URLs survive.
    #[serde(default)]
    pub include_pattern: Option<String>,

    /// Case-insensitive substring regex; matching URLs are dropped.
    #[serde(default)]
    pub exclude_pattern: Option<String>,

    /// Fixed per-request delay applied after the rate limiter (default: 0).
    #[serde(default)]
    pub delay_ms: u64,

    /// Token-bucket refill rate. `None` means unconditional pass-through.
    #[serde(default)]
    pub max_requests_per_second: Option<f64>,

    /// Maximum retry attempts per URL after the first (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Base delay for exponential backoff between retries (default: 1000ms).
    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,

    /// Whether to capture a full-page screenshot per URL (default: false).
    #[serde(default)]
    pub screenshots: bool,

    /// Whether cross-origin redirects are followed (default: true).
    #[serde(default = "default_true")]
    pub follow_redirects: bool,

    /// Maximum redirect hops to follow (default: 5).
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Enable the Performance audit module (default: true).
    #[serde(default = "default_true")]
    pub enable_performance: bool,

    /// Enable the SEO audit module (default: true).
    #[serde(default = "default_true")]
    pub enable_seo: bool,

    /// Enable the ContentWeight audit module (default: true).
    #[serde(default = "default_true")]
    pub enable_content_weight: bool,

    /// Enable the Mobile audit module (default: true).
    #[serde(default = "default_true")]
    pub enable_mobile: bool,

    /// Enable the Accessibility audit module (default: true).
    #[serde(default = "default_true")]
    pub enable_accessibility: bool,

    /// Selects the performance scoring thresholds table.
    #[serde(default)]
    pub performance_budget: PerformanceBudget,

    /// Filesystem path to the injected accessibility analyzer script.
    /// Missing file is tolerated (recorded as a module error, not fatal).
    #[serde(default = "default_accessibility_analyzer_path")]
    pub accessibility_analyzer_path: String,
}

fn default_accessibility_analyzer_path() -> String {
    "./analyzers/accessibility.js".to_string()
}

fn default_concurrency() -> usize {
    4
}
fn default_max_pages() -> usize {
    1000
}
fn default_max_retries() -> usize {
    2
}
fn default_base_retry_delay_ms() -> u64 {
    1000
}
fn default_max_redirects() -> usize {
    5
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sitemap_url: None,
            urls: Vec::new(),
            output_dir: "./audit-output".to_string(),
            concurrency: default_concurrency(),
            max_pages: default_max_pages(),
            include_pattern: None,
            exclude_pattern: None,
            delay_ms: 0,
            max_requests_per_second: None,
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
            screenshots: false,
            follow_redirects: true,
            max_redirects: default_max_redirects(),
            enable_performance: true,
            enable_seo: true,
            enable_content_weight: true,
            enable_mobile: true,
            enable_accessibility: true,
            performance_budget: PerformanceBudget::Default,
            accessibility_analyzer_path: default_accessibility_analyzer_path(),
        }
    }
}

impl Config {
    /// Validates the parts of a `Config` that can be checked without doing
    /// any I/O: at least one URL source, and well-formed include/exclude
    /// regexes.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::AuditError;

        if self.sitemap_url.is_none() && self.urls.is_empty() {
            return Err(AuditError::ConfigError(
                "either sitemapUrl or urls must be provided".to_string(),
            ));
        }
        if self.output_dir.trim().is_empty() {
            return Err(AuditError::ConfigError("outputDir must not be empty".to_string()));
        }
        if self.concurrency == 0 {
            return Err(AuditError::ConfigError("concurrency must be >= 1".to_string()));
        }
        if self.max_pages == 0 {
            return Err(AuditError::ConfigError("maxPages must be >= 1".to_string()));
        }
        if let Some(rps) = self.max_requests_per_second {
            if rps <= 0.0 {
                return Err(AuditError::ConfigError(
                    "maxRequestsPerSecond must be > 0".to_string(),
                ));
            }
        }
        if let Some(pattern) = &self.include_pattern {
            regex::RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()?;
        }
        if let Some(pattern) = &self.exclude_pattern {
            regex::RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()?;
        }
        Ok(())
    }
}

/// Selects which budget thresholds table `audits::performance` scores
/// against (the performance budget thresholds table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceBudget {
    Default,
    Ecommerce,
    Corporate,
    Blog,
}

impl Default for PerformanceBudget {
    fn default() -> Self {
        PerformanceBudget::Default
    }
}

/// Process-wide environment overrides, read once at startup the way the
/// teacher reads `chrome_path` into `Config`.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub chrome_path: Option<String>,
    pub disable_gpu: bool,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
    pub output_dir: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            chrome_path: std::env::var("CHROME_PATH").ok(),
            disable_gpu: std::env::var("DISABLE_GPU")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            http_proxy: std::env::var("HTTP_PROXY").ok(),
            https_proxy: std::env::var("HTTPS_PROXY").ok(),
            no_proxy: std::env::var("NO_PROXY").ok(),
            output_dir: std::env::var("OUTPUT_DIR").ok(),
        }
    }

    /// Applies overrides onto a loaded config; environment `OUTPUT_DIR` only
    /// takes effect if the config still holds the built-in default.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            if config.output_dir == Config::default().output_dir {
                config.output_dir = dir.clone();
            }
        }
    }
}

/// Generates the headless Chrome command-line arguments used to launch each
/// browser pool instance.
pub fn get_chrome_args(env: &EnvOverrides) -> Vec<String> {
    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--window-size=1920,1080".to_string(),
    ];

    if env.disable_gpu {
        args.push("--disable-gpu".to_string());
    }

    args
}

pub fn create_browser_config(env: &EnvOverrides) -> chromiumoxide::browser::BrowserConfig {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(1920, 1080)
        .args(get_chrome_args(env));

    if let Some(chrome_path) = &env.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder
        .build()
        .unwrap_or_else(|_| BrowserConfig::with_executable("/usr/bin/chromium"))
}
