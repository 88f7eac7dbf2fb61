//! Client and per-test configuration.
//!
//! [`ClientConfig`] is process level and usually comes from a TOML file.
//! Session settings are layered: a [`TestConfig`] given at open time
//! overrides the client's [`SessionDefaults`], and the result is resolved
//! once into a [`ResolvedTestConfig`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, VgcError};
use crate::types::{BrowserInfo, MatchLevel};

pub const DEFAULT_SERVER_URL: &str = "https://render.visualgrid.example";
pub const API_KEY_ENV: &str = "VGC_API_KEY";
pub const SERVER_URL_ENV: &str = "VGC_SERVER_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub server_url: String,
    pub api_key: Option<String>,
    pub proxy: Option<String>,
    /// Maximum number of simultaneously open tests.
    pub concurrency: usize,
    /// Render gate size is `concurrency * render_concurrency_factor`.
    pub render_concurrency_factor: usize,
    #[serde(with = "humantime_serde")]
    pub render_status_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub render_status_timeout: Duration,
    pub fetch_retries: u32,
    #[serde(with = "humantime_serde")]
    pub fetch_retry_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    pub session: SessionDefaults,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            api_key: None,
            proxy: None,
            concurrency: 5,
            render_concurrency_factor: 5,
            render_status_interval: Duration::from_millis(500),
            render_status_timeout: Duration::from_secs(10 * 60),
            fetch_retries: 5,
            fetch_retry_backoff: Duration::ZERO,
            fetch_timeout: Duration::from_secs(30),
            session: SessionDefaults::default(),
        }
    }
}

impl ClientConfig {
    /// Load config from `path`, else from the central config file, else
    /// defaults. Environment variables fill values the file leaves unset.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let source = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::central_config_path().filter(|path| path.exists()),
        };
        let mut config = match source {
            Some(path) => {
                let text = std::fs::read_to_string(&path)?;
                toml::from_str(&text).map_err(|e| {
                    VgcError::Config(format!("Failed to parse {}: {e}", path.display()))
                })?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// `~/.config/vgc/config.toml`
    pub fn central_config_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".config").join("vgc").join("config.toml"))
    }

    fn apply_env(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty());
        }
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.is_empty() && self.server_url == DEFAULT_SERVER_URL {
                self.server_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(VgcError::Config("concurrency must be at least 1".into()));
        }
        if self.render_concurrency_factor == 0 {
            return Err(VgcError::Config(
                "render_concurrency_factor must be at least 1".into(),
            ));
        }
        if self.render_status_interval.is_zero() {
            return Err(VgcError::Config(
                "render_status_interval must be greater than zero".into(),
            ));
        }
        if let Some(browsers) = &self.session.browsers {
            validate_browsers(browsers)?;
        }
        url::Url::parse(&self.server_url)?;
        Ok(())
    }

    pub fn render_concurrency(&self) -> usize {
        self.concurrency.max(1) * self.render_concurrency_factor.max(1)
    }
}

/// Session properties shared by every test of a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    pub app_name: Option<String>,
    pub batch_name: Option<String>,
    pub batch_id: Option<String>,
    pub branch_name: Option<String>,
    pub parent_branch_name: Option<String>,
    pub baseline_branch_name: Option<String>,
    pub baseline_env_name: Option<String>,
    pub env_name: Option<String>,
    pub match_level: Option<MatchLevel>,
    pub ignore_caret: Option<bool>,
    pub save_new_tests: Option<bool>,
    pub save_failed_tests: Option<bool>,
    pub is_disabled: Option<bool>,
    pub browsers: Option<Vec<BrowserInfo>>,
    /// Custom key/value properties attached to the session.
    pub properties: Option<Vec<Property>>,
    pub baseline_name: Option<String>,
    /// How long the session retries a match before reporting a diff.
    #[serde(with = "humantime_serde")]
    pub match_timeout: Option<Duration>,
    pub compare_with_parent_branch: Option<bool>,
    pub ignore_baseline: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

/// Overrides for a single test. Every field left `None` falls back to the
/// client's [`SessionDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub test_name: Option<String>,
    #[serde(flatten)]
    pub session: SessionDefaults,
}

impl TestConfig {
    pub fn named(app_name: impl Into<String>, test_name: impl Into<String>) -> Self {
        Self {
            test_name: Some(test_name.into()),
            session: SessionDefaults {
                app_name: Some(app_name.into()),
                ..SessionDefaults::default()
            },
        }
    }

    pub fn with_browsers(mut self, browsers: Vec<BrowserInfo>) -> Self {
        self.session.browsers = Some(browsers);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.session.is_disabled = Some(true);
        self
    }
}

/// Fully resolved settings for one test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTestConfig {
    pub app_name: String,
    pub test_name: String,
    pub batch_name: Option<String>,
    pub batch_id: String,
    pub branch_name: Option<String>,
    pub parent_branch_name: Option<String>,
    pub baseline_branch_name: Option<String>,
    pub baseline_env_name: Option<String>,
    pub env_name: Option<String>,
    pub match_level: MatchLevel,
    pub ignore_caret: bool,
    pub save_new_tests: bool,
    pub save_failed_tests: bool,
    pub browsers: Vec<BrowserInfo>,
    pub properties: Vec<Property>,
    pub baseline_name: Option<String>,
    #[serde(with = "humantime_serde")]
    pub match_timeout: Option<Duration>,
    pub compare_with_parent_branch: bool,
    pub ignore_baseline: bool,
}

impl ResolvedTestConfig {
    /// Per-test values win over client defaults. `batch_id` is the client's
    /// own id when neither sets one, so every test of a client shares it.
    pub fn resolve(test: &TestConfig, defaults: &SessionDefaults, batch_id: &str) -> Result<Self> {
        let test_session = &test.session;
        macro_rules! pick {
            ($field:ident) => {
                test_session
                    .$field
                    .clone()
                    .or_else(|| defaults.$field.clone())
            };
        }

        let app_name = pick!(app_name)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| VgcError::Config("app_name is required to open a test".into()))?;
        let test_name = test
            .test_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| VgcError::Config("test_name is required to open a test".into()))?;
        let browsers = pick!(browsers).unwrap_or_else(|| vec![BrowserInfo::default()]);
        validate_browsers(&browsers)?;

        Ok(Self {
            app_name,
            test_name,
            batch_name: pick!(batch_name),
            batch_id: pick!(batch_id).unwrap_or_else(|| batch_id.to_string()),
            branch_name: pick!(branch_name),
            parent_branch_name: pick!(parent_branch_name),
            baseline_branch_name: pick!(baseline_branch_name),
            baseline_env_name: pick!(baseline_env_name),
            env_name: pick!(env_name),
            match_level: pick!(match_level).unwrap_or_default(),
            ignore_caret: pick!(ignore_caret).unwrap_or(true),
            save_new_tests: pick!(save_new_tests).unwrap_or(true),
            save_failed_tests: pick!(save_failed_tests).unwrap_or(false),
            browsers,
            properties: pick!(properties).unwrap_or_default(),
            baseline_name: pick!(baseline_name),
            match_timeout: pick!(match_timeout),
            compare_with_parent_branch: pick!(compare_with_parent_branch).unwrap_or(false),
            ignore_baseline: pick!(ignore_baseline).unwrap_or(false),
        })
    }
}

fn validate_browsers(browsers: &[BrowserInfo]) -> Result<()> {
    if browsers.is_empty() {
        return Err(VgcError::Config("browsers must not be empty".into()));
    }
    match browsers
        .iter()
        .find(|browser| !browser.is_emulated() && browser.viewport().is_none())
    {
        Some(browser) => Err(VgcError::Config(format!(
            "browser '{}' needs a width and height or a device name",
            browser.name
        ))),
        None => Ok(()),
    }
}

/// Whether a test opened with `test` over `defaults` is disabled.
pub fn is_disabled(test: &TestConfig, defaults: &SessionDefaults) -> bool {
    test.session
        .is_disabled
        .or(defaults.is_disabled)
        .unwrap_or(false)
}
