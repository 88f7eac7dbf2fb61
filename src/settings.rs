use std::path::Path;

use tracing::debug;
use vgc_lib::{BrowserInfo, ClientConfig, VgcError};

/// Overrides given on the command line. `None` and empty lists keep the
/// configured value.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub concurrency: Option<usize>,
    pub app_name: Option<String>,
    pub browsers: Vec<BrowserInfo>,
}

/// Load config from a TOML file, central config, or return defaults.
/// Priority: explicit path > ~/.config/vgc/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, VgcError> {
    let cfg = ClientConfig::load(path).map_err(|e| {
        let loc = path
            .map(|p| p.display().to_string())
            .or_else(|| ClientConfig::central_config_path().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "defaults".to_string());
        VgcError::Config(format!("Failed to read config {}: {}", loc, e))
    })?;

    validate(&cfg, path)?;
    Ok(cfg)
}

/// Apply CLI overrides and re-validate.
pub fn apply_overrides(
    config: &mut ClientConfig,
    overrides: CliOverrides,
    path: Option<&Path>,
) -> Result<(), VgcError> {
    if let Some(concurrency) = overrides.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(app_name) = overrides.app_name {
        config.session.app_name = Some(app_name);
    }
    if !overrides.browsers.is_empty() {
        config.session.browsers = Some(overrides.browsers);
    }
    validate(config, path)
}

fn validate(config: &ClientConfig, path: Option<&Path>) -> Result<(), VgcError> {
    config.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        VgcError::Config(prefix)
    })
}

/// Log the effective config (visible with --verbose).
pub fn log_effective_config(config: &ClientConfig, config_path: Option<&Path>) {
    debug!("{}", format_effective_config(config, config_path));
}

/// Format effective config as a single-line string.
pub fn format_effective_config(config: &ClientConfig, config_source: Option<&Path>) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    format!(
        "Effective config [{source}]: server={}, concurrency={}, render_concurrency={}, status interval={}ms timeout={}s, fetch retries={}, api_key={}",
        config.server_url,
        config.concurrency,
        config.render_concurrency(),
        config.render_status_interval.as_millis(),
        config.render_status_timeout.as_secs(),
        config.fetch_retries,
        if config.api_key.is_some() { "set" } else { "unset" },
    )
}
