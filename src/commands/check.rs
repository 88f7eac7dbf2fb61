use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tracing::info;
use vgc_lib::{
    BrowserInfo, BrowserResults, CheckOutput, GridClient, RenderOnlySession, ResolvedTestConfig,
    TestConfig, TestSession, VgcError, VgcOutput, VGC_OUTPUT_VERSION,
};

use crate::cli::OutputFormat;
use crate::formatting::{exit_code_for_check, render_error, render_failure, write_output};
use crate::manifest::Manifest;
use crate::settings::{apply_overrides, load_config, log_effective_config, CliOverrides};

/// Run the check command: one test, every checkpoint of the manifest.
#[allow(clippy::too_many_arguments)]
pub async fn run_check(
    config_path: Option<PathBuf>,
    manifest_path: PathBuf,
    app_name: Option<String>,
    test_name: Option<String>,
    browsers: Vec<BrowserInfo>,
    concurrency: Option<usize>,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let mut config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output),
    };
    let manifest = match Manifest::load(&manifest_path) {
        Ok(manifest) => manifest,
        Err(err) => return render_error(err, format, output),
    };

    // CLI wins over the manifest, which wins over the config file.
    let overrides = CliOverrides {
        concurrency,
        app_name: app_name.or_else(|| manifest.app_name.clone()),
        browsers: if browsers.is_empty() {
            manifest.browsers.clone().unwrap_or_default()
        } else {
            browsers
        },
    };
    if let Err(err) = apply_overrides(&mut config, overrides, config_path.as_deref()) {
        return render_error(err, format, output);
    }
    log_effective_config(&config, config_path.as_deref());

    let test = TestConfig {
        test_name: test_name.or_else(|| manifest.test_name_or_stem(&manifest_path)),
        ..TestConfig::default()
    };
    let client = match GridClient::from_config(config) {
        Ok(client) => client,
        Err(err) => return render_error(err, format, output),
    };
    let resolved =
        match ResolvedTestConfig::resolve(&test, &client.config().session, client.batch_id()) {
            Ok(resolved) => resolved,
            Err(err) => return render_error(err, format, output),
        };

    let base_dir = manifest_path.parent().unwrap_or(Path::new("."));
    let mut checks = Vec::with_capacity(manifest.checks.len());
    for check in &manifest.checks {
        match check.to_args(base_dir) {
            Ok(args) => checks.push(args),
            Err(err) => return render_error(err, format, output),
        }
    }

    let sessions: Vec<Arc<dyn TestSession>> = resolved
        .browsers
        .iter()
        .map(|_| Arc::new(RenderOnlySession::new()) as Arc<dyn TestSession>)
        .collect();
    let handle = match client.open_test(test, sessions).await {
        Ok(handle) => handle,
        Err(err) => return render_error(err, format, output),
    };

    info!(checks = checks.len(), test = %resolved.test_name, "issuing checkpoints");
    for args in checks {
        handle.check_window(args);
    }
    let results = match handle.close().await {
        Ok(results) => results,
        Err(err) => return render_failure(err, format, output),
    };

    let passed = results
        .iter()
        .flatten()
        .all(|result| result.as_expected != Some(false));
    let body = VgcOutput::Check(CheckOutput {
        version: VGC_OUTPUT_VERSION.to_string(),
        app_name: resolved.app_name,
        test_name: resolved.test_name,
        passed,
        browsers: resolved
            .browsers
            .into_iter()
            .zip(results)
            .map(|(browser, results)| BrowserResults {
                device: browser.device_name.clone(),
                browser: browser.name,
                width: browser.width,
                height: browser.height,
                results,
            })
            .collect(),
    });
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(VgcError::Io(err.to_string()), format, output);
    }
    exit_code_for_check(passed)
}
