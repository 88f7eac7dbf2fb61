use std::path::PathBuf;
use std::process::ExitCode;

use tracing::info;
use vgc_lib::{
    ErrorLatch, GridClient, RenderStatus, StatusOutput, VgcError, VgcOutput, VGC_OUTPUT_VERSION,
};

use crate::cli::OutputFormat;
use crate::formatting::{exit_code_for_check, render_error, write_output};
use crate::settings::{load_config, log_effective_config};

/// Run the status command. Exits 1 when any render ended in `error`.
pub async fn run_status(
    config_path: Option<PathBuf>,
    render_ids: Vec<String>,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output),
    };
    log_effective_config(&config, config_path.as_deref());

    let client = match GridClient::from_config(config) {
        Ok(client) => client,
        Err(err) => return render_error(err, format, output),
    };
    info!(count = render_ids.len(), "waiting for renders");
    let statuses = match client
        .engine()
        .poller()
        .wait_for_terminal(&render_ids, &ErrorLatch::new())
        .await
    {
        Ok(statuses) => statuses,
        Err(err) => return render_error(err, format, output),
    };

    let passed = statuses
        .iter()
        .all(|status| status.status != RenderStatus::Error);
    let body = VgcOutput::Status(StatusOutput {
        version: VGC_OUTPUT_VERSION.to_string(),
        statuses,
    });
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(VgcError::Io(err.to_string()), format, output);
    }
    exit_code_for_check(passed)
}
