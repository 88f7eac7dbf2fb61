use std::path::PathBuf;
use std::process::ExitCode;

use vgc_lib::{GridClient, RenderInfoOutput, VgcError, VgcOutput};

use crate::cli::OutputFormat;
use crate::formatting::{render_error, write_output};
use crate::settings::{load_config, log_effective_config};

/// Run the render-info command.
pub async fn run_render_info(
    config_path: Option<PathBuf>,
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
    let info = match client.render_info().await {
        Ok(info) => info,
        Err(err) => return render_error(err, format, output),
    };

    let body = VgcOutput::RenderInfo(RenderInfoOutput::new(&info));
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(VgcError::Io(err.to_string()), format, output);
    }
    ExitCode::SUCCESS
}
