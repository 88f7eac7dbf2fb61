use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use vgc_lib::{ErrorOutput, VgcError, VgcOutput, VGC_OUTPUT_VERSION};

use crate::cli::OutputFormat;

/// Write output in the requested format.
pub fn write_output(
    body: &VgcOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the appropriate exit code.
pub fn render_error(err: VgcError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let error_payload = err.to_payload();
    let payload = VgcOutput::Error(ErrorOutput {
        version: VGC_OUTPUT_VERSION.to_string(),
        message: Some(error_payload.message.clone()),
        error: error_payload,
    });

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    // Exit code 2 is reserved for fatal errors; failed tests use 1.
    ExitCode::from(2)
}

/// Render an error that failed the test itself (exit code 1).
pub fn render_failure(err: VgcError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    if matches!(err, VgcError::Config(_)) {
        return render_error(err, format, output);
    }
    let _ = render_error(err, format, output);
    ExitCode::from(1)
}

fn write_json_output(body: &VgcOutput, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

fn write_pretty_output(body: &VgcOutput, output: Option<&Path>) -> io::Result<()> {
    let stdout_is_tty = std::io::stdout().is_terminal();
    let use_human = output.is_none() && stdout_is_tty;

    if use_human {
        let content = format_pretty(body, true);
        println!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"mode\":\"error\"}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &VgcOutput, colorize: bool) -> String {
    let mut buf = String::new();
    match body {
        VgcOutput::RenderInfo(out) => {
            writeln!(buf, "Render service: {}", out.service_url).ok();
            if let Some(results_url) = &out.results_url {
                writeln!(buf, "Results: {results_url}").ok();
            }
        }
        VgcOutput::Status(out) => {
            for status in &out.statuses {
                let code = match status.status {
                    vgc_lib::RenderStatus::Rendered => "32",
                    vgc_lib::RenderStatus::Error => "31",
                    _ => "33",
                };
                let label = color(&format!("{:?}", status.status), code, colorize);
                let render_id = status.render_id.as_deref().unwrap_or("?");
                write!(buf, "{render_id}: {label}").ok();
                if let Some(location) = &status.image_location {
                    write!(buf, " {location}").ok();
                }
                if let Some(error) = &status.error {
                    write!(buf, " ({error})").ok();
                }
                writeln!(buf).ok();
            }
        }
        VgcOutput::Check(out) => {
            let status = if out.passed { "PASS" } else { "FAIL" };
            let status_colored = color(status, if out.passed { "32" } else { "31" }, colorize);
            writeln!(buf, "{} {} / {}", status_colored, out.app_name, out.test_name).ok();
            for browser in &out.browsers {
                match &browser.device {
                    Some(device) => writeln!(buf, "{} ({device} emulation):", browser.browser),
                    None => writeln!(
                        buf,
                        "{} {}x{}:",
                        browser.browser, browser.width, browser.height
                    ),
                }
                .ok();
                for result in &browser.results {
                    let mark = match result.as_expected {
                        Some(true) => color("ok", "32", colorize),
                        Some(false) => color("diff", "31", colorize),
                        None => color("rendered", "33", colorize),
                    };
                    writeln!(
                        buf,
                        "- [{}] {} {}",
                        mark,
                        result.tag.as_deref().unwrap_or("(untagged)"),
                        result.screenshot_location
                    )
                    .ok();
                }
            }
        }
        VgcOutput::Error(out) => {
            let header = color("[ERROR]", "31", colorize);
            let message = out
                .message
                .as_deref()
                .unwrap_or_else(|| out.error.message.as_str());
            writeln!(buf, "{} {}", header, message).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
        }
    }
    buf
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

/// Exit code for a finished test.
pub fn exit_code_for_check(passed: bool) -> ExitCode {
    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
