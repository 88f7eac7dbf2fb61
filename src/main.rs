mod cli;
mod commands;
mod formatting;
mod manifest;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_check, run_render_info, run_status};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    // Logs go to stderr so stdout stays machine readable.
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::RenderInfo => run_render_info(args.config, args.format, args.output).await,
        Commands::Status { render_ids } => {
            run_status(args.config, render_ids, args.format, args.output).await
        }
        Commands::Check {
            manifest,
            app_name,
            test_name,
            browsers,
            concurrency,
        } => {
            run_check(
                args.config,
                manifest,
                app_name,
                test_name,
                browsers,
                concurrency,
                args.format,
                args.output,
            )
            .await
        }
    }
}
