use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use vgc_lib::BrowserInfo;

#[derive(Parser)]
#[command(name = "vgc")]
#[command(
    version,
    about = "Visual Grid Client - render checkpoints on a remote rendering grid",
    long_about = "Visual Grid Client (VGC)\n\nCommands:\n- render-info: show the rendering service this client talks to.\n- status: wait for renders to finish and print their statuses.\n- check: run the checkpoints listed in a manifest and print one result list per browser.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose (debug) logging")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) with server, concurrency and session defaults; CLI flags override config"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value = "json", help = "Output format")]
    pub format: OutputFormat,

    #[arg(long, short, global = true, help = "Output file path (stdout if omitted)")]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the rendering service details
    RenderInfo,

    /// Wait for renders to reach a terminal status
    Status {
        #[arg(required = true, help = "Render ids to wait for")]
        render_ids: Vec<String>,
    },

    /// Run the checkpoints of a manifest as one test
    Check {
        #[arg(long, help = "YAML manifest listing the checkpoints")]
        manifest: PathBuf,

        #[arg(long, help = "Application name (overrides manifest and config)")]
        app_name: Option<String>,

        #[arg(long, help = "Test name (overrides manifest)")]
        test_name: Option<String>,

        #[arg(
            long = "browser",
            value_name = "NAME:WIDTHxHEIGHT",
            help = "Browser to render in, or emulate:DEVICE[@orientation]; repeat for several (overrides manifest and config)"
        )]
        browsers: Vec<BrowserInfo>,

        #[arg(long, help = "Open-session limit (overrides config)")]
        concurrency: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}
