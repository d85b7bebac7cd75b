//! `scrcpy-viewer` command line entry point.

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::{config::HookBuilder, eyre::Result};
use scrcpy_viewer::{Config, cancel::CancellationToken};
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter, fmt::format::FmtSpan};

use crate::output::Output;

#[derive(Parser)]
#[command(name = "scrcpy-viewer")]
#[command(about = "Discover Android devices and mirror them with scrcpy", long_about = None)]
#[command(version, author)]
struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output in JSON format, one object per line
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (defaults to ~/.scrcpy-viewer/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected devices that are ready for mirroring
    Devices(commands::devices::DevicesArgs),
    /// Mirror one or more devices and follow their logs
    Mirror(commands::mirror::MirrorArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    HookBuilder::default()
        .display_env_section(false)
        .issue_url("https://github.com/water-rs/scrcpy-viewer/issues/new")
        .panic_section("It looks like scrcpy-viewer encountered a bug")
        .install()?;

    let level = match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let output = Output::from_json_flag(cli.json);
    let config = Config::load_or_default(cli.config.as_deref())?;
    let token = create_root_token();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Devices(args) => commands::devices::run(args, &config, output, &token).await,
            Commands::Mirror(args) => commands::mirror::run(args, &config, output, &token).await,
        }
    })
}

/// Root cancellation token, cancelled when the user presses Ctrl+C.
fn create_root_token() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_token.cancel()) {
        tracing::warn!("Failed to install Ctrl+C handler: {err}");
    }
    token
}
