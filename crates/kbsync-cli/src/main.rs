#![forbid(unsafe_code)]

mod cmd;
mod http;
mod output;

use std::env;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "kbsync: keep chatbot knowledge bases in sync with your top duplicate tickets",
    long_about = None
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    global: cmd::GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags.
    const fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Sync",
        about = "Rebuild the knowledge base from scratch",
        long_about = "Purge the selected bot and the local store, rank root tickets by \
                      descendant count, summarize them and submit the top ones.",
        after_help = "EXAMPLES:\n    # Rebuild the local store only\n    kbsync init\n\n    # Rebuild the support bot with the top 25 tickets\n    kbsync --classifier-bot support init --limit 25"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Sync",
        about = "Refresh changed tickets",
        long_about = "Re-summarize tickets whose descendant count changed and push the \
                      changes to the selected bot. With --limit the bot grows to at least \
                      N entries; nothing is removed.",
        after_help = "EXAMPLES:\n    # Refresh the local store\n    kbsync update\n\n    # Sync the support bot, growing it to 50 entries\n    kbsync --classifier-bot support update --limit 50\n\n    # Resubmit everything\n    kbsync --classifier-bot support update --force-refresh"
    )]
    Update(cmd::update::UpdateArgs),

    #[command(
        next_help_heading = "Sync",
        about = "Make a bot hold exactly the top N tickets",
        long_about = "Reconcile the selected bot to exactly the N highest-ranked root \
                      tickets, removing entries that fell out of the ranking.",
        after_help = "EXAMPLES:\n    # Shrink or grow the support bot to 20 entries\n    kbsync --classifier-bot support resize 20\n\n    # Emit machine-readable output\n    kbsync --classifier-bot support resize 20 --json"
    )]
    Resize(cmd::resize::ResizeArgs),

    #[command(
        next_help_heading = "Read",
        about = "List configured bots",
        after_help = "EXAMPLES:\n    kbsync bots\n    kbsync bots --json"
    )]
    Bots(cmd::bots::BotsArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show local ticket and submission counts",
        after_help = "EXAMPLES:\n    kbsync status\n    kbsync --config ops/kbsync.toml status --json"
    )]
    Status(cmd::status::StatusArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    # Bash\n    kbsync completions bash > ~/.local/share/bash-completion/completions/kbsync"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("KBSYNC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "kbsync=debug,info"
        } else {
            "kbsync=info,warn"
        })
    });
    let format = env::var("KBSYNC_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);
    match format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .init(),
        _ => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }
}

fn dispatch(cli: Cli, output: OutputMode) -> anyhow::Result<()> {
    let global = &cli.global;
    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, global, output),
        Commands::Update(ref args) => cmd::update::run_update(args, global, output),
        Commands::Resize(ref args) => cmd::resize::run_resize(args, global, output),
        Commands::Bots(ref args) => cmd::bots::run_bots(args, global, output),
        Commands::Status(ref args) => cmd::status::run_status(args, global, output),
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    debug!(command = ?cli.command, "starting");

    let output = cli.output_mode();
    match dispatch(cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if render_error(output, &CliError::from_anyhow(&error)).is_err() {
                eprintln!("error: {error:#}");
            }
            ExitCode::FAILURE
        }
    }
}
