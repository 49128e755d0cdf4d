//! `kbsync resize`: make a bot hold exactly the top N tickets.

use anyhow::Result;
use clap::Args;
use kbsync_core::engine::{EngineError, RunMode, RunRequest};

use super::{GlobalArgs, run_request};
use crate::output::OutputMode;

/// Arguments for `kbsync resize`.
#[derive(Args, Debug)]
pub struct ResizeArgs {
    /// Number of entries the bot should hold.
    #[arg(value_name = "N")]
    pub count: usize,

    /// Regenerate and resubmit every kept ticket.
    #[arg(long)]
    pub force_refresh: bool,
}

/// Execute `kbsync resize`.
pub fn run_resize(args: &ResizeArgs, global: &GlobalArgs, output: OutputMode) -> Result<()> {
    if global.classifier_bot.is_none() {
        return Err(EngineError::BotNotSelected {
            mode: RunMode::Resize,
        }
        .into());
    }

    let request = RunRequest {
        mode: RunMode::Resize,
        target_count: Some(args.count),
        force_refresh: args.force_refresh,
    };
    run_request(global, request, output)
}
