//! `kbsync update`: incremental refresh.

use anyhow::Result;
use clap::Args;
use kbsync_core::engine::{RunMode, RunRequest};

use super::{GlobalArgs, run_request};
use crate::output::OutputMode;

/// Arguments for `kbsync update`.
#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Grow the bot to at least N entries. Existing entries are never removed.
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Regenerate and resubmit every selected ticket.
    #[arg(long)]
    pub force_refresh: bool,
}

/// Execute `kbsync update`.
pub fn run_update(args: &UpdateArgs, global: &GlobalArgs, output: OutputMode) -> Result<()> {
    let request = RunRequest {
        mode: RunMode::Update,
        target_count: args.limit,
        force_refresh: args.force_refresh,
    };
    run_request(global, request, output)
}
