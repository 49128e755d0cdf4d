//! `kbsync init`: rebuild the knowledge base from scratch.

use anyhow::Result;
use clap::Args;
use kbsync_core::engine::{RunMode, RunRequest};

use super::{GlobalArgs, run_request};
use crate::output::OutputMode;

/// Arguments for `kbsync init`.
#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Keep only the N highest-ranked root tickets.
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Accepted for symmetry with `update`; init always regenerates every summary.
    #[arg(long)]
    pub force_refresh: bool,
}

/// Execute `kbsync init`.
pub fn run_init(args: &InitArgs, global: &GlobalArgs, output: OutputMode) -> Result<()> {
    let request = RunRequest {
        mode: RunMode::Init,
        target_count: args.limit,
        force_refresh: args.force_refresh,
    };
    run_request(global, request, output)
}
