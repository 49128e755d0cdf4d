//! `kbsync status`: what the local store holds.

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Args;
use kbsync_core::db::store::BotSubmissionCount;
use serde::Serialize;

use super::{GlobalArgs, open_store};
use crate::output::{self, OutputMode, render};

/// Arguments for `kbsync status`.
#[derive(Args, Debug, Default)]
pub struct StatusArgs {}

#[derive(Debug, Serialize)]
struct StatusOutput {
    store: String,
    tickets: usize,
    bots: Vec<BotSubmissionCount>,
}

/// Execute `kbsync status`.
pub fn run_status(_args: &StatusArgs, global: &GlobalArgs, output: OutputMode) -> Result<()> {
    let config = global.load_config()?;
    let store = open_store(&config)?;

    let status = StatusOutput {
        store: config.store.path.display().to_string(),
        tickets: store.ticket_count().context("count local tickets")?,
        bots: store
            .submission_counts()
            .context("count bot submissions")?,
    };
    render(output, &status, render_status)
}

fn render_status(status: &StatusOutput, w: &mut dyn Write) -> io::Result<()> {
    output::section(w, "kbsync status")?;
    output::kv(w, "store", &status.store)?;
    output::kv(w, "tickets", status.tickets.to_string())?;
    if status.bots.is_empty() {
        output::kv(w, "bots", "(no submissions)")?;
    }
    for bot in &status.bots {
        output::kv(
            w,
            &bot.bot_name,
            format!("{} entries ({})", bot.count, bot.bot_kind.display_name()),
        )?;
    }
    Ok(())
}
