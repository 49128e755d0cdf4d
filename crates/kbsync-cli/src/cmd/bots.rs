//! `kbsync bots`: list configured bots.

use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use kbsync_core::config::{BotConfig, DEFAULT_SUMMARIZER};
use kbsync_core::model::BotKind;
use serde::Serialize;

use super::GlobalArgs;
use crate::output::{self, OutputMode, render};

/// Arguments for `kbsync bots`.
#[derive(Args, Debug, Default)]
pub struct BotsArgs {}

#[derive(Debug, Serialize)]
struct BotEntry {
    name: String,
    kind: BotKind,
    url: String,
    /// Entries are rewritten in place rather than deleted and re-added.
    updates_in_place: bool,
}

#[derive(Debug, Serialize)]
struct BotsOutput {
    classifiers: Vec<BotEntry>,
    summarizers: Vec<BotEntry>,
    /// True when no `default` summarizer is configured.
    simulated_default: bool,
}

fn entries(bots: &BTreeMap<String, BotConfig>) -> Vec<BotEntry> {
    bots.iter()
        .map(|(name, bot)| BotEntry {
            name: name.clone(),
            kind: bot.kind(),
            url: bot.url().to_string(),
            updates_in_place: super::build_backend(name, bot).in_place().is_some(),
        })
        .collect()
}

/// Execute `kbsync bots`.
pub fn run_bots(_args: &BotsArgs, global: &GlobalArgs, output: OutputMode) -> Result<()> {
    let config = global.load_config()?;
    let listing = BotsOutput {
        classifiers: entries(&config.classifiers),
        summarizers: entries(&config.summarizers),
        simulated_default: !config.summarizers.contains_key(DEFAULT_SUMMARIZER),
    };
    render(output, &listing, render_bots)
}

fn render_bots(listing: &BotsOutput, w: &mut dyn Write) -> io::Result<()> {
    output::section(w, "Classifiers")?;
    if listing.classifiers.is_empty() {
        writeln!(w, "  (none)")?;
    }
    for bot in &listing.classifiers {
        let mode = if bot.updates_in_place {
            "update-in-place"
        } else {
            "delete+add"
        };
        writeln!(w, "  {:<16} {:<20} {mode}", bot.name, bot.kind.display_name())?;
    }

    writeln!(w)?;
    output::section(w, "Summarizers")?;
    for bot in &listing.summarizers {
        writeln!(w, "  {:<16} {}", bot.name, bot.kind.display_name())?;
    }
    if listing.simulated_default {
        writeln!(w, "  {DEFAULT_SUMMARIZER:<16} simulated")?;
    }
    Ok(())
}
