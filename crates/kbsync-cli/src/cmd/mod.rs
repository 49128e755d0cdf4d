pub mod bots;
pub mod completions;
pub mod init;
pub mod resize;
pub mod status;
pub mod update;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use kbsync_core::backend::KnowledgeBackend;
use kbsync_core::config::{BotConfig, Config, DEFAULT_SUMMARIZER, resolve_config_path};
use kbsync_core::db::Store;
use kbsync_core::engine::{Engine, EngineOptions, RunReport, RunRequest};
use kbsync_core::summary::{SimulatedGenerator, TextGenerator};

use crate::http::alpha::{AlphaKnowledgeClient, AlphaSummarizer};
use crate::http::jira::JiraClient;
use crate::http::platform::{PlatformClassifier, PlatformSummarizer};
use crate::output::{self, OutputMode, render};

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Config file (default: ./kbsync.toml, then the user config dir).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Classifier bot to keep in sync. Without it only the local store is refreshed.
    #[arg(long, global = true, value_name = "NAME")]
    pub classifier_bot: Option<String>,

    /// Summarizer bot used to write rollups.
    #[arg(long, global = true, value_name = "NAME", default_value = DEFAULT_SUMMARIZER)]
    pub summarizer_bot: String,
}

impl GlobalArgs {
    pub fn load_config(&self) -> Result<Config> {
        let path = resolve_config_path(self.config.as_deref())?;
        Config::load(&path).with_context(|| format!("failed to load {}", path.display()))
    }
}

pub fn open_store(config: &Config) -> Result<Store> {
    Store::open(&config.store.path)
        .with_context(|| format!("failed to open store {}", config.store.path.display()))
}

pub fn build_backend(name: &str, bot: &BotConfig) -> Box<dyn KnowledgeBackend> {
    match bot {
        BotConfig::AiBotPlatform(platform) => {
            Box::new(PlatformClassifier::new(name, platform.clone()))
        }
        BotConfig::AlphaKnowledge(alpha) => Box::new(AlphaKnowledgeClient::new(name, alpha.clone())),
    }
}

/// Summarizer for the selected bot, or the offline generator when none is
/// configured or a platform bot has no secret.
pub fn build_generator(name: &str, bot: Option<&BotConfig>) -> Box<dyn TextGenerator> {
    match bot {
        Some(BotConfig::AiBotPlatform(platform)) if platform.app_secret.is_some() => {
            Box::new(PlatformSummarizer::new(platform.clone()))
        }
        Some(BotConfig::AlphaKnowledge(alpha)) => Box::new(AlphaSummarizer::new(alpha.clone())),
        Some(BotConfig::AiBotPlatform(_)) => {
            tracing::warn!(summarizer = name, "no app secret configured; using simulated summaries");
            Box::new(SimulatedGenerator)
        }
        None => {
            tracing::warn!(summarizer = name, "summarizer not configured; using simulated summaries");
            Box::new(SimulatedGenerator)
        }
    }
}

/// Resolve every bot, then run one engine request and print its report.
///
/// Config and bot selection errors surface before any ticket is touched.
pub fn run_request(global: &GlobalArgs, request: RunRequest, output: OutputMode) -> Result<()> {
    let config = global.load_config()?;
    let classifier = global
        .classifier_bot
        .as_deref()
        .map(|name| config.classifier(name).map(|bot| build_backend(name, bot)))
        .transpose()?;
    let summarizer = config.summarizer(&global.summarizer_bot)?;
    let generator = build_generator(&global.summarizer_bot, summarizer);

    let source = JiraClient::new(&config.jira);
    let mut store = open_store(&config)?;

    let mut options = EngineOptions::new(config.jira.parent_query.clone());
    options.page_size = config.jira.page_size;
    options.retry = config.retry.policy();
    options.citation_base = Some(config.jira.server.trim_end_matches('/').to_string());

    let report = Engine::new(
        &source,
        generator.as_ref(),
        classifier.as_deref(),
        &mut store,
        options,
    )
    .run(request)?;

    render(output, &report, |report, w| render_report(report, &config.store.path, w))
}

fn render_report(report: &RunReport, store_path: &Path, w: &mut dyn Write) -> io::Result<()> {
    let mode = report
        .mode
        .map_or_else(|| "run".to_string(), |mode| mode.to_string());
    output::section(w, &format!("kbsync {mode}"))?;
    output::kv(w, "bot", report.bot.as_deref().unwrap_or("(local only)"))?;
    output::kv(w, "store", store_path.display().to_string())?;
    if let Some(target) = report.target_count {
        output::kv(w, "target", target.to_string())?;
    }
    output::kv(w, "candidates", report.total.to_string())?;
    output::kv(w, "processed", report.processed.to_string())?;
    if report.bot.is_some() {
        output::kv(w, "added", report.added.to_string())?;
        output::kv(w, "updated", report.updated.to_string())?;
        output::kv(w, "removed", report.removed.to_string())?;
    }
    output::kv(w, "skipped", report.skipped.to_string())?;
    output::kv(w, "failed", report.failed.to_string())?;
    if let Some(count) = report.final_count {
        output::kv(w, "entries", count.to_string())?;
    }
    output::kv(w, "duration", format!("{} ms", report.duration.as_millis()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbsync_core::config::{AlphaBotConfig, PlatformBotConfig};
    use kbsync_core::engine::RunMode;
    use kbsync_core::model::BotKind;
    use std::time::Duration;

    fn platform(secret: Option<&str>) -> BotConfig {
        BotConfig::AiBotPlatform(PlatformBotConfig {
            url: "http://localhost:1/bot".to_string(),
            app_id: "app".to_string(),
            user_email: "bot@example.com".to_string(),
            app_secret: secret.map(str::to_string),
        })
    }

    #[test]
    fn backend_kind_follows_config() {
        let alpha = BotConfig::AlphaKnowledge(AlphaBotConfig {
            url: "http://localhost:1".to_string(),
            expert_id: "7".to_string(),
            api_key: "key".to_string(),
        });
        assert_eq!(build_backend("kb", &alpha).kind(), BotKind::AlphaKnowledge);
        assert_eq!(
            build_backend("support", &platform(Some("s"))).kind(),
            BotKind::AiBotPlatform
        );
        assert_eq!(build_backend("support", &platform(None)).name(), "support");
    }

    #[test]
    fn only_platform_backends_update_in_place() {
        let alpha = BotConfig::AlphaKnowledge(AlphaBotConfig {
            url: "http://localhost:1".to_string(),
            expert_id: "7".to_string(),
            api_key: "key".to_string(),
        });
        assert!(build_backend("kb", &alpha).in_place().is_none());
        assert!(build_backend("support", &platform(Some("s"))).in_place().is_some());
    }

    #[test]
    fn secretless_platform_summarizer_is_simulated() {
        let generator = build_generator("default", Some(&platform(None)));
        let reply = generator
            .complete("Parent Ticket Summary: Login fails")
            .expect("simulated");
        assert!(reply.starts_with("Summary: Login fails"));
    }

    #[test]
    fn report_lists_sync_counts_only_with_a_bot() {
        let mut report = RunReport {
            mode: Some(RunMode::Update),
            total: 4,
            processed: 2,
            duration: Duration::from_millis(12),
            ..RunReport::default()
        };
        let mut buf = Vec::new();
        render_report(&report, Path::new("kbsync.db"), &mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("kbsync update\n"));
        assert!(text.contains("(local only)"));
        assert!(!text.contains("added:"));

        report.bot = Some("support".to_string());
        report.final_count = Some(3);
        let mut buf = Vec::new();
        render_report(&report, Path::new("kbsync.db"), &mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("added:"));
        assert!(text.contains("entries:       3"));
    }
}
