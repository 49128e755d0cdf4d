//! TOML configuration.
//!
//! Lookup order for the config file: an explicit `--config` path, then
//! `kbsync.toml` in the working directory, then
//! `<config_dir>/kbsync/config.toml`. Secrets may be left out of the file and
//! supplied through the environment instead.
//!
//! Everything is validated up front; a bad config never reaches a run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::model::BotKind;
use crate::retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use crate::source::DEFAULT_PAGE_SIZE;

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "kbsync.toml";

/// Summarizer name that may be absent from the config.
pub const DEFAULT_SUMMARIZER: &str = "default";

pub const JIRA_PASSWORD_ENV: &str = "KBSYNC_JIRA_PASSWORD";
pub const SUMMARIZER_SECRET_ENV: &str = "SUMMARIZER_BOT_APP_SECRET";
pub const CLASSIFIER_SECRET_ENV: &str = "CLASSIFIER_BOT_APP_SECRET";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required config field `{0}`")]
    MissingField(String),

    #[error("unknown {role} bot '{name}' (configured: {known})")]
    UnknownBot {
        role: &'static str,
        name: String,
        known: String,
    },
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } | Self::Read { .. } => ErrorCode::ConfigMissing,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::MissingField(_) => ErrorCode::ConfigFieldMissing,
            Self::UnknownBot { .. } => ErrorCode::UnknownBot,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub jira: JiraConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub summarizers: BTreeMap<String, BotConfig>,
    #[serde(default)]
    pub classifiers: BTreeMap<String, BotConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub verify: bool,
    #[serde(default)]
    pub parent_query: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl JiraConfig {
    /// Browse URL of a ticket, used as the citation of knowledge entries.
    #[must_use]
    pub fn browse_url(&self, ticket_key: &str) -> String {
        format!("{}/browse/{ticket_key}", self.server.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

/// One summarizer or classifier bot, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BotConfig {
    AiBotPlatform(PlatformBotConfig),
    AlphaKnowledge(AlphaBotConfig),
}

impl BotConfig {
    #[must_use]
    pub const fn kind(&self) -> BotKind {
        match self {
            Self::AiBotPlatform(_) => BotKind::AiBotPlatform,
            Self::AlphaKnowledge(_) => BotKind::AlphaKnowledge,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::AiBotPlatform(bot) => &bot.url,
            Self::AlphaKnowledge(bot) => &bot.url,
        }
    }

    fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        match self {
            Self::AiBotPlatform(bot) => {
                require(prefix, "url", &bot.url)?;
                require(prefix, "app_id", &bot.app_id)?;
                require(prefix, "user_email", &bot.user_email)
            }
            Self::AlphaKnowledge(bot) => {
                require(prefix, "url", &bot.url)?;
                require(prefix, "expert_id", &bot.expert_id)?;
                require(prefix, "api_key", &bot.api_key)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformBotConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default, skip_serializing)]
    pub app_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaBotConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub expert_id: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
}

const fn default_true() -> bool {
    true
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_store_path() -> PathBuf {
    PathBuf::from("kbsync.db")
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_base_delay_ms() -> u64 {
    1000
}

fn require(prefix: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::MissingField(format!("{prefix}.{field}")))
    } else {
        Ok(())
    }
}

/// Env var holding the app secret of one platform classifier.
#[must_use]
pub fn classifier_secret_env(bot_name: &str) -> String {
    let name: String = bot_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("CLASSIFIER_BOT_{name}_APP_SECRET")
}

/// Pick the config file to load.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] when no candidate exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            })
        };
    }

    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Ok(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let user = config_dir.join("kbsync/config.toml");
        if user.exists() {
            return Ok(user);
        }
    }

    Err(ConfigError::NotFound { path: local })
}

impl Config {
    /// Read, parse, resolve env secrets and validate the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on any read, parse or validation failure.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content, path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            classifiers = config.classifiers.len(),
            summarizers = config.summarizers.len(),
            "config loaded"
        );
        Ok(config)
    }

    /// Parse TOML without touching the environment or validating.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fill secrets missing from the file from `lookup` (normally the process env).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.jira.password.is_none() {
            self.jira.password = lookup(JIRA_PASSWORD_ENV);
        }

        for bot in self.summarizers.values_mut() {
            if let BotConfig::AiBotPlatform(platform) = bot {
                if platform.app_secret.is_none() {
                    platform.app_secret = lookup(SUMMARIZER_SECRET_ENV);
                }
            }
        }

        for (name, bot) in &mut self.classifiers {
            if let BotConfig::AiBotPlatform(platform) = bot {
                if platform.app_secret.is_none() {
                    platform.app_secret = lookup(&classifier_secret_env(name))
                        .or_else(|| lookup(CLASSIFIER_SECRET_ENV));
                }
            }
        }
    }

    /// Check every required field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the first missing field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("jira", "server", &self.jira.server)?;
        require("jira", "username", &self.jira.username)?;
        require(
            "jira",
            "password",
            self.jira.password.as_deref().unwrap_or_default(),
        )?;
        require("jira", "parent_query", &self.jira.parent_query)?;

        for (name, bot) in &self.summarizers {
            bot.validate(&format!("summarizers.{name}"))?;
        }
        for (name, bot) in &self.classifiers {
            bot.validate(&format!("classifiers.{name}"))?;
        }
        Ok(())
    }

    /// Look up a classifier bot by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBot`] when `name` is not configured.
    pub fn classifier(&self, name: &str) -> Result<&BotConfig, ConfigError> {
        self.classifiers
            .get(name)
            .ok_or_else(|| unknown("classifier", name, &self.classifiers))
    }

    /// Look up a summarizer bot by name.
    ///
    /// The default summarizer may be absent; callers then fall back to the
    /// simulated generator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBot`] for any other missing name.
    pub fn summarizer(&self, name: &str) -> Result<Option<&BotConfig>, ConfigError> {
        match self.summarizers.get(name) {
            Some(bot) => Ok(Some(bot)),
            None if name == DEFAULT_SUMMARIZER => Ok(None),
            None => Err(unknown("summarizer", name, &self.summarizers)),
        }
    }
}

fn unknown(role: &'static str, name: &str, known: &BTreeMap<String, BotConfig>) -> ConfigError {
    let known = if known.is_empty() {
        "none".to_string()
    } else {
        known.keys().cloned().collect::<Vec<_>>().join(", ")
    };
    ConfigError::UnknownBot {
        role,
        name: name.to_string(),
        known,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[jira]
server = "https://jira.example.com/"
username = "bot"
parent_query = "project = FB"

[retry]
base_delay_ms = 0

[summarizers.default]
kind = "ai_bot_platform"
url = "https://bots.example.com/ask"
app_id = "summ"
user_email = "bot@example.com"

[classifiers.support]
kind = "alpha_knowledge"
url = "https://alpha.example.com/api"
expert_id = "77"
api_key = "k"

[classifiers.triage-bot]
kind = "ai_bot_platform"
url = "https://bots.example.com/cmd"
app_id = "cls"
user_email = "bot@example.com"
"#;

    fn parse() -> Config {
        Config::parse(SAMPLE, Path::new("kbsync.toml")).expect("parse sample")
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let config = parse();
        assert!(config.jira.verify);
        assert_eq!(config.jira.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.store.path, PathBuf::from("kbsync.db"));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.policy(), RetryPolicy::immediate(3));
    }

    #[test]
    fn password_is_required_after_env_resolution() {
        let mut config = parse();
        config.apply_env(env(&[]));
        let err = config.validate().expect_err("password missing");
        assert_eq!(err.code(), ErrorCode::ConfigFieldMissing);
        assert!(err.to_string().contains("jira.password"));

        config.apply_env(env(&[(JIRA_PASSWORD_ENV, "pw")]));
        config.validate().expect("valid with env password");
    }

    #[test]
    fn classifier_secret_prefers_bot_specific_env() {
        let mut config = parse();
        config.apply_env(env(&[
            ("CLASSIFIER_BOT_TRIAGE_BOT_APP_SECRET", "specific"),
            (CLASSIFIER_SECRET_ENV, "generic"),
            (SUMMARIZER_SECRET_ENV, "summ-secret"),
        ]));

        let BotConfig::AiBotPlatform(triage) = config.classifier("triage-bot").expect("bot") else {
            panic!("expected platform bot");
        };
        assert_eq!(triage.app_secret.as_deref(), Some("specific"));

        let Some(BotConfig::AiBotPlatform(summ)) = config.summarizer("default").expect("lookup")
        else {
            panic!("expected platform summarizer");
        };
        assert_eq!(summ.app_secret.as_deref(), Some("summ-secret"));
    }

    #[test]
    fn unknown_classifier_lists_known_names() {
        let config = parse();
        let err = config.classifier("sales").expect_err("unknown");
        assert_eq!(err.code(), ErrorCode::UnknownBot);
        assert!(err.to_string().contains("support, triage-bot"));
    }

    #[test]
    fn missing_default_summarizer_is_allowed() {
        let mut config = parse();
        config.summarizers.clear();
        assert!(config.summarizer("default").expect("lookup").is_none());
        assert!(config.summarizer("fancy").is_err());
    }

    #[test]
    fn alpha_bot_requires_api_key() {
        let content = SAMPLE.replace("api_key = \"k\"", "");
        let mut config = Config::parse(&content, Path::new("kbsync.toml")).expect("parse");
        config.apply_env(env(&[(JIRA_PASSWORD_ENV, "pw")]));
        let err = config.validate().expect_err("api key missing");
        assert!(err.to_string().contains("classifiers.support.api_key"));
    }

    #[test]
    fn browse_url_strips_trailing_slash() {
        assert_eq!(
            parse().jira.browse_url("FB-12"),
            "https://jira.example.com/browse/FB-12"
        );
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kbsync.toml");
        let content = SAMPLE.replace("username = \"bot\"", "username = \"bot\"\npassword = \"pw\"");
        std::fs::write(&path, content).expect("write config");

        let config = Config::load(&path).expect("load");
        assert_eq!(config.classifiers.len(), 2);
        assert_eq!(
            config.classifier("support").expect("bot").kind(),
            BotKind::AlphaKnowledge
        );
    }

    #[test]
    fn explicit_missing_path_is_not_found() {
        let err = resolve_config_path(Some(Path::new("/nonexistent/kbsync.toml")))
            .expect_err("missing");
        assert_eq!(err.code(), ErrorCode::ConfigMissing);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = Config::parse("[jira", Path::new("bad.toml")).expect_err("parse error");
        assert_eq!(err.code(), ErrorCode::ConfigParseError);
    }
}
