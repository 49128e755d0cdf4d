//! Shared output layer for human/JSON parity across CLI commands.
//!
//! Every command handler receives an [`OutputMode`]: human text on stdout, or
//! one pretty-printed JSON document. Errors go to stderr in the same mode.

use std::io::{self, Write};

use kbsync_core::backend::BackendError;
use kbsync_core::config::ConfigError;
use kbsync_core::db::StoreError;
use kbsync_core::engine::EngineError;
use kbsync_core::error::ErrorCode;
use kbsync_core::source::SourceError;
use serde::Serialize;

/// Shared width for human separators.
pub const RULE_WIDTH: usize = 60;

/// Write a horizontal separator.
pub fn rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    rule(w)
}

/// Render a left-aligned key/value line.
pub fn kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Stable `E####` code when the failure maps onto one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }

    /// Build from an error chain, picking up the code of the first typed
    /// kbsync error found in it.
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        let mut cli_error = Self::new(format!("{error:#}"));
        if let Some(code) = error_code(error) {
            cli_error.error_code = Some(code.code().to_string());
            cli_error.suggestion = code.hint().map(str::to_string);
        }
        cli_error
    }
}

fn error_code(error: &anyhow::Error) -> Option<ErrorCode> {
    error.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<EngineError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<StoreError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<SourceError>() {
            Some(e.code())
        } else {
            cause.downcast_ref::<BackendError>().map(BackendError::code)
        }
    })
}

/// Render a serializable value to stdout in the requested format.
///
/// In JSON mode the value is serialized with `serde_json`; otherwise
/// `human_fn` writes the text form.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if mode.is_json() {
        serde_json::to_writer_pretty(&mut out, value)?;
        writeln!(out)?;
    } else {
        human_fn(value, &mut out)?;
    }
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Human => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_carry_their_code_through_context() {
        let error = anyhow::Error::new(ConfigError::MissingField("jira.server".to_string()))
            .context("failed to load config");
        let cli_error = CliError::from_anyhow(&error);
        assert_eq!(cli_error.error_code.as_deref(), Some("E1003"));
        assert!(cli_error.message.contains("jira.server"));
        assert!(cli_error.suggestion.is_some());
    }

    #[test]
    fn untyped_errors_have_no_code() {
        let cli_error = CliError::from_anyhow(&anyhow::anyhow!("boom"));
        assert!(cli_error.error_code.is_none());
        assert_eq!(cli_error.message, "boom");
    }

    #[test]
    fn kv_pads_keys() {
        let mut buf = Vec::new();
        kv(&mut buf, "added", "3").expect("write");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "added:         3\n");
    }
}
