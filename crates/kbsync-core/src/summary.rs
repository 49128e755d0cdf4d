//! Rollup summary generation.
//!
//! A summary is produced from a flattened prompt of the root ticket plus its
//! whole descendant tree, sent to a [`TextGenerator`] under the run's retry
//! policy. When every attempt fails the raw root title is used instead; the
//! classifier recognizes that fallback on the next run and retries it.

use crate::error::ErrorCode;
use crate::hierarchy::{WalkEntry, depth_label};
use crate::model::Ticket;
use crate::retry::{RetryOutcome, RetryPolicy};

/// Maximum length of content submitted to a classifier backend.
pub const CLASSIFIER_CONTENT_LIMIT: usize = 2000;

const PARENT_PREFIX: &str = "Parent Ticket Summary:";

/// Errors from a text-generation backend.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("text generation request failed: {0}")]
    Request(String),

    #[error("text generation returned an empty reply")]
    Empty,
}

impl GenerationError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::SummaryGenerationFailed
    }
}

/// An external text-generation call.
pub trait TextGenerator {
    /// Complete `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError`] on transport failure or an unusable reply.
    fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// A generated summary and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    /// True when generation failed and `text` is the raw title.
    pub fallback: bool,
    pub attempts: u32,
}

/// Build the summarization prompt for `root` and its walked descendants.
#[must_use]
pub fn build_prompt(root: &Ticket, descendants: &[WalkEntry]) -> String {
    let mut lines = Vec::with_capacity(descendants.len() + 1);
    lines.push(format!("{PARENT_PREFIX} {}", root.title));
    for entry in descendants {
        lines.push(format!(
            "{} {} Summary: {}",
            depth_label(entry.depth),
            entry.position,
            entry.ticket.title
        ));
    }
    lines.join("\n")
}

/// Drives a [`TextGenerator`] with retry and raw-title fallback.
pub struct SummaryGenerator<'a> {
    generator: &'a dyn TextGenerator,
    retry: RetryPolicy,
}

impl<'a> SummaryGenerator<'a> {
    pub fn new(generator: &'a dyn TextGenerator, retry: RetryPolicy) -> Self {
        Self { generator, retry }
    }

    /// Summarize `root` given its pre-order descendant walk.
    pub fn generate(&self, root: &Ticket, descendants: &[WalkEntry]) -> Summary {
        let prompt = build_prompt(root, descendants);
        tracing::debug!(ticket = %root.key, lines = descendants.len() + 1, "summarization prompt built");

        let outcome = self.retry.run("summarize", |_| {
            let reply = self.generator.complete(&prompt)?;
            let reply = reply.trim();
            if reply.is_empty() {
                Err(GenerationError::Empty)
            } else {
                Ok(reply.to_string())
            }
        });

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => Summary {
                text: value,
                fallback: false,
                attempts,
            },
            RetryOutcome::Exhausted { attempts, .. } => {
                tracing::warn!(
                    ticket = %root.key,
                    attempts,
                    "summarization failed; falling back to raw title"
                );
                Summary {
                    text: root.title.clone(),
                    fallback: true,
                    attempts,
                }
            }
        }
    }
}

/// Normalize a summary for submission to a classifier backend.
///
/// Collapses whitespace, strips markdown emphasis and backticks, and caps the
/// result at [`CLASSIFIER_CONTENT_LIMIT`] characters.
#[must_use]
pub fn clean_for_classifier(summary: &str) -> String {
    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = collapsed.replace("**", "").replace(['*', '`'], "");

    if cleaned.chars().count() > CLASSIFIER_CONTENT_LIMIT {
        let mut truncated: String = cleaned.chars().take(CLASSIFIER_CONTENT_LIMIT - 3).collect();
        truncated.push_str("...");
        truncated
    } else {
        cleaned
    }
}

/// Offline generator used when no summarizer credentials are configured.
///
/// Echoes the parent line and up to three direct children from the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedGenerator;

impl TextGenerator for SimulatedGenerator {
    fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut parent = "";
        let mut children = Vec::new();

        for line in prompt.lines() {
            if let Some(rest) = line.strip_prefix(PARENT_PREFIX) {
                parent = rest.trim();
            } else if line.starts_with("Child ") {
                if let Some((_, title)) = line.split_once("Summary:") {
                    children.push(title.trim());
                }
            }
        }

        let mut reply = format!("Summary: {parent}\n\n");
        if !children.is_empty() {
            reply.push_str("Key Issues:\n");
            for (i, child) in children.iter().take(3).enumerate() {
                reply.push_str(&format!("{}. {child}\n", i + 1));
            }
        }
        reply.push_str("\nThis is a simulated response generated for testing purposes.");
        Ok(reply)
    }
}
