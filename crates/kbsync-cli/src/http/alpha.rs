//! Alpha Knowledge clients.
//!
//! Knowledge entries are uploaded as markdown files under
//! `/experts/{id}/knowledges`; there is no update call, so the reconciler
//! replaces entries by delete + add. Summaries come from the expert's chat
//! completions endpoint.

use kbsync_core::backend::{BackendError, InPlaceUpdate, KnowledgeBackend, KnowledgeEntry};
use kbsync_core::config::AlphaBotConfig;
use kbsync_core::model::BotKind;
use kbsync_core::summary::{GenerationError, TextGenerator};
use serde_json::{Value, json};

use super::{GENERATION_TIMEOUT, REQUEST_TIMEOUT, agent, backend_error, describe, join_url};

const BOUNDARY: &str = "kbsync-knowledge-upload-boundary";

/// Atomic-replace knowledge backend.
pub struct AlphaKnowledgeClient {
    name: String,
    config: AlphaBotConfig,
    agent: ureq::Agent,
}

impl AlphaKnowledgeClient {
    pub fn new(name: impl Into<String>, config: AlphaBotConfig) -> Self {
        Self {
            name: name.into(),
            config,
            agent: agent(REQUEST_TIMEOUT),
        }
    }

    fn knowledges_url(&self) -> String {
        join_url(
            &self.config.url,
            &format!("experts/{}/knowledges", self.config.expert_id),
        )
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.config.api_key)
    }
}

impl KnowledgeBackend for AlphaKnowledgeClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BotKind {
        BotKind::AlphaKnowledge
    }

    fn add(&self, entry: &KnowledgeEntry) -> Result<Option<String>, BackendError> {
        let added_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let body = multipart_body(entry, &markdown(entry, &added_at));
        tracing::debug!(bot = %self.name, ticket = %entry.ticket_key, "uploading knowledge");

        let response = self
            .agent
            .post(&self.knowledges_url())
            .set("Authorization", &self.bearer())
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .send_bytes(body.as_bytes())
            .map_err(|err| backend_error("add", err))?;

        match response.into_json::<Value>() {
            Ok(reply) => Ok(knowledge_id(&reply)),
            Err(err) => {
                tracing::warn!(
                    bot = %self.name,
                    ticket = %entry.ticket_key,
                    error = %err,
                    "unreadable upload reply"
                );
                Ok(None)
            }
        }
    }

    fn delete(&self, remote_id: &str) -> Result<(), BackendError> {
        let url = format!("{}/{remote_id}", self.knowledges_url());
        match self
            .agent
            .delete(&url)
            .set("Authorization", &self.bearer())
            .call()
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(404, _)) => {
                tracing::debug!(bot = %self.name, remote_id, "knowledge entry already gone");
                Ok(())
            }
            Err(err) => Err(backend_error("delete", err)),
        }
    }

    fn in_place(&self) -> Option<&dyn InPlaceUpdate> {
        None
    }
}

/// Id of an uploaded knowledge entry; the API returns it as a number.
pub fn knowledge_id(body: &Value) -> Option<String> {
    match &body["id"] {
        Value::Number(id) => Some(id.to_string()),
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        _ => None,
    }
}

fn citation_title(entry: &KnowledgeEntry) -> String {
    format!("JIRA Ticket {}", entry.ticket_key)
}

/// Markdown document uploaded for one entry.
pub fn markdown(entry: &KnowledgeEntry, added_at: &str) -> String {
    let title = citation_title(entry);
    let mut doc = format!("# {title}\n\n## Content\n\n{}\n\n## Source\n\n", entry.content.trim());
    if let Some(url) = &entry.citation_url {
        doc.push_str(&format!("- **Citation**: [{title}]({url})\n"));
    }
    doc.push_str(&format!("- **Added**: {added_at}\n\n---\n"));
    doc.push_str("*This knowledge entry was generated from a JIRA ticket summary.*\n");
    doc
}

fn multipart_body(entry: &KnowledgeEntry, markdown: &str) -> String {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}.md\"\r\nContent-Type: text/markdown\r\n\r\n{markdown}\r\n",
        entry.ticket_key
    );
    let mut field = |name: &str, value: &str| {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    };
    if let Some(url) = &entry.citation_url {
        field("citation_url", url);
    }
    field("citation_title", &citation_title(entry));
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}

/// Summarizer backed by an expert's chat completions endpoint.
pub struct AlphaSummarizer {
    config: AlphaBotConfig,
    agent: ureq::Agent,
}

impl AlphaSummarizer {
    pub fn new(config: AlphaBotConfig) -> Self {
        Self {
            config,
            agent: agent(GENERATION_TIMEOUT),
        }
    }
}

impl TextGenerator for AlphaSummarizer {
    fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = join_url(
            &self.config.url,
            &format!("experts/{}/v2/chat/completions", self.config.expert_id),
        );
        let body = json!({
            "messages": [{"role": "user", "content": prompt}],
            "user": "kbsync",
            "stream": false,
        });

        let response = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.config.api_key))
            .send_json(body)
            .map_err(|err| GenerationError::Request(describe(err)))?;
        let reply: Value = response
            .into_json()
            .map_err(|err| GenerationError::Request(format!("invalid JSON response: {err}")))?;

        completion_text(&reply).ok_or(GenerationError::Empty)
    }
}

/// `choices[0].message.content`, trimmed, when non-empty.
pub fn completion_text(body: &Value) -> Option<String> {
    let text = body["choices"][0]["message"]["content"].as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}
