//! AI-bot-platform clients.
//!
//! Every call is a JSON POST to the bot URL carrying the app credentials.
//! Classifier bots take a `message_content` command (`add: …`, `update: …`,
//! `delete: <doc id>`) and rewrite entries in place; summarizer bots take a
//! `question` and answer with a `reply`.

use std::cell::Cell;

use kbsync_core::backend::{BackendError, InPlaceUpdate, KnowledgeBackend, KnowledgeEntry};
use kbsync_core::config::PlatformBotConfig;
use kbsync_core::model::BotKind;
use kbsync_core::summary::{GenerationError, TextGenerator};
use serde_json::{Value, json};

use super::{GENERATION_TIMEOUT, REQUEST_TIMEOUT, agent, backend_error, describe};

fn post(agent: &ureq::Agent, url: &str, body: &Value) -> Result<Value, String> {
    let response = agent.post(url).send_json(body).map_err(describe)?;
    response
        .into_json::<Value>()
        .map_err(|err| format!("invalid JSON response: {err}"))
}

/// Document id of an add or update reply.
pub fn extract_doc_id(body: &Value) -> Option<String> {
    ["doc_id", "document_id"].iter().find_map(|field| match &body[*field] {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

/// Update-capable knowledge backend.
pub struct PlatformClassifier {
    name: String,
    config: PlatformBotConfig,
    agent: ureq::Agent,
}

impl PlatformClassifier {
    pub fn new(name: impl Into<String>, config: PlatformBotConfig) -> Self {
        Self {
            name: name.into(),
            config,
            agent: agent(REQUEST_TIMEOUT),
        }
    }

    /// Send one command. The reply is `None` when the bot accepted the
    /// command but its body was not JSON.
    fn command(
        &self,
        operation: &'static str,
        message: String,
        doc_id: Option<&str>,
    ) -> Result<Option<Value>, BackendError> {
        let mut body = json!({
            "app_id": self.config.app_id,
            "user_email": self.config.user_email,
            "app_secret": self.config.app_secret.as_deref().unwrap_or_default(),
            "message_content": message,
        });
        if let Some(doc_id) = doc_id {
            body["doc_id"] = Value::String(doc_id.to_string());
        }

        tracing::debug!(bot = %self.name, operation, "sending classifier command");
        let response = self
            .agent
            .post(&self.config.url)
            .send_json(&body)
            .map_err(|err| backend_error(operation, err))?;
        match response.into_json::<Value>() {
            Ok(reply) => Ok(Some(reply)),
            Err(err) => {
                tracing::warn!(bot = %self.name, operation, error = %err, "unreadable reply");
                Ok(None)
            }
        }
    }
}

impl KnowledgeBackend for PlatformClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BotKind {
        BotKind::AiBotPlatform
    }

    fn add(&self, entry: &KnowledgeEntry) -> Result<Option<String>, BackendError> {
        let reply = self.command("add", format!("add: {}", entry.content), None)?;
        Ok(reply.as_ref().and_then(extract_doc_id))
    }

    fn delete(&self, remote_id: &str) -> Result<(), BackendError> {
        self.command("delete", format!("delete: {remote_id}"), None)
            .map(|_| ())
    }

    fn in_place(&self) -> Option<&dyn InPlaceUpdate> {
        Some(self)
    }
}

impl InPlaceUpdate for PlatformClassifier {
    fn update(&self, remote_id: &str, entry: &KnowledgeEntry) -> Result<String, BackendError> {
        let reply = self.command(
            "update",
            format!("update: {}", entry.content),
            Some(remote_id),
        )?;
        Ok(reply
            .as_ref()
            .and_then(extract_doc_id)
            .unwrap_or_else(|| remote_id.to_string()))
    }
}

/// Summarizer answering a `question` with a `reply`.
pub struct PlatformSummarizer {
    config: PlatformBotConfig,
    agent: ureq::Agent,
    requests: Cell<u64>,
}

impl PlatformSummarizer {
    pub fn new(config: PlatformBotConfig) -> Self {
        Self {
            config,
            agent: agent(GENERATION_TIMEOUT),
            requests: Cell::new(0),
        }
    }

    fn next_request_id(&self) -> String {
        let sequence = self.requests.get() + 1;
        self.requests.set(sequence);
        format!(
            "kbsync-{}-{sequence}",
            chrono::Utc::now().timestamp_micros()
        )
    }
}

impl TextGenerator for PlatformSummarizer {
    fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = json!({
            "app_id": self.config.app_id,
            "user_email": self.config.user_email,
            "app_secret": self.config.app_secret.as_deref().unwrap_or_default(),
            "request_id": self.next_request_id(),
            "question": prompt,
        });

        let reply = post(&self.agent, &self.config.url, &body).map_err(GenerationError::Request)?;
        let text = reply["reply"].as_str().unwrap_or_default().trim();
        if text.is_empty() {
            Err(GenerationError::Empty)
        } else {
            Ok(text.to_string())
        }
    }
}
