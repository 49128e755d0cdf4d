//! Core domain types shared by the ranking, classification and
//! reconciliation stages.
//!
//! - [`Ticket`] is the minimal upstream view of an issue: key plus title.
//! - [`TicketLinks`] carries the two directions of the duplicate relation.
//! - [`RankedTicket`] pairs a root ticket with its total descendant count.
//! - [`LocalTicketRecord`] and [`SubmissionRecord`] are the persisted rows.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// An upstream ticket as returned by the ticket source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket {
    pub key: String,
    pub title: String,
}

impl Ticket {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
        }
    }
}

/// The duplicate links of one ticket, split by direction.
///
/// `inward` holds tickets that duplicate this one (its children);
/// `outward` holds tickets this one duplicates (its parents).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketLinks {
    pub inward: Vec<Ticket>,
    pub outward: Vec<Ticket>,
}

impl TicketLinks {
    /// True when the ticket duplicates another one and is therefore not a root.
    #[must_use]
    pub fn has_outward(&self) -> bool {
        !self.outward.is_empty()
    }
}

/// A root ticket with its total descendant count for one ranking pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedTicket {
    pub ticket: Ticket,
    pub descendant_count: usize,
}

impl RankedTicket {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.ticket.key
    }
}

/// Kind tag of a classifier backend.
///
/// `AiBotPlatform` backends update entries in place; `AlphaKnowledge`
/// backends only support delete + re-add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotKind {
    AiBotPlatform,
    AlphaKnowledge,
}

impl BotKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AiBotPlatform => "ai_bot_platform",
            Self::AlphaKnowledge => "alpha_knowledge",
        }
    }

    /// Human label used by `kbsync bots`.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::AiBotPlatform => "AI Bot Platform",
            Self::AlphaKnowledge => "Alpha Knowledge",
        }
    }
}

impl fmt::Display for BotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai_bot_platform" => Ok(Self::AiBotPlatform),
            "alpha_knowledge" => Ok(Self::AlphaKnowledge),
            other => Err(format!("unknown bot kind '{other}'")),
        }
    }
}

/// Last action recorded for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionAction {
    Add,
    Update,
}

impl SubmissionAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
        }
    }
}

impl FromStr for SubmissionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "update" => Ok(Self::Update),
            other => Err(format!("unknown submission action '{other}'")),
        }
    }
}

/// Locally persisted state for one processed ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalTicketRecord {
    pub ticket_key: String,
    pub summary: String,
    /// Descendant count at the time the summary was generated.
    pub child_count: usize,
    /// SHA-256 of `summary`; always written together with it.
    pub summary_hash: String,
    pub created_at_us: i64,
    pub updated_at_us: i64,
    pub bot_response_received: bool,
    pub processed_version: i64,
}

/// What the local store knows about one entry in one remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionRecord {
    pub ticket_key: String,
    pub bot_name: String,
    pub bot_kind: BotKind,
    /// Document id or knowledge-entry id, depending on `bot_kind`.
    pub remote_id: Option<String>,
    pub summary_text: String,
    pub summary_hash: String,
    pub action: SubmissionAction,
    pub status: String,
    pub submitted_at_us: i64,
}

/// Hex-encoded SHA-256 of a summary text.
#[must_use]
pub fn summary_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_hash_matches_known_vector() {
        assert_eq!(
            summary_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn summary_hash_changes_with_text() {
        assert_ne!(summary_hash("Fix login bug"), summary_hash("Fix login bug."));
    }

    #[test]
    fn bot_kind_round_trips_through_str() {
        for kind in [BotKind::AiBotPlatform, BotKind::AlphaKnowledge] {
            assert_eq!(kind.as_str().parse::<BotKind>(), Ok(kind));
        }
        assert!("chatgpt".parse::<BotKind>().is_err());
    }

    #[test]
    fn outward_links_mark_non_root() {
        let mut links = TicketLinks::default();
        assert!(!links.has_outward());
        links.outward.push(Ticket::new("FB-1", "parent"));
        assert!(links.has_outward());
    }
}
