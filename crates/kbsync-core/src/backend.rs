//! Knowledge backend seam.
//!
//! Every backend can add and delete entries. Backends that can also rewrite
//! an entry in place expose it through [`KnowledgeBackend::in_place`]; for the
//! rest the reconciler replaces a changed entry by delete + add.
//!
//! The concrete HTTP clients live in `kbsync-cli`. A backend is built once
//! from config and keeps its capabilities for the whole run.

use crate::error::ErrorCode;
use crate::model::BotKind;

/// Errors surfaced by a knowledge backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Transport failure, timeout or a server-side status. Worth retrying.
    #[error("{operation} request failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    /// The backend refused the call. Sending it again gives the same answer.
    #[error("{operation} rejected: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
}

impl BackendError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Request { .. } => ErrorCode::BackendRequestFailed,
            Self::Rejected { .. } => ErrorCode::BackendRejected,
        }
    }

    /// True when another attempt may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Request { .. })
    }
}

/// One entry as submitted to a knowledge backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeEntry {
    pub ticket_key: String,
    pub title: String,
    /// Cleaned summary text, see [`crate::summary::clean_for_classifier`].
    pub content: String,
    pub citation_url: Option<String>,
}

/// A remote knowledge index for one configured bot.
pub trait KnowledgeBackend {
    /// Configured bot name, used as the submission key.
    fn name(&self) -> &str;

    fn kind(&self) -> BotKind;

    /// Create an entry.
    ///
    /// `Ok(None)` means the backend accepted the entry but returned no usable
    /// id. The entry exists remotely and must not be sent again.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the entry was not created.
    fn add(&self, entry: &KnowledgeEntry) -> Result<Option<String>, BackendError>;

    /// Delete an entry. Deleting an id the backend no longer knows succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] on transport failure or rejection.
    fn delete(&self, remote_id: &str) -> Result<(), BackendError>;

    /// In-place rewriting, when the backend supports it.
    fn in_place(&self) -> Option<&dyn InPlaceUpdate>;
}

/// Rewrites an existing entry without changing its place in the index.
pub trait InPlaceUpdate {
    /// Rewrite `remote_id` with `entry` and return its (possibly new) id.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] on transport failure or rejection.
    fn update(&self, remote_id: &str, entry: &KnowledgeEntry) -> Result<String, BackendError>;
}
