//! Remote sync reconciliation.
//!
//! [`plan`] is a pure diff of a target set against the submissions recorded
//! for one bot. [`Reconciler::execute`] carries a plan out against a
//! [`KnowledgeBackend`], keeping `bot_submissions` in step.
//!
//! # Execution order
//!
//! Removals first, then additions, then updates. Every remote call runs under
//! the reconciler's [`RetryPolicy`]; only transient errors are retried. A
//! failed call is a per-ticket failure and never aborts the batch.
//!
//! # Local record policy
//!
//! - A removal always drops the local submission, whether the remote delete
//!   succeeded, failed, or could not be attempted for lack of a remote id.
//! - A successful add writes a submission with the new remote id and the hash
//!   of the full (uncleaned) summary. An add the backend accepted without an
//!   id is recorded with no remote id; a later removal drops it.
//! - A replace whose delete went through but whose re-add failed drops the
//!   submission, since nothing remains remotely.
//! - An update is skipped when the new summary hash equals the recorded one.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::backend::{BackendError, InPlaceUpdate, KnowledgeBackend, KnowledgeEntry};
use crate::classify::change_reason;
use crate::db::Store;
use crate::error::ErrorCode;
use crate::model::{LocalTicketRecord, RankedTicket, SubmissionAction, SubmissionRecord, summary_hash};
use crate::retry::RetryPolicy;
use crate::summary::clean_for_classifier;

/// Status written to submissions after a successful remote call.
pub const STATUS_SUBMITTED: &str = "submitted";

/// How removals and additions are bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ReconcileMode {
    /// Converge on exactly the target set: remove everything outside it.
    Exact,
    /// Grow toward `target_count` without removing anything.
    Additive { target_count: usize },
}

/// The diff computed by [`plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_remove: Vec<SubmissionRecord>,
    pub to_add: Vec<RankedTicket>,
    pub to_update: Vec<(RankedTicket, SubmissionRecord)>,
    /// Target members already remote and not in need of an update.
    pub in_sync: usize,
}

impl SyncPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty() && self.to_update.is_empty()
    }

    /// Tickets that need a summary before execution: additions then updates.
    pub fn tickets_needing_summary(&self) -> impl Iterator<Item = &RankedTicket> {
        self.to_add
            .iter()
            .chain(self.to_update.iter().map(|(ticket, _)| ticket))
    }

    /// Drop additions and updates whose key is not in `keep`.
    pub fn retain_tickets(&mut self, keep: impl Fn(&str) -> bool) {
        self.to_add.retain(|ticket| keep(ticket.key()));
        self.to_update.retain(|(ticket, _)| keep(ticket.key()));
    }
}

/// Diff `target` against the `remote` submissions of one bot.
///
/// `target` must already be cut to the desired size and be in rank order.
/// Updates are target members already remote whose local record is missing,
/// stale, or still holding a fallback summary (or every one, with
/// `force_refresh`).
#[must_use]
pub fn plan<S: std::hash::BuildHasher>(
    target: &[RankedTicket],
    remote: &[SubmissionRecord],
    local: &HashMap<String, LocalTicketRecord, S>,
    mode: ReconcileMode,
    force_refresh: bool,
) -> SyncPlan {
    let target_keys: HashSet<&str> = target.iter().map(RankedTicket::key).collect();
    let remote_by_key: HashMap<&str, &SubmissionRecord> = remote
        .iter()
        .map(|record| (record.ticket_key.as_str(), record))
        .collect();

    let mut out = SyncPlan::default();

    if mode == ReconcileMode::Exact {
        out.to_remove = remote
            .iter()
            .filter(|record| !target_keys.contains(record.ticket_key.as_str()))
            .cloned()
            .collect();
    }

    let add_capacity = match mode {
        ReconcileMode::Exact => usize::MAX,
        ReconcileMode::Additive { target_count } => target_count.saturating_sub(remote.len()),
    };

    for ticket in target {
        match remote_by_key.get(ticket.key()) {
            None if out.to_add.len() < add_capacity => out.to_add.push(ticket.clone()),
            None => {}
            Some(record) => {
                let stale = local
                    .get(ticket.key())
                    .is_none_or(|local| change_reason(ticket, local, force_refresh).is_some());
                if stale {
                    out.to_update.push((ticket.clone(), (*record).clone()));
                } else {
                    out.in_sync += 1;
                }
            }
        }
    }

    tracing::info!(
        ?mode,
        remove = out.to_remove.len(),
        add = out.to_add.len(),
        update = out.to_update.len(),
        in_sync = out.in_sync,
        "sync plan computed"
    );
    out
}

/// Counters from one [`Reconciler::execute`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ReconcileOutcome {
    pub const fn absorb(&mut self, other: Self) {
        self.added += other.added;
        self.updated += other.updated;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Executes sync plans against one backend.
pub struct Reconciler<'a> {
    backend: &'a dyn KnowledgeBackend,
    store: &'a Store,
    retry: RetryPolicy,
    citation_base: Option<String>,
}

impl<'a> Reconciler<'a> {
    pub fn new(backend: &'a dyn KnowledgeBackend, store: &'a Store, retry: RetryPolicy) -> Self {
        Self {
            backend,
            store,
            retry,
            citation_base: None,
        }
    }

    /// Attach `<base>/browse/<key>` citation links to submitted entries.
    #[must_use]
    pub fn with_citation_base(mut self, base: impl Into<String>) -> Self {
        self.citation_base = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    /// Carry out `plan`. `summaries` maps ticket key → full summary text;
    /// tickets missing from it fall back to their local record.
    pub fn execute(&self, plan: &SyncPlan, summaries: &HashMap<String, String>) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome {
            skipped: plan.in_sync,
            ..ReconcileOutcome::default()
        };

        for record in &plan.to_remove {
            outcome.absorb(self.remove(record));
        }

        for ticket in &plan.to_add {
            match self.summary_for(ticket, summaries) {
                Some(summary) => outcome.absorb(self.add(ticket, &summary)),
                None => outcome.failed += 1,
            }
        }

        for (ticket, existing) in &plan.to_update {
            match self.summary_for(ticket, summaries) {
                Some(summary) => outcome.absorb(self.update(ticket, existing, &summary)),
                None => outcome.failed += 1,
            }
        }

        tracing::info!(
            bot = self.backend.name(),
            added = outcome.added,
            updated = outcome.updated,
            removed = outcome.removed,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "reconciliation finished"
        );
        outcome
    }

    fn summary_for(&self, ticket: &RankedTicket, summaries: &HashMap<String, String>) -> Option<String> {
        if let Some(summary) = summaries.get(ticket.key()) {
            return Some(summary.clone());
        }
        match self.store.local_record(ticket.key()) {
            Ok(Some(record)) => Some(record.summary),
            Ok(None) => {
                tracing::error!(ticket = ticket.key(), "no summary available; skipping");
                None
            }
            Err(error) => {
                tracing::error!(ticket = ticket.key(), error = %error, "failed to read local record");
                None
            }
        }
    }

    fn entry(&self, ticket: &RankedTicket, summary: &str) -> KnowledgeEntry {
        KnowledgeEntry {
            ticket_key: ticket.key().to_string(),
            title: ticket.ticket.title.clone(),
            content: clean_for_classifier(summary),
            citation_url: self
                .citation_base
                .as_ref()
                .map(|base| format!("{base}/browse/{}", ticket.key())),
        }
    }

    /// Remove one remote entry and always drop its local submission.
    pub fn remove(&self, record: &SubmissionRecord) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let key = record.ticket_key.as_str();

        match record.remote_id.as_deref() {
            None => {
                tracing::error!(
                    ticket = key,
                    bot = %record.bot_name,
                    code = %ErrorCode::MissingRemoteId,
                    "submission has no remote id; dropping local record"
                );
                outcome.failed += 1;
            }
            Some(remote_id) => {
                if self.delete(remote_id) {
                    tracing::info!(ticket = key, remote_id, "removed from knowledge base");
                    outcome.removed += 1;
                } else {
                    tracing::warn!(ticket = key, remote_id, "remote delete failed; dropping local record anyway");
                    outcome.failed += 1;
                }
            }
        }

        self.drop_submission(key);
        outcome
    }

    fn delete(&self, remote_id: &str) -> bool {
        self.retry
            .run_if("delete", BackendError::is_transient, |_| {
                self.backend.delete(remote_id)
            })
            .is_success()
    }

    fn add_entry(&self, entry: &KnowledgeEntry) -> Result<Option<String>, BackendError> {
        self.retry
            .run_if("add", BackendError::is_transient, |_| self.backend.add(entry))
            .into_result()
    }

    fn add(&self, ticket: &RankedTicket, summary: &str) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let entry = self.entry(ticket, summary);

        match self.add_entry(&entry) {
            Ok(remote_id) => {
                if remote_id.is_none() {
                    tracing::warn!(ticket = ticket.key(), "add accepted without a remote id");
                }
                if self.record(ticket, summary, remote_id.as_deref(), SubmissionAction::Add) {
                    tracing::info!(ticket = ticket.key(), remote_id = ?remote_id, "added to knowledge base");
                    outcome.added += 1;
                } else {
                    outcome.failed += 1;
                }
            }
            Err(error) => {
                tracing::error!(ticket = ticket.key(), code = %error.code(), error = %error, "add failed");
                outcome.failed += 1;
            }
        }
        outcome
    }

    fn update(
        &self,
        ticket: &RankedTicket,
        existing: &SubmissionRecord,
        summary: &str,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        if summary_hash(summary) == existing.summary_hash {
            tracing::debug!(ticket = ticket.key(), "summary unchanged; skipping remote update");
            outcome.skipped += 1;
            return outcome;
        }

        let entry = self.entry(ticket, summary);
        let result = match self.backend.in_place() {
            Some(updater) => self.update_in_place(updater, ticket, existing, &entry),
            None => self.replace(ticket, existing, &entry),
        };

        let recorded = result.is_ok_and(|remote_id| {
            self.record(ticket, summary, remote_id.as_deref(), SubmissionAction::Update)
        });
        if recorded {
            tracing::info!(ticket = ticket.key(), "updated in knowledge base");
            outcome.updated += 1;
        } else {
            outcome.failed += 1;
        }
        outcome
    }

    fn update_in_place(
        &self,
        updater: &dyn InPlaceUpdate,
        ticket: &RankedTicket,
        existing: &SubmissionRecord,
        entry: &KnowledgeEntry,
    ) -> Result<Option<String>, ()> {
        let result = match existing.remote_id.as_deref() {
            Some(remote_id) => self
                .retry
                .run_if("update", BackendError::is_transient, |_| {
                    updater.update(remote_id, entry)
                })
                .into_result()
                .map(Some),
            None => {
                tracing::warn!(ticket = ticket.key(), "no remote id to update; adding a fresh entry");
                self.add_entry(entry)
            }
        };
        result.map_err(|error| {
            tracing::error!(ticket = ticket.key(), code = %error.code(), error = %error, "update failed");
        })
    }

    /// Delete + add for backends without in-place update.
    fn replace(
        &self,
        ticket: &RankedTicket,
        existing: &SubmissionRecord,
        entry: &KnowledgeEntry,
    ) -> Result<Option<String>, ()> {
        let old_gone = match existing.remote_id.as_deref() {
            Some(remote_id) => {
                let deleted = self.delete(remote_id);
                if !deleted {
                    tracing::warn!(
                        ticket = ticket.key(),
                        remote_id,
                        "delete before re-add failed; old entry may linger"
                    );
                }
                deleted
            }
            None => true,
        };

        self.add_entry(entry).map_err(|error| {
            tracing::error!(ticket = ticket.key(), code = %error.code(), error = %error, "re-add failed");
            if old_gone {
                self.drop_submission(ticket.key());
            }
        })
    }

    fn record(
        &self,
        ticket: &RankedTicket,
        summary: &str,
        remote_id: Option<&str>,
        action: SubmissionAction,
    ) -> bool {
        let record = SubmissionRecord {
            ticket_key: ticket.key().to_string(),
            bot_name: self.backend.name().to_string(),
            bot_kind: self.backend.kind(),
            remote_id: remote_id.map(str::to_string),
            summary_text: summary.to_string(),
            summary_hash: summary_hash(summary),
            action,
            status: STATUS_SUBMITTED.to_string(),
            submitted_at_us: chrono::Utc::now().timestamp_micros(),
        };
        match self.store.put_submission(&record) {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(ticket = ticket.key(), error = %error, "failed to record submission");
                false
            }
        }
    }

    fn drop_submission(&self, ticket_key: &str) {
        if let Err(error) = self.store.delete_submission(ticket_key, self.backend.name()) {
            tracing::error!(ticket = ticket_key, error = %error, "failed to drop submission record");
        }
    }
}
