//! Run orchestration: rank → classify/plan → summarize → reconcile.
//!
//! One [`Engine::run`] call is one operator request. Only configuration, ticket
//! search and store failures abort a run; everything per-ticket is counted in
//! the [`RunReport`] and the run carries on.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use serde::Serialize;

use crate::backend::KnowledgeBackend;
use crate::classify::{change_reason, classify};
use crate::db::Store;
use crate::error::ErrorCode;
use crate::hierarchy::HierarchyResolver;
use crate::model::RankedTicket;
use crate::planner::{TargetSet, plan_expand, plan_resize};
use crate::reconcile::{self, ReconcileMode, ReconcileOutcome, Reconciler};
use crate::retry::RetryPolicy;
use crate::source::{DEFAULT_PAGE_SIZE, TicketSource};
use crate::summary::{SummaryGenerator, TextGenerator};

/// What the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Purge the bot and local state, then rebuild from scratch.
    Init,
    /// Incremental refresh; expands to `target_count` when one is given.
    Update,
    /// Exact reconcile to `target_count`.
    Resize,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::Update => "update",
            Self::Resize => "resize",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    pub mode: RunMode,
    pub target_count: Option<usize>,
    pub force_refresh: bool,
}

/// Fatal run errors raised before any per-ticket work.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{mode} requires a classifier bot")]
    BotNotSelected { mode: RunMode },

    #[error("resize requires a target count")]
    MissingTargetCount,
}

impl EngineError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::BotNotSelected { .. } => ErrorCode::BotNotSelected,
            Self::MissingTargetCount => ErrorCode::InternalUnexpected,
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub mode: Option<RunMode>,
    pub bot: Option<String>,
    /// Size of the ranked root pool.
    pub total: usize,
    /// Tickets whose summary was (re)generated and saved.
    pub processed: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub target_count: Option<usize>,
    /// Submissions recorded for the bot after the run.
    pub final_count: Option<usize>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(duration.as_millis())
}

impl RunReport {
    fn absorb(&mut self, outcome: ReconcileOutcome) {
        self.added += outcome.added;
        self.updated += outcome.updated;
        self.removed += outcome.removed;
        self.skipped += outcome.skipped;
        self.failed += outcome.failed;
    }
}

/// Static run settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Query selecting candidate root tickets.
    pub parent_query: String,
    pub page_size: usize,
    pub retry: RetryPolicy,
    /// Tracker base URL for citation links, if any.
    pub citation_base: Option<String>,
}

impl EngineOptions {
    pub fn new(parent_query: impl Into<String>) -> Self {
        Self {
            parent_query: parent_query.into(),
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
            citation_base: None,
        }
    }
}

/// Wires the adapters of one run together.
pub struct Engine<'a> {
    source: &'a dyn TicketSource,
    generator: &'a dyn TextGenerator,
    backend: Option<&'a dyn KnowledgeBackend>,
    store: &'a mut Store,
    options: EngineOptions,
}

impl<'a> Engine<'a> {
    pub fn new(
        source: &'a dyn TicketSource,
        generator: &'a dyn TextGenerator,
        backend: Option<&'a dyn KnowledgeBackend>,
        store: &'a mut Store,
        options: EngineOptions,
    ) -> Self {
        Self {
            source,
            generator,
            backend,
            store,
            options,
        }
    }

    /// Execute one request.
    ///
    /// # Errors
    ///
    /// Returns an error when the request is invalid for the configured bots,
    /// the ticket search fails, or the store cannot be read or reset.
    pub fn run(&mut self, request: RunRequest) -> Result<RunReport> {
        let started = Instant::now();
        let mut report = RunReport {
            mode: Some(request.mode),
            bot: self.backend.map(|backend| backend.name().to_string()),
            target_count: request.target_count,
            ..RunReport::default()
        };

        tracing::info!(
            mode = %request.mode,
            bot = report.bot.as_deref().unwrap_or("-"),
            target_count = ?request.target_count,
            force_refresh = request.force_refresh,
            "run started"
        );

        match (request.mode, self.backend) {
            (RunMode::Init, backend) => self.run_init(request, backend, &mut report)?,
            (RunMode::Update, None) => self.run_local_update(request, &mut report)?,
            (RunMode::Update | RunMode::Resize, Some(backend)) => {
                self.run_sync(request, backend, &mut report)?;
            }
            (RunMode::Resize, None) => {
                return Err(EngineError::BotNotSelected { mode: request.mode }.into());
            }
        }

        if let Some(backend) = self.backend {
            report.final_count = Some(
                self.store
                    .submissions(backend.name())
                    .context("count submissions after run")?
                    .len(),
            );
        }
        report.duration = started.elapsed();

        tracing::info!(
            total = report.total,
            processed = report.processed,
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            skipped = report.skipped,
            failed = report.failed,
            final_count = ?report.final_count,
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "run finished"
        );
        Ok(report)
    }

    fn run_init(
        &mut self,
        request: RunRequest,
        backend: Option<&'a dyn KnowledgeBackend>,
        report: &mut RunReport,
    ) -> Result<()> {
        if let Some(backend) = backend {
            let existing = self
                .store
                .submissions(backend.name())
                .context("load submissions to purge")?;
            tracing::info!(bot = backend.name(), entries = existing.len(), "purging knowledge base");
            let reconciler = self.reconciler(backend);
            for record in &existing {
                report.absorb(reconciler.remove(record));
            }
            self.store
                .reset_for_bot(backend.name())
                .context("reset local store")?;
        } else {
            self.store.clear_tickets().context("clear local tickets")?;
        }

        let mut resolver = HierarchyResolver::new(self.source);
        let pool = self.rank(&mut resolver)?;
        report.total = pool.len();
        let target = truncate(pool, request.target_count);

        let summaries = self.process(&mut resolver, &target, report);

        if let Some(backend) = backend {
            let mut plan = reconcile::plan(
                &target,
                &[],
                &HashMap::new(),
                ReconcileMode::Exact,
                request.force_refresh,
            );
            plan.retain_tickets(|key| summaries.contains_key(key));
            let outcome = self.reconciler(backend).execute(&plan, &summaries);
            report.absorb(outcome);
        }
        Ok(())
    }

    fn run_local_update(&mut self, request: RunRequest, report: &mut RunReport) -> Result<()> {
        let mut resolver = HierarchyResolver::new(self.source);
        let pool = self.rank(&mut resolver)?;
        report.total = pool.len();
        let target = truncate(pool, request.target_count);

        let local = self.store.local_records().context("load local records")?;
        let classification = classify(&target, &local, request.force_refresh);
        report.skipped += classification.unchanged;

        self.process(&mut resolver, &classification.needs_processing(), report);
        Ok(())
    }

    fn run_sync(
        &mut self,
        request: RunRequest,
        backend: &'a dyn KnowledgeBackend,
        report: &mut RunReport,
    ) -> Result<()> {
        let remote = self
            .store
            .submissions(backend.name())
            .context("load bot submissions")?;

        let mut resolver = HierarchyResolver::new(self.source);
        let pool = self.rank(&mut resolver)?;
        report.total = pool.len();

        let TargetSet {
            target_count,
            tickets,
            mode,
        } = match (request.mode, request.target_count) {
            (RunMode::Resize, Some(n)) => plan_resize(&pool, n),
            (RunMode::Resize, None) => return Err(EngineError::MissingTargetCount.into()),
            (_, Some(n)) => plan_expand(&pool, n, remote.len()),
            (_, None) => plan_resize(&pool, remote.len()),
        };
        report.target_count = Some(target_count);

        let local = self.store.local_records().context("load local records")?;
        let mut plan = reconcile::plan(&tickets, &remote, &local, mode, request.force_refresh);

        // Additions whose local summary is current reuse it; the rest are regenerated.
        let stale: Vec<RankedTicket> = plan
            .tickets_needing_summary()
            .filter(|ticket| {
                local.get(ticket.key()).is_none_or(|record| {
                    change_reason(ticket, record, request.force_refresh).is_some()
                })
            })
            .cloned()
            .collect();
        let mut summaries = self.process(&mut resolver, &stale, report);

        let failed_keys: Vec<String> = stale
            .iter()
            .filter(|ticket| !summaries.contains_key(ticket.key()))
            .map(|ticket| ticket.key().to_string())
            .collect();
        plan.retain_tickets(|key| !failed_keys.iter().any(|failed| failed == key));

        for ticket in plan.tickets_needing_summary() {
            if let Some(record) = local.get(ticket.key()) {
                summaries
                    .entry(ticket.key().to_string())
                    .or_insert_with(|| record.summary.clone());
            }
        }

        let outcome = self.reconciler(backend).execute(&plan, &summaries);
        report.absorb(outcome);
        Ok(())
    }

    fn rank(&self, resolver: &mut HierarchyResolver<'_>) -> Result<Vec<RankedTicket>> {
        resolver
            .rank_candidates(&self.options.parent_query, self.options.page_size)
            .with_context(|| format!("rank tickets for query `{}`", self.options.parent_query))
    }

    fn reconciler(&self, backend: &'a dyn KnowledgeBackend) -> Reconciler<'_> {
        let reconciler = Reconciler::new(backend, self.store, self.options.retry);
        match &self.options.citation_base {
            Some(base) => reconciler.with_citation_base(base.clone()),
            None => reconciler,
        }
    }

    /// Generate and persist summaries. Returns key → summary for every ticket
    /// that was saved; store failures are counted and left out.
    fn process(
        &mut self,
        resolver: &mut HierarchyResolver<'_>,
        tickets: &[RankedTicket],
        report: &mut RunReport,
    ) -> HashMap<String, String> {
        let generator = SummaryGenerator::new(self.generator, self.options.retry);
        let mut summaries = HashMap::with_capacity(tickets.len());

        for (index, ticket) in tickets.iter().enumerate() {
            let walk = resolver.walk(&ticket.ticket);
            let summary = generator.generate(&ticket.ticket, &walk);
            let descendants: Vec<_> = walk.into_iter().map(|entry| entry.ticket).collect();

            match self
                .store
                .save_ticket(ticket.key(), &summary.text, &descendants, !summary.fallback)
            {
                Ok(_) => {
                    tracing::info!(
                        ticket = ticket.key(),
                        progress = format_args!("{}/{}", index + 1, tickets.len()),
                        descendants = descendants.len(),
                        fallback = summary.fallback,
                        "processed ticket"
                    );
                    report.processed += 1;
                    summaries.insert(ticket.key().to_string(), summary.text);
                }
                Err(error) => {
                    tracing::error!(
                        ticket = ticket.key(),
                        code = %error.code(),
                        error = %error,
                        "failed to save ticket"
                    );
                    report.failed += 1;
                }
            }
        }
        summaries
    }
}

fn truncate(mut pool: Vec<RankedTicket>, limit: Option<usize>) -> Vec<RankedTicket> {
    if let Some(limit) = limit {
        pool.truncate(limit);
    }
    pool
}
