//! Change classification of a freshly ranked ticket set against local state.

use std::collections::HashMap;

use crate::model::{LocalTicketRecord, RankedTicket};

/// Why a ticket needs reprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    /// Caller asked for a full refresh.
    Forced,
    /// Stored summary is still the raw title from a failed generation.
    FallbackSummary,
    /// Descendant count moved since the summary was generated.
    CountChanged { stored: usize, current: usize },
}

/// Result of [`classify`]. `new` and `changed` are disjoint and keep input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub new: Vec<RankedTicket>,
    pub changed: Vec<(RankedTicket, ChangeReason)>,
    pub unchanged: usize,
}

impl Classification {
    /// Every ticket needing a summary, new first.
    #[must_use]
    pub fn needs_processing(&self) -> Vec<RankedTicket> {
        self.new
            .iter()
            .cloned()
            .chain(self.changed.iter().map(|(ticket, _)| ticket.clone()))
            .collect()
    }
}

/// Decide whether a ticket with a local record needs reprocessing.
#[must_use]
pub fn change_reason(
    ticket: &RankedTicket,
    record: &LocalTicketRecord,
    force_refresh: bool,
) -> Option<ChangeReason> {
    if force_refresh {
        return Some(ChangeReason::Forced);
    }
    if record.summary == ticket.ticket.title {
        return Some(ChangeReason::FallbackSummary);
    }
    if record.child_count != ticket.descendant_count {
        return Some(ChangeReason::CountChanged {
            stored: record.child_count,
            current: ticket.descendant_count,
        });
    }
    None
}

/// Partition `tickets` into new, changed and unchanged against `existing`.
#[must_use]
pub fn classify<S: std::hash::BuildHasher>(
    tickets: &[RankedTicket],
    existing: &HashMap<String, LocalTicketRecord, S>,
    force_refresh: bool,
) -> Classification {
    let mut out = Classification::default();

    for ticket in tickets {
        let Some(record) = existing.get(ticket.key()) else {
            out.new.push(ticket.clone());
            continue;
        };

        match change_reason(ticket, record, force_refresh) {
            Some(reason) => {
                tracing::debug!(ticket = ticket.key(), ?reason, "ticket changed");
                out.changed.push((ticket.clone(), reason));
            }
            None => out.unchanged += 1,
        }
    }

    tracing::info!(
        new = out.new.len(),
        changed = out.changed.len(),
        unchanged = out.unchanged,
        "classified tickets"
    );
    out
}
