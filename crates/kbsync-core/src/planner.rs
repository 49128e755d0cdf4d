//! Target-set selection for resize and expand requests.
//!
//! Both operate on the whole ranked pool (roots only, descendant count
//! descending, upstream order on ties) and take a prefix of it. A pool smaller
//! than the request yields the whole pool.

use serde::Serialize;

use crate::model::RankedTicket;
use crate::reconcile::ReconcileMode;

/// A target set plus how the reconciler should converge on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSet {
    /// Requested size after applying the expand floor.
    pub target_count: usize,
    pub tickets: Vec<RankedTicket>,
    pub mode: ReconcileMode,
}

/// Exact resize to the top `n`.
#[must_use]
pub fn plan_resize(pool: &[RankedTicket], n: usize) -> TargetSet {
    TargetSet {
        target_count: n,
        tickets: pool.iter().take(n).cloned().collect(),
        mode: ReconcileMode::Exact,
    }
}

/// Grow to `n` without removing anything already remote.
///
/// A request below `current_remote` is raised to it, so expand never shrinks.
#[must_use]
pub fn plan_expand(pool: &[RankedTicket], n: usize, current_remote: usize) -> TargetSet {
    let target_count = n.max(current_remote);
    if target_count > n {
        tracing::info!(
            requested = n,
            current_remote,
            "expand target below current size; keeping current size"
        );
    }
    TargetSet {
        target_count,
        tickets: pool.iter().take(target_count).cloned().collect(),
        mode: ReconcileMode::Additive { target_count },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Ticket;

    fn pool(counts: &[usize]) -> Vec<RankedTicket> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &count)| RankedTicket {
                ticket: Ticket::new(format!("FB-{i}"), format!("t{i}")),
                descendant_count: count,
            })
            .collect()
    }

    #[test]
    fn resize_takes_prefix() {
        let set = plan_resize(&pool(&[9, 5, 5, 1]), 2);
        assert_eq!(set.tickets.len(), 2);
        assert_eq!(set.tickets[1].key(), "FB-1");
        assert_eq!(set.mode, ReconcileMode::Exact);
    }

    #[test]
    fn small_pool_yields_whole_pool() {
        assert_eq!(plan_resize(&pool(&[3, 2]), 10).tickets.len(), 2);
        assert_eq!(plan_expand(&pool(&[3, 2]), 10, 1).tickets.len(), 2);
    }

    #[test]
    fn expand_floors_at_current_remote_size() {
        let set = plan_expand(&pool(&[5, 4, 3, 2, 1]), 2, 4);
        assert_eq!(set.target_count, 4);
        assert_eq!(set.tickets.len(), 4);
        assert_eq!(set.mode, ReconcileMode::Additive { target_count: 4 });
    }

    #[test]
    fn resize_to_zero_is_empty() {
        assert!(plan_resize(&pool(&[1]), 0).tickets.is_empty());
    }
}
