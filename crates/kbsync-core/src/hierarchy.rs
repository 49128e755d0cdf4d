//! Duplicate-link hierarchy traversal and candidate ranking.
//!
//! A ticket's **descendants** are every ticket reachable through inward
//! duplicate links, transitively. The link graph comes from a live tracker
//! and may contain cycles (A duplicates B duplicates A), diamonds, and
//! self-links, so every walk keeps a visited set seeded with the root.
//!
//! # Caching
//!
//! Link lookups are the expensive part of a ranking pass. The resolver owns
//! a [`LinkCache`] keyed by ticket key; it lives for one pass and is cleared
//! by [`HierarchyResolver::invalidate`], which [`HierarchyResolver::rank_candidates`]
//! calls before fetching anything.
//!
//! # Lookup failures
//!
//! A failed link lookup is logged and cached as "no links" for the rest of
//! the pass, so one broken ticket never aborts ranking.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use crate::model::{RankedTicket, Ticket, TicketLinks};
use crate::source::{self, SourceError, TicketSource};

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Per-pass cache of ticket key → duplicate links.
#[derive(Debug, Default)]
pub struct LinkCache {
    entries: HashMap<String, TicketLinks>,
}

impl LinkCache {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TicketLinks> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, links: TicketLinks) {
        self.entries.insert(key.into(), links);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// Walk entries
// ---------------------------------------------------------------------------

/// One descendant discovered by [`HierarchyResolver::walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// 1 for direct children, 2 for grandchildren, and so on.
    pub depth: usize,
    /// 1-based position within the parent's child list.
    pub position: usize,
    pub ticket: Ticket,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves descendants and ranks root tickets against a [`TicketSource`].
pub struct HierarchyResolver<'a> {
    source: &'a dyn TicketSource,
    cache: LinkCache,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(source: &'a dyn TicketSource) -> Self {
        Self {
            source,
            cache: LinkCache::default(),
        }
    }

    /// Drop every cached link lookup.
    pub fn invalidate(&mut self) {
        if !self.cache.is_empty() {
            tracing::debug!(entries = self.cache.len(), "link cache cleared");
        }
        self.cache.clear();
    }

    #[must_use]
    pub const fn cache(&self) -> &LinkCache {
        &self.cache
    }

    fn links(&mut self, key: &str) -> &TicketLinks {
        if self.cache.get(key).is_none() {
            let links = match self.source.links(key) {
                Ok(links) => links,
                Err(error) => {
                    tracing::warn!(ticket = key, error = %error, "link lookup failed; treating as unlinked");
                    TicketLinks::default()
                }
            };
            tracing::trace!(ticket = key, children = links.inward.len(), "links fetched");
            self.cache.insert(key, links);
        }
        // Populated above when missing.
        self.cache.get(key).unwrap_or(&EMPTY_LINKS)
    }

    /// Direct inward-duplicate children of `key`.
    pub fn direct_children(&mut self, key: &str) -> Vec<Ticket> {
        self.links(key).inward.clone()
    }

    /// True when the ticket duplicates another ticket (has an outward link).
    pub fn has_duplicate_parent(&mut self, key: &str) -> bool {
        self.links(key).has_outward()
    }

    /// Pre-order walk of all descendants of `root`, each visited once.
    pub fn walk(&mut self, root: &Ticket) -> Vec<WalkEntry> {
        let mut visited: HashSet<String> = HashSet::from([root.key.clone()]);
        let mut out = Vec::new();
        let mut stack: Vec<(Vec<Ticket>, usize)> = vec![(self.direct_children(&root.key), 0)];

        while let Some((children, next)) = stack.last_mut() {
            if *next >= children.len() {
                stack.pop();
                continue;
            }
            let child = children[*next].clone();
            *next += 1;
            let position = *next;

            if !visited.insert(child.key.clone()) {
                continue;
            }

            let depth = stack.len();
            let grandchildren = self.direct_children(&child.key);
            out.push(WalkEntry {
                depth,
                position,
                ticket: child,
            });
            stack.push((grandchildren, 0));
        }

        out
    }

    /// Flattened descendants of `root` in pre-order discovery, no duplicates.
    pub fn resolve_descendants(&mut self, root: &Ticket) -> Vec<Ticket> {
        self.walk(root).into_iter().map(|entry| entry.ticket).collect()
    }

    /// Number of distinct descendants of `root`.
    pub fn total_descendant_count(&mut self, root: &Ticket) -> usize {
        self.walk(root).len()
    }

    /// Rank every root ticket matched by `query` by descendant count.
    ///
    /// Clears the link cache first. Tickets with an outward duplicate link are
    /// dropped. Ties keep upstream order (the sort is stable); a key repeated
    /// across pages keeps its first position.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if any search page fails.
    pub fn rank_candidates(
        &mut self,
        query: &str,
        page_size: usize,
    ) -> Result<Vec<RankedTicket>, SourceError> {
        self.invalidate();

        let tickets = source::fetch_all(self.source, query, page_size)?;
        let fetched = tickets.len();

        let mut seen = HashSet::new();
        let mut ranked = Vec::new();
        for ticket in tickets {
            if !seen.insert(ticket.key.clone()) {
                continue;
            }
            if self.has_duplicate_parent(&ticket.key) {
                continue;
            }
            let descendant_count = self.total_descendant_count(&ticket);
            ranked.push(RankedTicket {
                ticket,
                descendant_count,
            });
        }

        ranked.sort_by_key(|entry| Reverse(entry.descendant_count));

        tracing::info!(
            fetched,
            roots = ranked.len(),
            "ranked root tickets by total descendant count"
        );
        Ok(ranked)
    }
}

static EMPTY_LINKS: TicketLinks = TicketLinks {
    inward: Vec::new(),
    outward: Vec::new(),
};

/// Prompt label for a descendant at `depth`: Child, Grandchild,
/// Great-Grandchild, Great-Great-Grandchild, …
#[must_use]
pub fn depth_label(depth: usize) -> String {
    match depth {
        0 | 1 => "Child".to_string(),
        2 => "Grandchild".to_string(),
        n => format!("{}Grandchild", "Great-".repeat(n - 2)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Page;
    use std::cell::Cell;

    /// Graph fake: `edges` maps parent → children (inward duplicates).
    #[derive(Default)]
    struct GraphSource {
        roots: Vec<Ticket>,
        edges: HashMap<String, Vec<String>>,
        parents: HashSet<String>,
        failing: HashSet<String>,
        link_calls: Cell<usize>,
    }

    impl GraphSource {
        fn edge(mut self, parent: &str, child: &str) -> Self {
            self.edges
                .entry(parent.to_string())
                .or_default()
                .push(child.to_string());
            self
        }

        fn root(mut self, key: &str) -> Self {
            self.roots.push(Ticket::new(key, format!("title {key}")));
            self
        }
    }

    impl TicketSource for GraphSource {
        fn search(&self, _query: &str, page: Page) -> Result<Vec<Ticket>, SourceError> {
            Ok(self
                .roots
                .iter()
                .skip(page.start_at)
                .take(page.max_results)
                .cloned()
                .collect())
        }

        fn links(&self, key: &str) -> Result<TicketLinks, SourceError> {
            self.link_calls.set(self.link_calls.get() + 1);
            if self.failing.contains(key) {
                return Err(SourceError::Links {
                    key: key.to_string(),
                    message: "503".to_string(),
                });
            }
            let inward = self
                .edges
                .get(key)
                .map(|children| {
                    children
                        .iter()
                        .map(|c| Ticket::new(c.clone(), format!("title {c}")))
                        .collect()
                })
                .unwrap_or_default();
            let outward = if self.parents.contains(key) {
                vec![Ticket::new("UP-1", "upstream")]
            } else {
                Vec::new()
            };
            Ok(TicketLinks { inward, outward })
        }
    }

    fn keys(tickets: &[Ticket]) -> Vec<&str> {
        tickets.iter().map(|t| t.key.as_str()).collect()
    }

    #[test]
    fn descendants_are_pre_order() {
        let source = GraphSource::default()
            .edge("A", "B")
            .edge("A", "C")
            .edge("B", "D");
        let mut resolver = HierarchyResolver::new(&source);
        let found = resolver.resolve_descendants(&Ticket::new("A", "a"));
        assert_eq!(keys(&found), ["B", "D", "C"]);
    }

    #[test]
    fn two_node_cycle_terminates() {
        let source = GraphSource::default().edge("A", "B").edge("B", "A");
        let mut resolver = HierarchyResolver::new(&source);
        let found = resolver.resolve_descendants(&Ticket::new("A", "a"));
        assert_eq!(keys(&found), ["B"]);
    }

    #[test]
    fn self_link_is_ignored() {
        let source = GraphSource::default().edge("A", "A").edge("A", "B");
        let mut resolver = HierarchyResolver::new(&source);
        assert_eq!(resolver.total_descendant_count(&Ticket::new("A", "a")), 1);
    }

    #[test]
    fn diamond_counts_shared_descendant_once() {
        let source = GraphSource::default()
            .edge("A", "B")
            .edge("A", "C")
            .edge("B", "D")
            .edge("C", "D");
        let mut resolver = HierarchyResolver::new(&source);
        let found = resolver.resolve_descendants(&Ticket::new("A", "a"));
        assert_eq!(keys(&found), ["B", "D", "C"]);
    }

    #[test]
    fn repeated_walks_hit_the_cache() {
        let source = GraphSource::default().edge("A", "B").edge("B", "C");
        let mut resolver = HierarchyResolver::new(&source);
        let root = Ticket::new("A", "a");
        assert_eq!(resolver.total_descendant_count(&root), 2);
        let calls = source.link_calls.get();
        assert_eq!(resolver.total_descendant_count(&root), 2);
        assert_eq!(source.link_calls.get(), calls);

        resolver.invalidate();
        assert!(resolver.cache().is_empty());
        assert_eq!(resolver.total_descendant_count(&root), 2);
        assert_eq!(source.link_calls.get(), calls * 2);
    }

    #[test]
    fn walk_reports_depth_and_sibling_position() {
        let source = GraphSource::default()
            .edge("A", "B")
            .edge("A", "C")
            .edge("C", "D")
            .edge("D", "E");
        let mut resolver = HierarchyResolver::new(&source);
        let entries = resolver.walk(&Ticket::new("A", "a"));
        let shape: Vec<(usize, usize, &str)> = entries
            .iter()
            .map(|e| (e.depth, e.position, e.ticket.key.as_str()))
            .collect();
        assert_eq!(shape, [(1, 1, "B"), (1, 2, "C"), (2, 1, "D"), (3, 1, "E")]);
    }

    #[test]
    fn failed_link_lookup_counts_as_leaf() {
        let mut source = GraphSource::default().edge("A", "B").edge("B", "C");
        source.failing.insert("B".to_string());
        let mut resolver = HierarchyResolver::new(&source);
        assert_eq!(resolver.total_descendant_count(&Ticket::new("A", "a")), 1);
    }

    #[test]
    fn ranking_drops_non_roots_and_sorts_stably() {
        let mut source = GraphSource::default()
            .root("A")
            .root("B")
            .root("C")
            .root("D")
            .edge("A", "a1")
            .edge("B", "b1")
            .edge("B", "b2")
            .edge("C", "c1")
            .edge("D", "d1")
            .edge("D", "d2")
            .edge("D", "d3");
        source.parents.insert("D".to_string());
        let mut resolver = HierarchyResolver::new(&source);

        let ranked = resolver.rank_candidates("q", 2).expect("rank");
        let order: Vec<(&str, usize)> = ranked
            .iter()
            .map(|r| (r.key(), r.descendant_count))
            .collect();
        assert_eq!(order, [("B", 2), ("A", 1), ("C", 1)]);
    }

    #[test]
    fn depth_labels_extend_with_great_prefixes() {
        assert_eq!(depth_label(1), "Child");
        assert_eq!(depth_label(2), "Grandchild");
        assert_eq!(depth_label(3), "Great-Grandchild");
        assert_eq!(depth_label(5), "Great-Great-Great-Grandchild");
    }
}
