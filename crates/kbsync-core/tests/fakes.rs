#![allow(dead_code)]
//! In-memory adapters shared by the integration tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};

use kbsync_core::backend::{BackendError, InPlaceUpdate, KnowledgeBackend, KnowledgeEntry};
use kbsync_core::model::{BotKind, Ticket, TicketLinks};
use kbsync_core::source::{Page, SourceError, TicketSource};
use kbsync_core::summary::{GenerationError, TextGenerator};

// ---------------------------------------------------------------------------
// Ticket source
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MapSource {
    roots: RefCell<Vec<Ticket>>,
    children: RefCell<HashMap<String, Vec<Ticket>>>,
}

impl MapSource {
    /// Add a root ticket with `count` leaf duplicates.
    pub fn root(self, key: &str, count: usize) -> Self {
        self.set_root(key, count);
        self
    }

    /// Add or replace a root ticket with `count` leaf duplicates.
    pub fn set_root(&self, key: &str, count: usize) {
        let mut roots = self.roots.borrow_mut();
        if !roots.iter().any(|t| t.key == key) {
            roots.push(Ticket::new(key, format!("{key} title")));
        }
        let leaves = (0..count)
            .map(|i| Ticket::new(format!("{key}-d{i}"), format!("{key} duplicate {i}")))
            .collect();
        self.children.borrow_mut().insert(key.to_string(), leaves);
    }

    pub fn edge(self, parent: &str, child: &str) -> Self {
        self.children
            .borrow_mut()
            .entry(parent.to_string())
            .or_default()
            .push(Ticket::new(child, format!("{child} title")));
        self
    }
}

impl TicketSource for MapSource {
    fn search(&self, _query: &str, page: Page) -> Result<Vec<Ticket>, SourceError> {
        Ok(self
            .roots
            .borrow()
            .iter()
            .skip(page.start_at)
            .take(page.max_results)
            .cloned()
            .collect())
    }

    fn links(&self, key: &str) -> Result<TicketLinks, SourceError> {
        Ok(TicketLinks {
            inward: self.children.borrow().get(key).cloned().unwrap_or_default(),
            outward: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Knowledge backend
// ---------------------------------------------------------------------------

pub struct FakeBackend {
    name: String,
    kind: BotKind,
    next_id: Cell<u32>,
    /// remote id → (ticket key, content)
    pub entries: RefCell<BTreeMap<String, (String, String)>>,
    pub calls: RefCell<Vec<String>>,
    failing_adds: RefCell<HashMap<String, u32>>,
    failing_deletes: RefCell<HashMap<String, u32>>,
    rejected_adds: RefCell<HashSet<String>>,
    id_less_adds: RefCell<HashSet<String>>,
}

/// Next failure for a counted knob, if any remain.
fn take_failure(knob: &RefCell<HashMap<String, u32>>, key: &str) -> bool {
    match knob.borrow_mut().get_mut(key) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

impl FakeBackend {
    pub fn new(name: &str, kind: BotKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            next_id: Cell::new(1),
            entries: RefCell::new(BTreeMap::new()),
            calls: RefCell::new(Vec::new()),
            failing_adds: RefCell::new(HashMap::new()),
            failing_deletes: RefCell::new(HashMap::new()),
            rejected_adds: RefCell::new(HashSet::new()),
            id_less_adds: RefCell::new(HashSet::new()),
        }
    }

    /// Make the next `times` deletes of `remote_id` fail.
    pub fn fail_deletes(&self, remote_id: &str, times: u32) {
        self.failing_deletes
            .borrow_mut()
            .insert(remote_id.to_string(), times);
    }

    /// Refuse every add for `ticket_key` with a permanent error.
    pub fn reject_adds(&self, ticket_key: &str) {
        self.rejected_adds.borrow_mut().insert(ticket_key.to_string());
    }

    /// Store adds for `ticket_key` but reply without an id.
    pub fn accept_without_id(&self, ticket_key: &str) {
        self.id_less_adds.borrow_mut().insert(ticket_key.to_string());
    }

    /// Make the next `times` adds for `ticket_key` fail.
    pub fn fail_adds(&self, ticket_key: &str, times: u32) {
        self.failing_adds
            .borrow_mut()
            .insert(ticket_key.to_string(), times);
    }

    /// Pretend an entry already exists remotely.
    pub fn seed(&self, remote_id: &str, ticket_key: &str) {
        self.entries
            .borrow_mut()
            .insert(remote_id.to_string(), (ticket_key.to_string(), String::new()));
    }

    pub fn ticket_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .borrow()
            .values()
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

impl KnowledgeBackend for FakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BotKind {
        self.kind
    }

    fn add(&self, entry: &KnowledgeEntry) -> Result<Option<String>, BackendError> {
        self.calls
            .borrow_mut()
            .push(format!("add:{}", entry.ticket_key));

        if self.rejected_adds.borrow().contains(&entry.ticket_key) {
            return Err(BackendError::Rejected {
                operation: "add",
                message: "HTTP 400".to_string(),
            });
        }
        if take_failure(&self.failing_adds, &entry.ticket_key) {
            return Err(BackendError::Request {
                operation: "add",
                message: "HTTP 503".to_string(),
            });
        }

        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let remote_id = format!("r{id}");
        self.entries.borrow_mut().insert(
            remote_id.clone(),
            (entry.ticket_key.clone(), entry.content.clone()),
        );
        if self.id_less_adds.borrow().contains(&entry.ticket_key) {
            Ok(None)
        } else {
            Ok(Some(remote_id))
        }
    }

    fn delete(&self, remote_id: &str) -> Result<(), BackendError> {
        self.calls.borrow_mut().push(format!("delete:{remote_id}"));
        if take_failure(&self.failing_deletes, remote_id) {
            return Err(BackendError::Request {
                operation: "delete",
                message: "connection reset".to_string(),
            });
        }
        self.entries.borrow_mut().remove(remote_id);
        Ok(())
    }

    fn in_place(&self) -> Option<&dyn InPlaceUpdate> {
        match self.kind {
            BotKind::AiBotPlatform => Some(self),
            BotKind::AlphaKnowledge => None,
        }
    }
}

impl InPlaceUpdate for FakeBackend {
    fn update(&self, remote_id: &str, entry: &KnowledgeEntry) -> Result<String, BackendError> {
        self.calls.borrow_mut().push(format!("update:{remote_id}"));
        self.entries.borrow_mut().insert(
            remote_id.to_string(),
            (entry.ticket_key.clone(), entry.content.clone()),
        );
        Ok(remote_id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Text generation
// ---------------------------------------------------------------------------

/// Deterministic generator: the reply depends only on the prompt.
#[derive(Default)]
pub struct EchoGenerator {
    pub calls: Cell<usize>,
}

impl TextGenerator for EchoGenerator {
    fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.calls.set(self.calls.get() + 1);
        let lines = prompt.lines().count();
        let first = prompt.lines().next().unwrap_or_default();
        Ok(format!("Rollup of {lines} tickets. {first}"))
    }
}

/// Generator that always fails.
#[derive(Default)]
pub struct DownGenerator {
    pub calls: Cell<usize>,
}

impl TextGenerator for DownGenerator {
    fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
        self.calls.set(self.calls.get() + 1);
        Err(GenerationError::Request("connection refused".to_string()))
    }
}
