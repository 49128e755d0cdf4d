//! The upstream ticket source seam.
//!
//! The HTTP client lives in `kbsync-cli`; everything in this crate talks to
//! a [`TicketSource`] so ranking and classification run against in-memory
//! fakes in tests.

use crate::error::ErrorCode;
use crate::model::{Ticket, TicketLinks};

/// Default page size for paginated searches.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Errors surfaced by a ticket source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The search request failed (network, auth, bad query).
    #[error("ticket search failed: {0}")]
    Search(String),

    /// Link lookup for a single ticket failed.
    #[error("link lookup failed for {key}: {message}")]
    Links { key: String, message: String },

    /// The source answered with a payload we could not decode.
    #[error("could not decode ticket source response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Search(_) | Self::Decode(_) => ErrorCode::TicketSourceUnavailable,
            Self::Links { .. } => ErrorCode::TicketLinksUnavailable,
        }
    }
}

/// One page window of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub start_at: usize,
    pub max_results: usize,
}

/// Read access to the ticket tracker.
pub trait TicketSource {
    /// Run `query` and return one page of tickets in upstream ranking order.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Search`] when the request fails.
    fn search(&self, query: &str, page: Page) -> Result<Vec<Ticket>, SourceError>;

    /// Fetch the duplicate links of one ticket.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Links`] when the lookup fails.
    fn links(&self, key: &str) -> Result<TicketLinks, SourceError>;
}

/// Fetch every page of `query`, preserving upstream order.
///
/// Stops at the first page shorter than `page_size`.
///
/// # Errors
///
/// Propagates the first page failure.
pub fn fetch_all(
    source: &dyn TicketSource,
    query: &str,
    page_size: usize,
) -> Result<Vec<Ticket>, SourceError> {
    let page_size = page_size.max(1);
    let mut tickets = Vec::new();
    let mut start_at = 0;

    loop {
        let batch = source.search(
            query,
            Page {
                start_at,
                max_results: page_size,
            },
        )?;
        let fetched = batch.len();
        tickets.extend(batch);
        tracing::debug!(start_at, fetched, "fetched ticket page");

        if fetched < page_size {
            break;
        }
        start_at += page_size;
    }

    Ok(tickets)
}
