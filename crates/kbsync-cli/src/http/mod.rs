//! Blocking HTTP adapters for the core seams.
//!
//! - [`jira::JiraClient`] implements `TicketSource`
//! - [`platform`] speaks the AI-bot-platform command protocol
//! - [`alpha`] speaks the Alpha Knowledge REST API
//!
//! Retries are not done here; the core wraps every call in a `RetryPolicy`.

pub mod alpha;
pub mod jira;
pub mod platform;

use std::time::Duration;

use kbsync_core::backend::BackendError;

pub const USER_AGENT: &str = concat!("kbsync/", env!("CARGO_PKG_VERSION"));

/// Timeout for ticket and knowledge-base calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Summarization is slower than the other calls.
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest error body quoted back in an error message.
const MAX_ERROR_BODY: usize = 200;

pub fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// One-line description of a failed call, quoting the start of any error body.
pub fn describe(error: ureq::Error) -> String {
    match error {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            let body = body.trim();
            if body.is_empty() {
                format!("HTTP {code}")
            } else {
                format!("HTTP {code}: {}", truncate(body, MAX_ERROR_BODY))
            }
        }
        ureq::Error::Transport(transport) => transport.to_string(),
    }
}

/// Client errors other than timeouts and rate limits will fail the same way
/// on every attempt.
pub const fn is_rejection(status: u16) -> bool {
    matches!(status, 400..=499) && status != 408 && status != 429
}

/// Knowledge-base call failure, split into retryable and permanent.
pub fn backend_error(operation: &'static str, error: ureq::Error) -> BackendError {
    let rejected = matches!(&error, ureq::Error::Status(code, _) if is_rejection(*code));
    let message = describe(error);
    if rejected {
        BackendError::Rejected { operation, message }
    } else {
        BackendError::Request { operation, message }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}

/// Join a configured base URL and a path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
