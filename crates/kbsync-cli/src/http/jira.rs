//! JIRA REST client.

use base64::{Engine as _, engine::general_purpose};
use kbsync_core::config::JiraConfig;
use kbsync_core::model::{Ticket, TicketLinks};
use kbsync_core::source::{Page, SourceError, TicketSource};
use serde_json::Value;

use super::{REQUEST_TIMEOUT, agent, describe, join_url};

/// Link types whose name contains this (case-insensitive) are duplicate links.
const DUPLICATE_LINK_MARKER: &str = "duplicat";

pub struct JiraClient {
    agent: ureq::Agent,
    base_url: String,
    auth_header: String,
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Self {
        if !config.verify {
            tracing::warn!("jira.verify = false is ignored; TLS certificates are always verified");
        }
        let credentials = format!(
            "{}:{}",
            config.username,
            config.password.as_deref().unwrap_or_default()
        );
        Self {
            agent: agent(REQUEST_TIMEOUT),
            base_url: config.server.trim_end_matches('/').to_string(),
            auth_header: format!("Basic {}", general_purpose::STANDARD.encode(credentials)),
        }
    }

    fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, String> {
        let url = join_url(&self.base_url, path);
        let mut request = self
            .agent
            .get(&url)
            .set("Accept", "application/json")
            .set("Authorization", &self.auth_header);
        for (name, value) in query {
            request = request.query(name, value);
        }

        let response = request.call().map_err(describe)?;
        response
            .into_json::<Value>()
            .map_err(|err| format!("invalid JSON from {url}: {err}"))
    }
}

impl TicketSource for JiraClient {
    fn search(&self, query: &str, page: Page) -> Result<Vec<Ticket>, SourceError> {
        let start_at = page.start_at.to_string();
        let max_results = page.max_results.to_string();
        tracing::debug!(jql = query, start_at = page.start_at, "searching tickets");

        let body = self
            .get_json(
                "rest/api/2/search",
                &[
                    ("jql", query),
                    ("startAt", &start_at),
                    ("maxResults", &max_results),
                    ("fields", "summary,issuelinks"),
                ],
            )
            .map_err(SourceError::Search)?;
        parse_search(&body)
    }

    fn links(&self, key: &str) -> Result<TicketLinks, SourceError> {
        let body = self
            .get_json(&format!("rest/api/2/issue/{key}"), &[("fields", "issuelinks")])
            .map_err(|message| SourceError::Links {
                key: key.to_string(),
                message,
            })?;
        Ok(parse_links(&body))
    }
}

/// Tickets of one search page.
pub fn parse_search(body: &Value) -> Result<Vec<Ticket>, SourceError> {
    let issues = body["issues"]
        .as_array()
        .ok_or_else(|| SourceError::Decode("search response has no issues array".to_string()))?;

    issues
        .iter()
        .map(|issue| {
            parse_issue(issue)
                .ok_or_else(|| SourceError::Decode(format!("issue without key: {issue}")))
        })
        .collect()
}

fn parse_issue(issue: &Value) -> Option<Ticket> {
    let key = issue["key"].as_str()?;
    let title = issue["fields"]["summary"].as_str().unwrap_or_default();
    Some(Ticket::new(key, title))
}

/// Duplicate links of one issue. `inwardIssue` entries are tickets that
/// duplicate this one; `outwardIssue` entries are tickets this one duplicates.
pub fn parse_links(body: &Value) -> TicketLinks {
    let mut links = TicketLinks::default();
    let Some(entries) = body["fields"]["issuelinks"].as_array() else {
        return links;
    };

    for link in entries {
        let type_name = link["type"]["name"].as_str().unwrap_or_default();
        if !type_name.to_lowercase().contains(DUPLICATE_LINK_MARKER) {
            continue;
        }
        if let Some(ticket) = link.get("inwardIssue").and_then(parse_issue) {
            links.inward.push(ticket);
        }
        if let Some(ticket) = link.get("outwardIssue").and_then(parse_issue) {
            links.outward.push(ticket);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_page_yields_keys_and_titles() {
        let body = json!({
            "startAt": 0,
            "issues": [
                {"key": "FB-1", "fields": {"summary": "Login fails"}},
                {"key": "FB-2", "fields": {}},
            ]
        });
        let tickets = parse_search(&body).expect("parse");
        assert_eq!(
            tickets,
            vec![Ticket::new("FB-1", "Login fails"), Ticket::new("FB-2", "")]
        );
    }

    #[test]
    fn search_without_issues_is_a_decode_error() {
        let err = parse_search(&json!({"errorMessages": ["bad jql"]})).expect_err("no issues");
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[test]
    fn only_duplicate_links_are_kept() {
        let body = json!({
            "fields": {"issuelinks": [
                {"type": {"name": "Duplicate"},
                 "inwardIssue": {"key": "FB-7", "fields": {"summary": "dup"}}},
                {"type": {"name": "Blocks"},
                 "inwardIssue": {"key": "FB-8", "fields": {"summary": "blocker"}}},
                {"type": {"name": "Duplicates"},
                 "outwardIssue": {"key": "FB-9", "fields": {"summary": "original"}}},
            ]}
        });
        let links = parse_links(&body);
        assert_eq!(links.inward, vec![Ticket::new("FB-7", "dup")]);
        assert_eq!(links.outward, vec![Ticket::new("FB-9", "original")]);
        assert!(links.has_outward());
    }

    #[test]
    fn issue_without_links_has_none() {
        let links = parse_links(&json!({"key": "FB-1", "fields": {}}));
        assert!(links.inward.is_empty());
        assert!(!links.has_outward());
    }
}
