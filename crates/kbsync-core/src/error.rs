use std::fmt;

/// Machine-readable error codes for operator- and script-friendly handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissing,
    ConfigParseError,
    ConfigFieldMissing,
    UnknownBot,
    BotNotSelected,
    TicketSourceUnavailable,
    TicketLinksUnavailable,
    BackendRequestFailed,
    BackendRejected,
    MissingRemoteId,
    SummaryGenerationFailed,
    StoreOpenFailed,
    StoreWriteFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigMissing => "E1001",
            Self::ConfigParseError => "E1002",
            Self::ConfigFieldMissing => "E1003",
            Self::UnknownBot => "E1004",
            Self::BotNotSelected => "E1005",
            Self::TicketSourceUnavailable => "E2001",
            Self::TicketLinksUnavailable => "E2002",
            Self::BackendRequestFailed => "E3001",
            Self::BackendRejected => "E3002",
            Self::MissingRemoteId => "E3003",
            Self::SummaryGenerationFailed => "E4001",
            Self::StoreOpenFailed => "E5001",
            Self::StoreWriteFailed => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigMissing => "Config file not found",
            Self::ConfigParseError => "Config file parse error",
            Self::ConfigFieldMissing => "Required config field missing",
            Self::UnknownBot => "Unknown bot name",
            Self::BotNotSelected => "No classifier bot selected",
            Self::TicketSourceUnavailable => "Ticket search failed",
            Self::TicketLinksUnavailable => "Ticket link lookup failed",
            Self::BackendRequestFailed => "Knowledge backend request failed",
            Self::BackendRejected => "Knowledge backend rejected the request",
            Self::MissingRemoteId => "Submission record has no remote id",
            Self::SummaryGenerationFailed => "Summary generation failed",
            Self::StoreOpenFailed => "Local store could not be opened",
            Self::StoreWriteFailed => "Local store write failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigMissing => Some("Create kbsync.toml or pass --config <path>."),
            Self::ConfigParseError => Some("Fix syntax in the config file and retry."),
            Self::ConfigFieldMissing => Some("Add the named field to the config file."),
            Self::UnknownBot => Some("Run `kbsync bots` to list configured bots."),
            Self::BotNotSelected => Some("Pass --classifier-bot <name>."),
            Self::TicketSourceUnavailable => {
                Some("Check the JIRA server, credentials and parent_query.")
            }
            Self::TicketLinksUnavailable => None,
            Self::BackendRequestFailed => Some("Retry the run; failed tickets are retried."),
            Self::BackendRejected => {
                Some("Check the bot URL and credentials; rejected calls are not retried.")
            }
            Self::MissingRemoteId => {
                Some("The local record was dropped; the next run re-adds the ticket.")
            }
            Self::SummaryGenerationFailed => {
                Some("The raw title was stored; the next run retries the summary.")
            }
            Self::StoreOpenFailed => Some("Check the store path and write permissions."),
            Self::StoreWriteFailed => Some("Check disk space and write permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
