//! Typed access to the local sync store.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{StoreError, open_in_memory, open_store};
use crate::model::{
    BotKind, LocalTicketRecord, SubmissionAction, SubmissionRecord, Ticket, summary_hash,
};

const SUBMISSION_COLUMNS: &str = "ticket_key, bot_name, bot_kind, remote_id, summary_text, \
     summary_hash, action, status, submitted_at_us";

const TICKET_COLUMNS: &str = "ticket_key, summary, child_count, summary_hash, created_at_us, \
     updated_at_us, bot_response_received, processed_version";

/// Per-bot submission count, as shown by `kbsync status`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BotSubmissionCount {
    pub bot_name: String,
    pub bot_kind: BotKind,
    pub count: usize,
}

/// Owner of the store connection.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open the on-disk store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            conn: open_store(path)?,
        })
    }

    /// Open a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if migration fails.
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: open_in_memory()?,
        })
    }

    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    // -----------------------------------------------------------------------
    // ticket_index / ticket_descendants
    // -----------------------------------------------------------------------

    /// All local ticket records keyed by ticket key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn local_records(&self) -> Result<HashMap<String, LocalTicketRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TICKET_COLUMNS} FROM ticket_index"))?;
        let rows = stmt.query_map([], row_to_local_record)?;

        let mut out = HashMap::new();
        for row in rows {
            let record = row?;
            out.insert(record.ticket_key.clone(), record);
        }
        Ok(out)
    }

    /// One local ticket record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn local_record(&self, ticket_key: &str) -> Result<Option<LocalTicketRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {TICKET_COLUMNS} FROM ticket_index WHERE ticket_key = ?1"),
                params![ticket_key],
                row_to_local_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Upsert a ticket record and replace its descendant list atomically.
    ///
    /// `child_count` is taken from `descendants`. The stored hash is always
    /// computed from `summary`. Re-saving bumps `processed_version` and keeps
    /// the first `created_at_us`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any statement fails; nothing is written then.
    pub fn save_ticket(
        &mut self,
        ticket_key: &str,
        summary: &str,
        descendants: &[Ticket],
        bot_response_received: bool,
    ) -> Result<LocalTicketRecord, StoreError> {
        let now_us = chrono::Utc::now().timestamp_micros();
        let hash = summary_hash(summary);
        let child_count = i64::try_from(descendants.len()).unwrap_or(i64::MAX);

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO ticket_index (
                ticket_key, summary, child_count, summary_hash, bot_response_received,
                processed_version, created_at_us, updated_at_us
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
            ON CONFLICT(ticket_key) DO UPDATE SET
                summary = excluded.summary,
                child_count = excluded.child_count,
                summary_hash = excluded.summary_hash,
                bot_response_received = excluded.bot_response_received,
                processed_version = ticket_index.processed_version + 1,
                updated_at_us = excluded.updated_at_us",
            params![ticket_key, summary, child_count, hash, bot_response_received, now_us],
        )?;

        tx.execute(
            "DELETE FROM ticket_descendants WHERE parent_key = ?1",
            params![ticket_key],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT OR REPLACE INTO ticket_descendants
                    (parent_key, child_key, title, position, updated_at_us)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, child) in descendants.iter().enumerate() {
                let position = i64::try_from(position).unwrap_or(i64::MAX);
                insert.execute(params![ticket_key, child.key, child.title, position, now_us])?;
            }
        }

        let record = tx.query_row(
            &format!("SELECT {TICKET_COLUMNS} FROM ticket_index WHERE ticket_key = ?1"),
            params![ticket_key],
            row_to_local_record,
        )?;
        tx.commit()?;

        tracing::debug!(
            ticket = ticket_key,
            child_count = descendants.len(),
            version = record.processed_version,
            "saved ticket record"
        );
        Ok(record)
    }

    /// Stored descendant list of a ticket, in discovery order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn descendants(&self, ticket_key: &str) -> Result<Vec<Ticket>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT child_key, title FROM ticket_descendants
             WHERE parent_key = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![ticket_key], |row| {
            Ok(Ticket::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Number of local ticket records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn ticket_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ticket_index", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    // -----------------------------------------------------------------------
    // bot_submissions
    // -----------------------------------------------------------------------

    /// Every submission recorded for `bot_name`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn submissions(&self, bot_name: &str) -> Result<Vec<SubmissionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM bot_submissions
             WHERE bot_name = ?1 ORDER BY submitted_at_us, rowid"
        ))?;
        let rows = stmt.query_map(params![bot_name], row_to_submission)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// The submission of one ticket to one bot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn submission(
        &self,
        ticket_key: &str,
        bot_name: &str,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM bot_submissions
                     WHERE ticket_key = ?1 AND bot_name = ?2"
                ),
                params![ticket_key, bot_name],
                row_to_submission,
            )
            .optional()?;
        Ok(record)
    }

    /// Insert or replace the submission keyed by (ticket, bot).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    pub fn put_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO bot_submissions ({SUBMISSION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                record.ticket_key,
                record.bot_name,
                record.bot_kind.as_str(),
                record.remote_id,
                record.summary_text,
                record.summary_hash,
                record.action.as_str(),
                record.status,
                record.submitted_at_us,
            ],
        )?;
        Ok(())
    }

    /// Drop the submission keyed by (ticket, bot). Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    pub fn delete_submission(&self, ticket_key: &str, bot_name: &str) -> Result<bool, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM bot_submissions WHERE ticket_key = ?1 AND bot_name = ?2",
            params![ticket_key, bot_name],
        )?;
        Ok(removed > 0)
    }

    /// Submission counts grouped by bot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn submission_counts(&self) -> Result<Vec<BotSubmissionCount>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT bot_name, bot_kind, COUNT(*) FROM bot_submissions
             GROUP BY bot_name, bot_kind ORDER BY bot_name",
        )?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(1)?;
            let count: i64 = row.get(2)?;
            Ok(BotSubmissionCount {
                bot_name: row.get(0)?,
                bot_kind: parse_column(1, &kind)?,
                count: usize::try_from(count).unwrap_or(0),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    // -----------------------------------------------------------------------
    // resets
    // -----------------------------------------------------------------------

    /// Clear all ticket records and their descendants in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the transaction fails; nothing is cleared then.
    pub fn clear_tickets(&mut self) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM ticket_descendants", [])?;
        tx.execute("DELETE FROM ticket_index", [])?;
        tx.commit()?;
        Ok(())
    }

    /// Clear ticket tables and the submissions of `bot_name` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the transaction fails; nothing is cleared then.
    pub fn reset_for_bot(&mut self, bot_name: &str) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM ticket_descendants", [])?;
        let tickets = tx.execute("DELETE FROM ticket_index", [])?;
        let submissions = tx.execute(
            "DELETE FROM bot_submissions WHERE bot_name = ?1",
            params![bot_name],
        )?;
        tx.commit()?;
        tracing::info!(bot = bot_name, tickets, submissions, "local store reset");
        Ok(())
    }
}

fn parse_column<T>(index: usize, value: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().map_err(|message: String| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            message.into(),
        )
    })
}

fn row_to_local_record(row: &Row<'_>) -> rusqlite::Result<LocalTicketRecord> {
    let child_count: i64 = row.get(2)?;
    Ok(LocalTicketRecord {
        ticket_key: row.get(0)?,
        summary: row.get(1)?,
        child_count: usize::try_from(child_count).unwrap_or(0),
        summary_hash: row.get(3)?,
        created_at_us: row.get(4)?,
        updated_at_us: row.get(5)?,
        bot_response_received: row.get(6)?,
        processed_version: row.get(7)?,
    })
}

fn row_to_submission(row: &Row<'_>) -> rusqlite::Result<SubmissionRecord> {
    let kind: String = row.get(2)?;
    let action: String = row.get(6)?;
    Ok(SubmissionRecord {
        ticket_key: row.get(0)?,
        bot_name: row.get(1)?,
        bot_kind: parse_column(2, &kind)?,
        remote_id: row.get(3)?,
        summary_text: row.get(4)?,
        summary_hash: row.get(5)?,
        action: parse_column(6, &action)?,
        status: row.get(7)?,
        submitted_at_us: row.get(8)?,
    })
}
