//! SQLite-backed append-only event log.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;

use super::{DomainEvent, EventKind};

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Append-only, per-ticket-ordered record of ticket mutations.
///
/// Callers append from inside the ticket's critical section, which makes
/// the per-ticket sequence gap-free and exactly matching mutation order.
/// Reads take the connection lock only for the duration of the query and
/// never hold a ticket's mutation lock.
pub struct SqliteEventLog {
    conn: Mutex<Connection>,
}

impl SqliteEventLog {
    /// Create a new SQLite event log, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, EventLogError> {
        let conn = Connection::open(path).map_err(|e| EventLogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite event log (useful for testing).
    pub fn in_memory() -> Result<Self, EventLogError> {
        let conn =
            Connection::open_in_memory().map_err(|e| EventLogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), EventLogError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS ticket_events (
                ticket_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                PRIMARY KEY (ticket_id, sequence)
            );

            CREATE INDEX IF NOT EXISTS idx_ticket_events_kind ON ticket_events(kind);
            "#,
        )
        .map_err(|e| EventLogError::Database(e.to_string()))?;

        Ok(())
    }

    /// Append an event, assigning the next sequence number for the ticket.
    ///
    /// Returns the assigned sequence (1 for the first event of a ticket).
    pub fn append(&self, ticket_id: &str, kind: EventKind) -> Result<u64, EventLogError> {
        let conn = self.conn.lock().unwrap();

        let last: u64 = conn
            .query_row(
                "SELECT COALESCE(MAX(sequence), 0) FROM ticket_events WHERE ticket_id = ?",
                params![ticket_id],
                |row| row.get(0),
            )
            .map_err(|e| EventLogError::Database(e.to_string()))?;
        let sequence = last + 1;

        let payload = serde_json::to_string(&kind)
            .map_err(|e| EventLogError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO ticket_events (ticket_id, sequence, kind, payload, occurred_at) VALUES (?, ?, ?, ?, ?)",
            params![
                ticket_id,
                sequence,
                kind.kind_name(),
                payload,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| EventLogError::Database(e.to_string()))?;

        Ok(sequence)
    }

    /// Read events for a ticket with sequence greater than `after_sequence`,
    /// in sequence order.
    pub fn read_since(
        &self,
        ticket_id: &str,
        after_sequence: u64,
    ) -> Result<Vec<DomainEvent>, EventLogError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT ticket_id, sequence, payload, occurred_at FROM ticket_events WHERE ticket_id = ? AND sequence > ? ORDER BY sequence ASC",
            )
            .map_err(|e| EventLogError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![ticket_id, after_sequence], Self::row_to_event)
            .map_err(|e| EventLogError::Database(e.to_string()))?;

        let mut events = Vec::new();
        for row_result in rows {
            events.push(row_result.map_err(|e| EventLogError::Database(e.to_string()))?);
        }

        Ok(events)
    }

    /// The highest sequence appended for a ticket (0 if none).
    pub fn latest_sequence(&self, ticket_id: &str) -> Result<u64, EventLogError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) FROM ticket_events WHERE ticket_id = ?",
            params![ticket_id],
            |row| row.get(0),
        )
        .map_err(|e| EventLogError::Database(e.to_string()))
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<DomainEvent> {
        let ticket_id: String = row.get(0)?;
        let sequence: u64 = row.get(1)?;
        let payload: String = row.get(2)?;
        let occurred_at_str: String = row.get(3)?;

        let occurred_at = DateTime::parse_from_rfc3339(&occurred_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let kind: EventKind = serde_json::from_str(&payload).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(DomainEvent {
            ticket_id,
            sequence,
            occurred_at,
            kind,
        })
    }
}
