//! Per-ticket-per-target delivery progress records.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::IntegrationTarget;

#[derive(Debug, Error)]
pub enum PushStoreError {
    #[error("database error: {0}")]
    Database(String),
}

/// Delivery state of a `(ticket, target)` pair.
///
/// `Failed` records a permanent (non-retryable) verdict for the event at
/// `last_attempted_sequence`; transient exhaustion leaves the record
/// `Pending` so delivery can resume later.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    #[default]
    Pending,
    Delivered,
    Failed,
}

impl PushStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushStatus::Pending => "pending",
            PushStatus::Delivered => "delivered",
            PushStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PushStatus::Pending),
            "delivered" => Some(PushStatus::Delivered),
            "failed" => Some(PushStatus::Failed),
            _ => None,
        }
    }
}

/// Delivery progress and idempotency marker for one `(ticket, target)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushRecord {
    pub ticket_id: String,
    pub target: IntegrationTarget,
    /// External system's reference for the ticket (issue key, issue number,
    /// run id), set when the `created` event is delivered.
    pub remote_ref: Option<String>,
    /// Highest sequence a delivery was attempted for.
    pub last_attempted_sequence: u64,
    /// Highest sequence delivered successfully. Events at or below this are
    /// never delivered again.
    pub last_delivered_sequence: u64,
    pub status: PushStatus,
    /// Total delivery attempts across all events of this pair.
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PushRecord {
    fn fresh(ticket_id: &str, target: IntegrationTarget) -> Self {
        Self {
            ticket_id: ticket_id.to_string(),
            target,
            remote_ref: None,
            last_attempted_sequence: 0,
            last_delivered_sequence: 0,
            status: PushStatus::Pending,
            attempt_count: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// SQLite-backed push record store. Mutated only by the dispatcher.
pub struct SqlitePushRecordStore {
    conn: Mutex<Connection>,
}

impl SqlitePushRecordStore {
    /// Create a new store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, PushStoreError> {
        let conn = Connection::open(path).map_err(|e| PushStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, PushStoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| PushStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), PushStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS push_records (
                ticket_id TEXT NOT NULL,
                target TEXT NOT NULL,
                remote_ref TEXT,
                last_attempted_sequence INTEGER NOT NULL DEFAULT 0,
                last_delivered_sequence INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (ticket_id, target)
            );
            "#,
        )
        .map_err(|e| PushStoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<PushRecord> {
        let ticket_id: String = row.get(0)?;
        let target_str: String = row.get(1)?;
        let remote_ref: Option<String> = row.get(2)?;
        let last_attempted_sequence: u64 = row.get(3)?;
        let last_delivered_sequence: u64 = row.get(4)?;
        let status_str: String = row.get(5)?;
        let attempt_count: u32 = row.get(6)?;
        let last_error: Option<String> = row.get(7)?;
        let updated_at_str: String = row.get(8)?;

        let target = IntegrationTarget::parse(&target_str).unwrap_or(IntegrationTarget::Jira);
        let status = PushStatus::parse(&status_str).unwrap_or_default();
        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(PushRecord {
            ticket_id,
            target,
            remote_ref,
            last_attempted_sequence,
            last_delivered_sequence,
            status,
            attempt_count,
            last_error,
            updated_at,
        })
    }

    /// Get the record for a pair, if any delivery was ever attempted.
    pub fn get(
        &self,
        ticket_id: &str,
        target: IntegrationTarget,
    ) -> Result<Option<PushRecord>, PushStoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT ticket_id, target, remote_ref, last_attempted_sequence, last_delivered_sequence, status, attempt_count, last_error, updated_at FROM push_records WHERE ticket_id = ? AND target = ?",
            params![ticket_id, target.as_str()],
            Self::row_to_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PushStoreError::Database(e.to_string())),
        }
    }

    /// Get the record for a pair, or a fresh one if none exists yet.
    pub fn get_or_default(
        &self,
        ticket_id: &str,
        target: IntegrationTarget,
    ) -> Result<PushRecord, PushStoreError> {
        Ok(self
            .get(ticket_id, target)?
            .unwrap_or_else(|| PushRecord::fresh(ticket_id, target)))
    }

    /// All records for a ticket.
    pub fn list_for_ticket(&self, ticket_id: &str) -> Result<Vec<PushRecord>, PushStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT ticket_id, target, remote_ref, last_attempted_sequence, last_delivered_sequence, status, attempt_count, last_error, updated_at FROM push_records WHERE ticket_id = ? ORDER BY target ASC",
            )
            .map_err(|e| PushStoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![ticket_id], Self::row_to_record)
            .map_err(|e| PushStoreError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            records.push(row_result.map_err(|e| PushStoreError::Database(e.to_string()))?);
        }
        Ok(records)
    }

    /// Record one delivery attempt for a sequence. Bumps `attempt_count`,
    /// moves `last_attempted_sequence` forward and resets status to pending.
    pub fn record_attempt(
        &self,
        ticket_id: &str,
        target: IntegrationTarget,
        sequence: u64,
    ) -> Result<(), PushStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO push_records (ticket_id, target, last_attempted_sequence, status, attempt_count, updated_at)
            VALUES (?1, ?2, ?3, 'pending', 1, ?4)
            ON CONFLICT(ticket_id, target) DO UPDATE SET
                last_attempted_sequence = ?3,
                status = 'pending',
                attempt_count = attempt_count + 1,
                updated_at = ?4
            "#,
            params![ticket_id, target.as_str(), sequence, Utc::now().to_rfc3339()],
        )
        .map_err(|e| PushStoreError::Database(e.to_string()))?;
        Ok(())
    }

    /// Mark a sequence delivered, recording the remote reference if one was
    /// just established.
    pub fn mark_delivered(
        &self,
        ticket_id: &str,
        target: IntegrationTarget,
        sequence: u64,
        remote_ref: Option<&str>,
    ) -> Result<(), PushStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE push_records SET
                last_delivered_sequence = ?3,
                status = 'delivered',
                last_error = NULL,
                remote_ref = COALESCE(?4, remote_ref),
                updated_at = ?5
            WHERE ticket_id = ?1 AND target = ?2
            "#,
            params![
                ticket_id,
                target.as_str(),
                sequence,
                remote_ref,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| PushStoreError::Database(e.to_string()))?;
        Ok(())
    }

    /// Mark the pair permanently failed at a sequence.
    pub fn mark_failed(
        &self,
        ticket_id: &str,
        target: IntegrationTarget,
        sequence: u64,
        error: &str,
    ) -> Result<(), PushStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE push_records SET last_attempted_sequence = ?3, status = 'failed', last_error = ?4, updated_at = ?5 WHERE ticket_id = ?1 AND target = ?2",
            params![
                ticket_id,
                target.as_str(),
                sequence,
                error,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| PushStoreError::Database(e.to_string()))?;
        Ok(())
    }

    /// Record a transient failure without a permanent verdict: the record
    /// stays pending so the next wakeup resumes from it.
    pub fn record_transient(
        &self,
        ticket_id: &str,
        target: IntegrationTarget,
        error: &str,
    ) -> Result<(), PushStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE push_records SET status = 'pending', last_error = ?3, updated_at = ?4 WHERE ticket_id = ?1 AND target = ?2",
            params![ticket_id, target.as_str(), error, Utc::now().to_rfc3339()],
        )
        .map_err(|e| PushStoreError::Database(e.to_string()))?;
        Ok(())
    }

    /// Clear a permanent failure verdict so a manual sync can retry it.
    pub fn reset_failure(
        &self,
        ticket_id: &str,
        target: IntegrationTarget,
    ) -> Result<(), PushStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE push_records SET status = 'pending', updated_at = ?3 WHERE ticket_id = ?1 AND target = ?2 AND status = 'failed'",
            params![ticket_id, target.as_str(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| PushStoreError::Database(e.to_string()))?;
        Ok(())
    }
}
