//! SQLite-backed ticket store with per-ticket mutation locking.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;

use super::{Comment, Ticket, TicketPriority, TicketStatus};

/// Error type for ticket operations.
#[derive(Debug, Error)]
pub enum TicketError {
    /// Malformed or missing input, user-correctable.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown ticket id.
    #[error("ticket not found: {0}")]
    NotFound(String),

    /// Status transition not allowed by the state machine.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TicketStatus, to: TicketStatus },

    /// Lost race on a resource expected absent.
    #[error("ticket already exists: {0}")]
    Conflict(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

/// Filter for querying tickets.
#[derive(Debug, Clone)]
pub struct TicketFilter {
    /// Filter by current status.
    pub status: Option<TicketStatus>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl Default for TicketFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            status: None,
            limit: 500,
            offset: 0,
        }
    }

    /// Filter by status.
    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// SQLite-backed ticket store.
///
/// Mutations go through [`SqliteTicketStore::mutate`], which serializes
/// concurrent mutations of the same ticket id through a per-id lock while
/// letting mutations of different ids proceed independently. Reads
/// ([`get`](SqliteTicketStore::get), [`list`](SqliteTicketStore::list)) do
/// not take per-ticket locks and observe the last persisted snapshot.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
    // One entry per ticket id, created on demand. Entries are never removed;
    // tickets are never deleted either.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SqliteTicketStore {
    /// Create a new SQLite ticket store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TicketError> {
        let conn = Connection::open(path).map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Create an in-memory SQLite ticket store (useful for testing).
    pub fn in_memory() -> Result<Self, TicketError> {
        let conn =
            Connection::open_in_memory().map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TicketError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                reporter TEXT NOT NULL,
                assignee TEXT,
                priority TEXT NOT NULL,
                status TEXT NOT NULL,
                tags TEXT NOT NULL,
                comments TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
            CREATE INDEX IF NOT EXISTS idx_tickets_created_at ON tickets(created_at);
            "#,
        )
        .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(())
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        Arc::clone(locks.entry(id.to_string()).or_default())
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let id: String = row.get(0)?;
        let title: String = row.get(1)?;
        let description: String = row.get(2)?;
        let reporter: String = row.get(3)?;
        let assignee: Option<String> = row.get(4)?;
        let priority_str: String = row.get(5)?;
        let status_str: String = row.get(6)?;
        let tags_json: String = row.get(7)?;
        let comments_json: String = row.get(8)?;
        let created_at_str: String = row.get(9)?;
        let updated_at_str: String = row.get(10)?;

        // Parse timestamps - use now as fallback (shouldn't happen with valid data)
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let priority = TicketPriority::parse(&priority_str).unwrap_or_default();
        let status = TicketStatus::parse(&status_str).unwrap_or_default();

        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
        let comments: Vec<Comment> = serde_json::from_str(&comments_json).unwrap_or_default();

        Ok(Ticket {
            id,
            title,
            description,
            reporter,
            assignee,
            priority,
            status,
            tags,
            comments,
            created_at,
            updated_at,
        })
    }

    fn get_with_conn(conn: &Connection, id: &str) -> Result<Ticket, TicketError> {
        let result = conn.query_row(
            "SELECT id, title, description, reporter, assignee, priority, status, tags, comments, created_at, updated_at FROM tickets WHERE id = ?",
            params![id],
            Self::row_to_ticket,
        );

        match result {
            Ok(ticket) => Ok(ticket),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(TicketError::NotFound(id.to_string())),
            Err(e) => Err(TicketError::Database(e.to_string())),
        }
    }

    fn persist(conn: &Connection, ticket: &Ticket) -> Result<(), TicketError> {
        let tags_json =
            serde_json::to_string(&ticket.tags).map_err(|e| TicketError::Database(e.to_string()))?;
        let comments_json = serde_json::to_string(&ticket.comments)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        conn.execute(
            "UPDATE tickets SET title = ?, description = ?, reporter = ?, assignee = ?, priority = ?, status = ?, tags = ?, comments = ?, updated_at = ? WHERE id = ?",
            params![
                ticket.title,
                ticket.description,
                ticket.reporter,
                ticket.assignee,
                ticket.priority.as_str(),
                ticket.status.as_str(),
                tags_json,
                comments_json,
                ticket.updated_at.to_rfc3339(),
                ticket.id,
            ],
        )
        .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(())
    }

    /// Insert a new ticket. Fails with `Conflict` if the id is already taken.
    pub fn create(&self, ticket: Ticket) -> Result<Ticket, TicketError> {
        let conn = self.conn.lock().unwrap();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM tickets WHERE id = ?)",
                params![ticket.id],
                |row| row.get(0),
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;
        if exists {
            return Err(TicketError::Conflict(ticket.id.clone()));
        }

        let tags_json =
            serde_json::to_string(&ticket.tags).map_err(|e| TicketError::Database(e.to_string()))?;
        let comments_json = serde_json::to_string(&ticket.comments)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO tickets (id, title, description, reporter, assignee, priority, status, tags, comments, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                ticket.id,
                ticket.title,
                ticket.description,
                ticket.reporter,
                ticket.assignee,
                ticket.priority.as_str(),
                ticket.status.as_str(),
                tags_json,
                comments_json,
                ticket.created_at.to_rfc3339(),
                ticket.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(ticket)
    }

    /// Get a ticket by id.
    pub fn get(&self, id: &str) -> Result<Ticket, TicketError> {
        let conn = self.conn.lock().unwrap();
        Self::get_with_conn(&conn, id)
    }

    /// Apply a mutation to a ticket inside its exclusive critical section.
    ///
    /// The closure validates and applies the change in place; any error from
    /// it rejects the mutation without persisting anything. On success the
    /// store bumps `updated_at` and persists the whole ticket atomically.
    /// Returns the persisted ticket along with the closure's output.
    pub fn mutate<T, F>(&self, id: &str, apply: F) -> Result<(Ticket, T), TicketError>
    where
        F: FnOnce(&mut Ticket) -> Result<T, TicketError>,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().unwrap();

        let mut ticket = self.get(id)?;
        let out = apply(&mut ticket)?;
        ticket.updated_at = Utc::now();

        let conn = self.conn.lock().unwrap();
        Self::persist(&conn, &ticket)?;

        Ok((ticket, out))
    }

    /// List tickets matching the filter, ordered by creation time (ties by id).
    pub fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, mut sql_params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT id, title, description, reporter, assignee, priority, status, tags, comments, created_at, updated_at FROM tickets {} ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        sql_params.push(Box::new(filter.limit));
        sql_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_ticket)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        let mut tickets = Vec::new();
        for row_result in rows {
            tickets.push(row_result.map_err(|e| TicketError::Database(e.to_string()))?);
        }

        Ok(tickets)
    }

    /// Count tickets matching the filter.
    pub fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, sql_params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM tickets {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn build_where_clause(filter: &TicketFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            sql_params.push(Box::new(status.as_str()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, sql_params)
    }
}
