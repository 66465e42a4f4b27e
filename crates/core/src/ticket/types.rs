//! Core ticket data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority of a ticket, used for triage ordering in clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TicketPriority {
    /// Returns the priority as its wire string (for storage and filtering).
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Critical => "critical",
        }
    }

    /// Parse a wire string back into a priority.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TicketPriority::Low),
            "medium" => Some(TicketPriority::Medium),
            "high" => Some(TicketPriority::High),
            "critical" => Some(TicketPriority::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ticket.
///
/// Status flow:
/// ```text
/// open -> in_progress -> resolved -> closed
///              ^  |          |
///              |  v          v
///           blocked     in_progress (reopen)
/// ```
///
/// `closed` is terminal: no outgoing transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Blocked,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// Returns the status as its wire string (for storage and filtering).
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Blocked => "blocked",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    /// Parse a wire string back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(TicketStatus::Open),
            "in_progress" => Some(TicketStatus::InProgress),
            "blocked" => Some(TicketStatus::Blocked),
            "resolved" => Some(TicketStatus::Resolved),
            "closed" => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    /// Statuses reachable from this one.
    pub fn allowed_transitions(&self) -> &'static [TicketStatus] {
        match self {
            TicketStatus::Open => &[TicketStatus::InProgress, TicketStatus::Closed],
            TicketStatus::InProgress => &[
                TicketStatus::Blocked,
                TicketStatus::Resolved,
                TicketStatus::Closed,
            ],
            TicketStatus::Blocked => &[TicketStatus::InProgress, TicketStatus::Closed],
            TicketStatus::Resolved => &[TicketStatus::Closed, TicketStatus::InProgress],
            TicketStatus::Closed => &[],
        }
    }

    /// Returns true if `target` is reachable from this status.
    pub fn can_transition_to(&self, target: TicketStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Returns true if this is a terminal status (no further transitions).
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comment on a ticket. Owned exclusively by its ticket, append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    /// Who wrote the comment.
    pub author: String,
    /// Comment text, never empty.
    pub body: String,
    /// When the comment was added.
    pub created_at: DateTime<Utc>,
}

/// A tracked work item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    /// Unique identifier (UUID), immutable after creation.
    pub id: String,

    /// Short summary, trimmed and never empty.
    pub title: String,

    /// Longer description, never empty.
    pub description: String,

    /// Who reported the ticket, immutable after creation.
    pub reporter: String,

    /// Current owner, absent until assigned. Never set to an empty string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Triage priority.
    pub priority: TicketPriority,

    /// Current lifecycle status.
    pub status: TicketStatus,

    /// Deduplicated tags, insertion order preserved.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Comments in insertion order, append-only.
    #[serde(default)]
    pub comments: Vec<Comment>,

    /// When the ticket was created.
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp, bumped on every mutation.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_defaults_to_medium() {
        assert_eq!(TicketPriority::default(), TicketPriority::Medium);
    }

    #[test]
    fn test_priority_roundtrip() {
        for p in [
            TicketPriority::Low,
            TicketPriority::Medium,
            TicketPriority::High,
            TicketPriority::Critical,
        ] {
            assert_eq!(TicketPriority::parse(p.as_str()), Some(p));
        }
        assert_eq!(TicketPriority::parse("urgent"), None);
    }

    #[test]
    fn test_status_roundtrip() {
        for s in [
            TicketStatus::Open,
            TicketStatus::InProgress,
            TicketStatus::Blocked,
            TicketStatus::Resolved,
            TicketStatus::Closed,
        ] {
            assert_eq!(TicketStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(TicketStatus::parse("reopened"), None);
    }

    #[test]
    fn test_open_transitions() {
        let open = TicketStatus::Open;
        assert!(open.can_transition_to(TicketStatus::InProgress));
        assert!(open.can_transition_to(TicketStatus::Closed));
        assert!(!open.can_transition_to(TicketStatus::Blocked));
        assert!(!open.can_transition_to(TicketStatus::Resolved));
        assert!(!open.can_transition_to(TicketStatus::Open));
    }

    #[test]
    fn test_in_progress_transitions() {
        let ip = TicketStatus::InProgress;
        assert!(ip.can_transition_to(TicketStatus::Blocked));
        assert!(ip.can_transition_to(TicketStatus::Resolved));
        assert!(ip.can_transition_to(TicketStatus::Closed));
        assert!(!ip.can_transition_to(TicketStatus::Open));
    }

    #[test]
    fn test_blocked_transitions() {
        let blocked = TicketStatus::Blocked;
        assert!(blocked.can_transition_to(TicketStatus::InProgress));
        assert!(blocked.can_transition_to(TicketStatus::Closed));
        assert!(!blocked.can_transition_to(TicketStatus::Resolved));
    }

    #[test]
    fn test_resolved_can_reopen() {
        let resolved = TicketStatus::Resolved;
        assert!(resolved.can_transition_to(TicketStatus::Closed));
        assert!(resolved.can_transition_to(TicketStatus::InProgress));
        assert!(!resolved.can_transition_to(TicketStatus::Blocked));
    }

    #[test]
    fn test_closed_is_terminal() {
        let closed = TicketStatus::Closed;
        assert!(closed.is_terminal());
        assert!(closed.allowed_transitions().is_empty());
        for target in [
            TicketStatus::Open,
            TicketStatus::InProgress,
            TicketStatus::Blocked,
            TicketStatus::Resolved,
            TicketStatus::Closed,
        ] {
            assert!(!closed.can_transition_to(target));
        }
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, r#""in_progress""#);

        let parsed: TicketStatus = serde_json::from_str(r#""blocked""#).unwrap();
        assert_eq!(parsed, TicketStatus::Blocked);
    }

    #[test]
    fn test_ticket_serialization_skips_absent_assignee() {
        let now = Utc::now();
        let ticket = Ticket {
            id: "t-1".to_string(),
            title: "Login broken".to_string(),
            description: "500 on submit".to_string(),
            reporter: "alice".to_string(),
            assignee: None,
            priority: TicketPriority::High,
            status: TicketStatus::Open,
            tags: vec!["auth".to_string(), "bug".to_string()],
            comments: vec![],
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_string(&ticket).unwrap();
        assert!(!json.contains("assignee"));
        assert!(json.contains(r#""priority":"high""#));
        assert!(json.contains(r#""status":"open""#));

        let parsed: Ticket = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ticket);
    }
}
