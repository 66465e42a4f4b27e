//! Integration client trait and shared delivery types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::DomainEvent;
use crate::ticket::Ticket;

/// An external system that receives projected ticket state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationTarget {
    Jira,
    Github,
    Testrail,
}

impl IntegrationTarget {
    /// Returns the target as its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationTarget::Jira => "jira",
            IntegrationTarget::Github => "github",
            IntegrationTarget::Testrail => "testrail",
        }
    }

    /// Parse a wire string back into a target.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "jira" => Some(IntegrationTarget::Jira),
            "github" => Some(IntegrationTarget::Github),
            "testrail" => Some(IntegrationTarget::Testrail),
            _ => None,
        }
    }
}

impl std::fmt::Display for IntegrationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from a single delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Retryable failure: network error or 5xx-equivalent response.
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Non-retryable failure: the target rejected the payload (4xx-equivalent).
    #[error("permanently rejected: {0}")]
    Permanent(String),
}

/// A client that can push one ticket event to an external system.
///
/// `remote_ref` is the external system's reference for the ticket (issue
/// key, issue number, run id), established when the `created` event is
/// delivered and carried on the push record afterwards. Delivering a
/// `created` event returns the newly established reference.
#[async_trait]
pub trait IntegrationClient: Send + Sync {
    /// Which target this client talks to.
    fn target(&self) -> IntegrationTarget;

    /// Deliver one event. Returns the remote reference established by this
    /// delivery, if any.
    async fn deliver(
        &self,
        ticket: &Ticket,
        event: &DomainEvent,
        remote_ref: Option<&str>,
    ) -> Result<Option<String>, DeliveryError>;
}

/// Map a reqwest response status to a delivery result.
///
/// 2xx is success, 4xx is a permanent rejection, everything else
/// (5xx, unexpected codes) is transient.
pub(crate) fn check_response_status(
    target: IntegrationTarget,
    status: reqwest::StatusCode,
    body: &str,
) -> Result<(), DeliveryError> {
    if status.is_success() {
        return Ok(());
    }
    let detail = format!(
        "{} returned HTTP {}: {}",
        target,
        status,
        body.chars().take(200).collect::<String>()
    );
    if status.is_client_error() {
        Err(DeliveryError::Permanent(detail))
    } else {
        Err(DeliveryError::Transient(detail))
    }
}

/// Map a reqwest transport error to a delivery error. Network-level
/// failures are always transient.
pub(crate) fn transport_error(target: IntegrationTarget, e: reqwest::Error) -> DeliveryError {
    DeliveryError::Transient(format!("{} request failed: {}", target, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_roundtrip() {
        for target in [
            IntegrationTarget::Jira,
            IntegrationTarget::Github,
            IntegrationTarget::Testrail,
        ] {
            assert_eq!(IntegrationTarget::parse(target.as_str()), Some(target));
        }
        assert_eq!(IntegrationTarget::parse("slack"), None);
    }

    #[test]
    fn test_status_mapping() {
        let target = IntegrationTarget::Jira;

        assert!(check_response_status(target, reqwest::StatusCode::OK, "").is_ok());
        assert!(check_response_status(target, reqwest::StatusCode::CREATED, "").is_ok());

        let err = check_response_status(target, reqwest::StatusCode::BAD_REQUEST, "bad field")
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Permanent(_)));

        let err = check_response_status(target, reqwest::StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert!(matches!(err, DeliveryError::Transient(_)));
    }

    #[test]
    fn test_status_mapping_truncates_body() {
        let long_body = "x".repeat(1000);
        let err = check_response_status(
            IntegrationTarget::Github,
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            &long_body,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.len() < 300);
    }
}
