//! GitHub issue sync client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::event::{DomainEvent, EventKind};
use crate::ticket::Ticket;

use super::client::{check_response_status, transport_error};
use super::config::GithubConfig;
use super::{DeliveryError, IntegrationClient, IntegrationTarget};

const USER_AGENT: &str = concat!("tickd/", env!("CARGO_PKG_VERSION"));

/// Pushes ticket state to a GitHub repository.
///
/// `created` opens a tracking issue; later events go out as
/// `repository_dispatch` events carrying the issue number and a snapshot
/// of the ticket.
pub struct GithubClient {
    client: Client,
    config: GithubConfig,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    number: u64,
}

impl GithubClient {
    /// Create a new GitHub client with the given configuration.
    pub fn new(config: GithubConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            self.config.url.trim_end_matches('/'),
            self.config.repo,
            path
        )
    }

    async fn post_json(
        &self,
        url: &str,
        payload: serde_json::Value,
    ) -> Result<String, DeliveryError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.token)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(IntegrationTarget::Github, e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        check_response_status(IntegrationTarget::Github, status, &body)?;
        Ok(body)
    }
}

#[async_trait]
impl IntegrationClient for GithubClient {
    fn target(&self) -> IntegrationTarget {
        IntegrationTarget::Github
    }

    async fn deliver(
        &self,
        ticket: &Ticket,
        event: &DomainEvent,
        remote_ref: Option<&str>,
    ) -> Result<Option<String>, DeliveryError> {
        if let EventKind::Created { .. } = event.kind {
            let url = self.repo_url("issues");
            let body = self.post_json(&url, issue_payload(ticket)).await?;
            let created: CreatedIssue = serde_json::from_str(&body).map_err(|e| {
                DeliveryError::Transient(format!("github returned unparseable response: {}", e))
            })?;
            debug!(issue = created.number, ticket_id = %ticket.id, "github issue created");
            return Ok(Some(created.number.to_string()));
        }

        let issue_number = remote_ref.ok_or_else(|| {
            DeliveryError::Permanent(format!("no github issue reference for ticket {}", ticket.id))
        })?;

        let url = self.repo_url("dispatches");
        self.post_json(&url, dispatch_payload(issue_number, ticket, event))
            .await?;
        Ok(None)
    }
}

/// Issue creation payload for a ticket.
fn issue_payload(ticket: &Ticket) -> serde_json::Value {
    json!({
        "title": ticket.title,
        "body": format!("{}\n\nReported by {}", ticket.description, ticket.reporter),
        "labels": ticket.tags,
    })
}

/// `repository_dispatch` payload for a non-create event.
fn dispatch_payload(
    issue_number: &str,
    ticket: &Ticket,
    event: &DomainEvent,
) -> serde_json::Value {
    json!({
        "event_type": format!("ticket_{}", event.kind.kind_name()),
        "client_payload": {
            "issue_number": issue_number,
            "ticket_id": ticket.id,
            "sequence": event.sequence,
            "status": ticket.status,
            "assignee": ticket.assignee,
            "event": event.kind,
        }
    })
}
