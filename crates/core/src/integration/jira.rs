//! Jira issue sync client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::event::{DomainEvent, EventKind};
use crate::ticket::{Ticket, TicketPriority};

use super::client::{check_response_status, transport_error};
use super::config::JiraConfig;
use super::{DeliveryError, IntegrationClient, IntegrationTarget};

/// Pushes ticket state to a Jira project.
///
/// Delivering `created` creates the issue and yields its key; later events
/// address that key directly.
pub struct JiraClient {
    client: Client,
    config: JiraConfig,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    key: String,
}

impl JiraClient {
    /// Create a new Jira client with the given configuration.
    pub fn new(config: JiraConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn issue_url(&self, key: &str) -> String {
        format!(
            "{}/rest/api/2/issue/{}",
            self.base_url(),
            urlencoding::encode(key)
        )
    }

    async fn create_issue(&self, ticket: &Ticket) -> Result<String, DeliveryError> {
        let url = format!("{}/rest/api/2/issue", self.base_url());
        let payload = issue_payload(&self.config.project_key, ticket);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(IntegrationTarget::Jira, e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        check_response_status(IntegrationTarget::Jira, status, &body)?;

        let created: CreatedIssue = serde_json::from_str(&body).map_err(|e| {
            DeliveryError::Transient(format!("jira returned unparseable response: {}", e))
        })?;

        debug!(issue_key = %created.key, ticket_id = %ticket.id, "jira issue created");
        Ok(created.key)
    }

    async fn post_json(&self, url: &str, payload: serde_json::Value) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(IntegrationTarget::Jira, e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        check_response_status(IntegrationTarget::Jira, status, &body)
    }

    async fn put_json(&self, url: &str, payload: serde_json::Value) -> Result<(), DeliveryError> {
        let response = self
            .client
            .put(url)
            .bearer_auth(&self.config.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(IntegrationTarget::Jira, e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        check_response_status(IntegrationTarget::Jira, status, &body)
    }
}

#[async_trait]
impl IntegrationClient for JiraClient {
    fn target(&self) -> IntegrationTarget {
        IntegrationTarget::Jira
    }

    async fn deliver(
        &self,
        ticket: &Ticket,
        event: &DomainEvent,
        remote_ref: Option<&str>,
    ) -> Result<Option<String>, DeliveryError> {
        if let EventKind::Created { .. } = event.kind {
            return self.create_issue(ticket).await.map(Some);
        }

        let key = remote_ref.ok_or_else(|| {
            DeliveryError::Permanent(format!("no jira issue reference for ticket {}", ticket.id))
        })?;

        match &event.kind {
            EventKind::Commented { author } => {
                let body = ticket
                    .comments
                    .last()
                    .map(|c| c.body.clone())
                    .unwrap_or_default();
                let url = format!("{}/comment", self.issue_url(key));
                self.post_json(&url, json!({ "body": format!("{}: {}", author, body) }))
                    .await?;
            }
            EventKind::Assigned { assignee } => {
                let url = format!("{}/assignee", self.issue_url(key));
                self.put_json(&url, json!({ "name": assignee })).await?;
            }
            EventKind::Transitioned { from, to } => {
                let url = format!("{}/comment", self.issue_url(key));
                self.post_json(
                    &url,
                    json!({ "body": format!("status changed: {} -> {}", from, to) }),
                )
                .await?;
            }
            // Created was handled above.
            EventKind::Created { .. } => {}
        }

        Ok(None)
    }
}

/// Jira priority name for a ticket priority.
fn jira_priority(priority: TicketPriority) -> &'static str {
    match priority {
        TicketPriority::Low => "Low",
        TicketPriority::Medium => "Medium",
        TicketPriority::High => "High",
        TicketPriority::Critical => "Highest",
    }
}

/// Issue creation payload for a ticket.
fn issue_payload(project_key: &str, ticket: &Ticket) -> serde_json::Value {
    json!({
        "fields": {
            "project": { "key": project_key },
            "summary": ticket.title,
            "description": format!("{}\n\nReported by {}", ticket.description, ticket.reporter),
            "labels": ticket.tags,
            "priority": { "name": jira_priority(ticket.priority) },
        }
    })
}
