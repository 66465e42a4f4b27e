//! Integration dispatcher: projects ticket state to external systems.

mod client;
mod config;
mod dispatcher;
mod github;
mod jira;
mod push_records;
mod testrail;

pub use client::{DeliveryError, IntegrationClient, IntegrationTarget};
pub use config::{GithubConfig, IntegrationsConfig, JiraConfig, RetryConfig, TestRailConfig};
pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher, DispatcherHandle};
pub use github::GithubClient;
pub use jira::JiraClient;
pub use push_records::{PushRecord, PushStatus, PushStoreError, SqlitePushRecordStore};
pub use testrail::{run_status_for, TestRailClient};
