//! Integration dispatcher configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the integration dispatcher and its targets.
///
/// A target with no config section is simply not dispatched to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    /// Jira issue sync.
    #[serde(default)]
    pub jira: Option<JiraConfig>,

    /// GitHub issue creation and event dispatch.
    #[serde(default)]
    pub github: Option<GithubConfig>,

    /// TestRail run push.
    #[serde(default)]
    pub testrail: Option<TestRailConfig>,

    /// Retry policy for transient delivery failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-target wakeup queue capacity. A full queue drops the wakeup,
    /// which is safe because every wakeup drains all undelivered events.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Retry policy for transient delivery failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum delivery attempts per event (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between attempts in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between attempts in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

/// Jira target configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraConfig {
    /// Jira base URL (e.g., "https://example.atlassian.net").
    pub url: String,
    /// API token used as a bearer credential.
    pub api_token: String,
    /// Project key new issues are created under.
    pub project_key: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

/// GitHub target configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// API base URL.
    #[serde(default = "default_github_url")]
    pub url: String,
    /// Personal access token.
    pub token: String,
    /// Repository in "owner/name" form.
    pub repo: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

/// TestRail target configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRailConfig {
    /// TestRail base URL (e.g., "https://example.testrail.io").
    pub url: String,
    /// API key.
    pub api_key: String,
    /// Project runs are created under.
    pub project_id: u32,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30_000 // 30 seconds
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_timeout() -> u32 {
    30
}

fn default_github_url() -> String {
    "https://api.github.com".to_string()
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            jira: None,
            github: None,
            testrail: None,
            retry: RetryConfig::default(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Delay before the attempt following `attempt` (1-indexed), with
    /// exponential growth capped at `max_delay_ms`.
    pub fn delay_after(&self, attempt: u32) -> std::time::Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exp as i32);
        std::time::Duration::from_millis((delay as u64).min(self.max_delay_ms))
    }
}
