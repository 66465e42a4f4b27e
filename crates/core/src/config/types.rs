use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::integration::IntegrationsConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tickd.db")
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub integrations: SanitizedIntegrationsConfig,
}

/// Sanitized integrations config (credentials hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedIntegrationsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jira: Option<SanitizedTargetConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<SanitizedTargetConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testrail: Option<SanitizedTargetConfig>,
}

/// Sanitized target config (credential replaced by a configured flag)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTargetConfig {
    pub url: String,
    pub credential_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            integrations: SanitizedIntegrationsConfig {
                jira: config.integrations.jira.as_ref().map(|j| SanitizedTargetConfig {
                    url: j.url.clone(),
                    credential_configured: !j.api_token.is_empty(),
                    timeout_secs: j.timeout_secs,
                }),
                github: config
                    .integrations
                    .github
                    .as_ref()
                    .map(|g| SanitizedTargetConfig {
                        url: g.url.clone(),
                        credential_configured: !g.token.is_empty(),
                        timeout_secs: g.timeout_secs,
                    }),
                testrail: config
                    .integrations
                    .testrail
                    .as_ref()
                    .map(|t| SanitizedTargetConfig {
                        url: t.url.clone(),
                        credential_configured: !t.api_key.is_empty(),
                        timeout_secs: t.timeout_secs,
                    }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::JiraConfig;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "tickd.db");
        assert!(config.integrations.jira.is_none());
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
path = "/data/tickets.sqlite"

[integrations.jira]
url = "https://example.atlassian.net"
api_token = "secret"
project_key = "TICK"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path.to_str().unwrap(), "/data/tickets.sqlite");
        assert_eq!(config.integrations.jira.unwrap().project_key, "TICK");
    }

    #[test]
    fn test_sanitized_config_redacts_credentials() {
        let mut config = Config::default();
        config.integrations.jira = Some(JiraConfig {
            url: "https://example.atlassian.net".to_string(),
            api_token: "secret-token".to_string(),
            project_key: "TICK".to_string(),
            timeout_secs: 60,
        });

        let sanitized = SanitizedConfig::from(&config);
        let jira = sanitized.integrations.jira.as_ref().unwrap();
        assert_eq!(jira.url, "https://example.atlassian.net");
        assert!(jira.credential_configured);
        assert_eq!(jira.timeout_secs, 60);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(sanitized.integrations.github.is_none());
    }
}
