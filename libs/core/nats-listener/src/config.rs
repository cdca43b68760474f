//! Listener configuration.

use crate::error::ListenerError;
use crate::registry::DEFAULT_HANDLER;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// Default JetStream request timeout in seconds.
pub const DEFAULT_CLIENT_TIMEOUT: f64 = 3600.0;

fn default_servers() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}

fn default_client_timeout() -> f64 {
    DEFAULT_CLIENT_TIMEOUT
}

fn default_callback() -> String {
    DEFAULT_HANDLER.to_string()
}

/// Accept `NATS_URL` as either a single string or a list of strings.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

/// Connection and consumer settings for the listener.
///
/// Built from a JSON object ([`ListenerConfig::from_json_file`]) or from
/// process environment variables ([`ListenerConfig::from_env`]); both use
/// the same key names. Settings are immutable once constructed.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Broker URL or URLs. A string or list in JSON, comma-separated in the
    /// environment.
    #[serde(
        rename = "NATS_URL",
        default = "default_servers",
        deserialize_with = "one_or_many"
    )]
    pub servers: Vec<String>,

    /// Username for broker authentication.
    #[serde(rename = "NATS_USERNAME", default)]
    pub username: Option<String>,

    /// Password for broker authentication.
    #[serde(rename = "NATS_PASSWORD", default)]
    pub password: Option<String>,

    /// TLS client certificate path.
    #[serde(rename = "NATS_SSL_CERTFILE", default)]
    pub ssl_certfile: Option<String>,

    /// TLS client key path.
    #[serde(rename = "NATS_SSL_KEYFILE", default)]
    pub ssl_keyfile: Option<String>,

    /// Root CA bundle path for server certificate verification.
    #[serde(rename = "NATS_ROOT_CA", default)]
    pub root_ca: Option<String>,

    /// Durable consumer name. Without one the subscription is ephemeral.
    #[serde(rename = "NATS_DURABLE", default)]
    pub durable: Option<String>,

    /// Filter subject for the consumer.
    #[serde(rename = "NATS_FILTER_SUBJECT", default)]
    pub filter_subject: Option<String>,

    /// JetStream request timeout in seconds.
    #[serde(rename = "CLIENT_TIMEOUT", default = "default_client_timeout")]
    pub client_timeout: f64,

    /// Handler key resolved against the registry.
    #[serde(rename = "CALLBACK", default = "default_callback")]
    pub callback: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            username: None,
            password: None,
            ssl_certfile: None,
            ssl_keyfile: None,
            root_ca: None,
            durable: None,
            filter_subject: None,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            callback: default_callback(),
        }
    }
}

impl ListenerConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ListenerError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ListenerError::config_error(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            ListenerError::config_error(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from process environment variables.
    ///
    /// Uses the same keys as the JSON form; `NATS_URL` accepts a
    /// comma-separated list. Unset keys fall back to their defaults.
    pub fn from_env() -> Result<Self, ListenerError> {
        let servers = match std::env::var("NATS_URL") {
            Ok(urls) => urls
                .split(',')
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty())
                .collect(),
            Err(_) => default_servers(),
        };

        let client_timeout = match std::env::var("CLIENT_TIMEOUT") {
            Ok(raw) => raw.parse::<f64>().map_err(|_| {
                ListenerError::config_error(format!(
                    "CLIENT_TIMEOUT must be a number of seconds, got '{raw}'"
                ))
            })?,
            Err(_) => DEFAULT_CLIENT_TIMEOUT,
        };

        let config = Self {
            servers,
            username: env_opt("NATS_USERNAME"),
            password: env_opt("NATS_PASSWORD"),
            ssl_certfile: env_opt("NATS_SSL_CERTFILE"),
            ssl_keyfile: env_opt("NATS_SSL_KEYFILE"),
            root_ca: env_opt("NATS_ROOT_CA"),
            durable: env_opt("NATS_DURABLE"),
            filter_subject: env_opt("NATS_FILTER_SUBJECT"),
            client_timeout,
            callback: std::env::var("CALLBACK").unwrap_or_else(|_| default_callback()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate settings that deserialization alone cannot check.
    pub fn validate(&self) -> Result<(), ListenerError> {
        if self.servers.is_empty() {
            return Err(ListenerError::config_error("NATS_URL must not be empty"));
        }
        self.request_timeout()?;
        Ok(())
    }

    /// JetStream request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Result<Duration, ListenerError> {
        if !self.client_timeout.is_finite() || self.client_timeout <= 0.0 {
            return Err(ListenerError::config_error(format!(
                "CLIENT_TIMEOUT must be a positive number of seconds, got {}",
                self.client_timeout
            )));
        }
        Duration::try_from_secs_f64(self.client_timeout).map_err(|e| {
            ListenerError::config_error(format!("CLIENT_TIMEOUT out of range: {e}"))
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Parse a `YYYY-MM-DD` date string into a UTC midnight timestamp.
///
/// The resulting replay boundary is inclusive and truncated to day
/// granularity.
pub fn parse_start_date(input: &str) -> Result<DateTime<Utc>, ListenerError> {
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| {
        ListenerError::InvalidStartDate {
            input: input.to_string(),
        }
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ListenerError::InvalidStartDate {
            input: input.to_string(),
        })?;
    Ok(midnight.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_url_string() {
        let config: ListenerConfig =
            serde_json::from_str(r#"{"NATS_URL": "nats://broker:4222"}"#).unwrap();

        assert_eq!(config.servers, vec!["nats://broker:4222"]);
        assert_eq!(config.client_timeout, DEFAULT_CLIENT_TIMEOUT);
        assert_eq!(config.callback, DEFAULT_HANDLER);
        assert!(config.durable.is_none());
    }

    #[test]
    fn test_url_list() {
        let config: ListenerConfig =
            serde_json::from_str(r#"{"NATS_URL": ["nats://a:4222", "nats://b:4222"]}"#).unwrap();

        assert_eq!(config.servers, vec!["nats://a:4222", "nats://b:4222"]);
    }

    #[test]
    fn test_missing_url_defaults_to_localhost() {
        let config: ListenerConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.servers, vec!["nats://localhost:4222"]);
    }

    #[test]
    fn test_full_config() {
        let config: ListenerConfig = serde_json::from_str(
            r#"{
                "NATS_URL": "tls://broker:4222",
                "NATS_USERNAME": "svc",
                "NATS_PASSWORD": "secret",
                "NATS_SSL_CERTFILE": "/etc/certs/client.crt",
                "NATS_SSL_KEYFILE": "/etc/certs/client.key",
                "NATS_ROOT_CA": "/etc/certs/ca.crt",
                "NATS_DURABLE": "orders-listener",
                "NATS_FILTER_SUBJECT": "orders.created",
                "CLIENT_TIMEOUT": 120.5,
                "CALLBACK": "store"
            }"#,
        )
        .unwrap();

        assert_eq!(config.username.as_deref(), Some("svc"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.ssl_certfile.as_deref(), Some("/etc/certs/client.crt"));
        assert_eq!(config.ssl_keyfile.as_deref(), Some("/etc/certs/client.key"));
        assert_eq!(config.root_ca.as_deref(), Some("/etc/certs/ca.crt"));
        assert_eq!(config.durable.as_deref(), Some("orders-listener"));
        assert_eq!(config.filter_subject.as_deref(), Some("orders.created"));
        assert_eq!(config.client_timeout, 120.5);
        assert_eq!(config.callback, "store");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_numeric_timeout() {
        let result =
            serde_json::from_str::<ListenerConfig>(r#"{"CLIENT_TIMEOUT": "not-a-number"}"#);

        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_timeouts() {
        for timeout in [-1.0, 0.0, f64::NAN, f64::INFINITY] {
            let config = ListenerConfig {
                client_timeout: timeout,
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(ListenerError::Config(_))),
                "timeout {timeout} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_rejects_empty_server_list() {
        let config = ListenerConfig {
            servers: Vec::new(),
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(ListenerError::Config(_))));
    }

    #[test]
    fn test_request_timeout_duration() {
        let config = ListenerConfig::default();

        assert_eq!(config.request_timeout().unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_from_json_file_missing_path() {
        let result = ListenerConfig::from_json_file("/nonexistent/config.json");

        assert!(matches!(result, Err(ListenerError::Config(_))));
    }

    #[test]
    fn test_from_json_file_round_trip() {
        let path = std::env::temp_dir().join("nats-listener-config-test.json");
        std::fs::write(
            &path,
            r#"{"NATS_URL": "nats://broker:4222", "NATS_DURABLE": "orders-listener"}"#,
        )
        .unwrap();

        let config = ListenerConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.servers, vec!["nats://broker:4222"]);
        assert_eq!(config.durable.as_deref(), Some("orders-listener"));
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("NATS_URL", Some("nats://a:4222, nats://b:4222")),
                ("NATS_USERNAME", Some("svc")),
                ("NATS_PASSWORD", Some("secret")),
                ("NATS_SSL_CERTFILE", None),
                ("NATS_SSL_KEYFILE", None),
                ("NATS_ROOT_CA", None),
                ("NATS_DURABLE", Some("orders-listener")),
                ("NATS_FILTER_SUBJECT", Some("orders.created")),
                ("CLIENT_TIMEOUT", Some("120.5")),
                ("CALLBACK", None),
            ],
            || {
                let config = ListenerConfig::from_env().unwrap();

                assert_eq!(config.servers, vec!["nats://a:4222", "nats://b:4222"]);
                assert_eq!(config.username.as_deref(), Some("svc"));
                assert_eq!(config.password.as_deref(), Some("secret"));
                assert!(config.ssl_certfile.is_none());
                assert_eq!(config.durable.as_deref(), Some("orders-listener"));
                assert_eq!(config.filter_subject.as_deref(), Some("orders.created"));
                assert_eq!(config.client_timeout, 120.5);
                assert_eq!(config.callback, DEFAULT_HANDLER);
            },
        );
    }

    #[test]
    fn test_from_env_defaults() {
        temp_env::with_vars(
            [
                ("NATS_URL", None::<&str>),
                ("NATS_USERNAME", None),
                ("NATS_PASSWORD", None),
                ("NATS_SSL_CERTFILE", None),
                ("NATS_SSL_KEYFILE", None),
                ("NATS_ROOT_CA", None),
                ("NATS_DURABLE", None),
                ("NATS_FILTER_SUBJECT", None),
                ("CLIENT_TIMEOUT", None),
                ("CALLBACK", None),
            ],
            || {
                let config = ListenerConfig::from_env().unwrap();

                assert_eq!(config.servers, vec!["nats://localhost:4222"]);
                assert_eq!(config.client_timeout, DEFAULT_CLIENT_TIMEOUT);
                assert_eq!(config.callback, DEFAULT_HANDLER);
            },
        );
    }

    #[test]
    fn test_from_env_rejects_bad_timeout() {
        temp_env::with_vars([("CLIENT_TIMEOUT", Some("yesterday"))], || {
            assert!(matches!(
                ListenerConfig::from_env(),
                Err(ListenerError::Config(_))
            ));
        });
    }

    #[test]
    fn test_parse_start_date() {
        let ts = parse_start_date("2024-03-01").unwrap();

        assert_eq!(ts.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_start_date_rejects_garbage() {
        for input in ["01-03-2024", "2024-13-01", "2024-02-30", "yesterday", ""] {
            assert!(
                matches!(
                    parse_start_date(input),
                    Err(ListenerError::InvalidStartDate { .. })
                ),
                "input '{input}' should be rejected"
            );
        }
    }
}
