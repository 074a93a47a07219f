//! Client configuration
//!
//! Everything that identifies the vendor application (OAuth client, scope,
//! user prefix) plus the retry and token timing knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Production host of the Muller/Intuis cloud
pub const DEFAULT_BASE_URL: &str = "https://app.muller-intuitiv.net";
/// OAuth scope requested by the vendor mobile app
pub const DEFAULT_SCOPE: &str = "read_muller write_muller";
/// Tenant prefix sent alongside the credentials
pub const DEFAULT_USER_PREFIX: &str = "muller";

/// Account credentials used for the password grant
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Configuration of the HTTP client
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Scheme and host, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth client id of the vendor application
    pub client_id: String,

    /// OAuth client secret of the vendor application
    pub client_secret: String,

    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default = "default_user_prefix")]
    pub user_prefix: String,

    /// Number of password-grant attempts before giving up
    #[serde(default = "default_login_attempts")]
    pub login_attempts: u32,

    /// Attempt `n` waits `n * retry_backoff` before the next one
    #[serde(default = "default_retry_backoff", with = "millis")]
    pub retry_backoff: Duration,

    /// Tokens are refreshed this long before they expire
    #[serde(default = "default_refresh_margin", with = "millis")]
    pub refresh_margin: Duration,

    /// Lifetime assumed when the token response has no `expires_in`
    #[serde(default = "default_token_lifetime", with = "millis")]
    pub default_token_lifetime: Duration,

    #[serde(default = "default_request_timeout", with = "millis")]
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Configuration for the production host with default timings
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: default_scope(),
            user_prefix: default_user_prefix(),
            login_attempts: default_login_attempts(),
            retry_backoff: default_retry_backoff(),
            refresh_margin: default_refresh_margin(),
            default_token_lifetime: default_token_lifetime(),
            request_timeout: default_request_timeout(),
        }
    }

    /// Point the client at another host (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .field("user_prefix", &self.user_prefix)
            .field("login_attempts", &self.login_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .finish_non_exhaustive()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_user_prefix() -> String {
    DEFAULT_USER_PREFIX.to_string()
}

fn default_login_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(1500)
}

fn default_refresh_margin() -> Duration {
    Duration::from_secs(60)
}

fn default_token_lifetime() -> Duration {
    Duration::from_secs(3600)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Durations are written as integer milliseconds
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_minimal_document() {
        let config: ClientConfig = serde_json::from_value(json!({
            "client_id": "abc",
            "client_secret": "shh"
        }))
        .unwrap();

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.scope, "read_muller write_muller");
        assert_eq!(config.user_prefix, "muller");
        assert_eq!(config.login_attempts, 3);
        assert_eq!(config.retry_backoff, Duration::from_millis(1500));
        assert_eq!(config.refresh_margin, Duration::from_secs(60));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ClientConfig::new("a", "b").with_base_url("http://127.0.0.1:8080/");
        assert_eq!(config.url("/api/homesdata"), "http://127.0.0.1:8080/api/homesdata");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = Credentials::new("me@example.com", "hunter2");
        let out = format!("{:?} {:?}", creds, ClientConfig::new("id", "topsecret"));
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("topsecret"));
        assert!(out.contains("me@example.com"));
    }
}
