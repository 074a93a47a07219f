//! OAuth2 token state
//!
//! The vendor issues short-lived bearer tokens through `/oauth2/token`
//! (password grant on login, refresh_token grant afterwards). This module only
//! tracks what was issued and when it expires; the HTTP side lives in
//! [`crate::client`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Longest `expires_in` taken at face value (one year)
const MAX_EXPIRES_IN_SECS: f64 = 365.0 * 24.0 * 3600.0;

/// Tokens currently held by the client
#[derive(Default, Clone)]
pub struct TokenState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    /// True when there is no usable access token, or it expires within `margin`
    pub fn is_expiring(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let Some(expires_at) = self.expires_at else {
            return true;
        };
        let Ok(margin) = chrono::Duration::from_std(margin) else {
            return true;
        };
        expires_at
            .checked_sub_signed(margin)
            .map_or(true, |refresh_at| now >= refresh_at)
    }

    /// Whether an access token is present and not about to expire
    pub fn is_valid(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.access_token.is_some() && !self.is_expiring(now, margin)
    }

    /// Record a token endpoint response
    ///
    /// A response without `refresh_token` keeps the previous one. A missing,
    /// non-numeric or out of range `expires_in` falls back to `default_lifetime`.
    pub fn store(&mut self, response: &Value, now: DateTime<Utc>, default_lifetime: Duration) {
        self.access_token = response
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(refresh) = response.get("refresh_token").and_then(Value::as_str) {
            self.refresh_token = Some(refresh.to_string());
        }

        let issued = response
            .get("expires_in")
            .and_then(Value::as_f64)
            .filter(|secs| secs.is_finite() && (0.0..=MAX_EXPIRES_IN_SECS).contains(secs))
            .and_then(|secs| chrono::Duration::try_milliseconds((secs * 1000.0) as i64))
            .and_then(|lifetime| now.checked_add_signed(lifetime));
        self.expires_at = issued.or_else(|| {
            let fallback = chrono::Duration::from_std(default_lifetime)
                .unwrap_or_else(|_| chrono::Duration::hours(1));
            now.checked_add_signed(fallback)
        });
    }

    /// `Authorization` header value, if logged in
    pub fn bearer(&self) -> Option<String> {
        self.access_token
            .as_ref()
            .map(|token| format!("Bearer {}", token))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl std::fmt::Debug for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenState")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MARGIN: Duration = Duration::from_secs(60);
    const LIFETIME: Duration = Duration::from_secs(3600);

    #[test]
    fn test_empty_state_is_expiring() {
        let state = TokenState::default();
        assert!(state.is_expiring(Utc::now(), MARGIN));
        assert!(!state.is_valid(Utc::now(), MARGIN));
        assert!(state.bearer().is_none());
    }

    #[test]
    fn test_store_uses_expires_in() {
        let now = Utc::now();
        let mut state = TokenState::default();
        state.store(
            &json!({"access_token": "a1", "refresh_token": "r1", "expires_in": 10800}),
            now,
            LIFETIME,
        );

        assert_eq!(state.access_token.as_deref(), Some("a1"));
        assert_eq!(state.refresh_token.as_deref(), Some("r1"));
        assert_eq!(state.expires_at, Some(now + chrono::Duration::seconds(10800)));
        assert!(state.is_valid(now, MARGIN));
        assert_eq!(state.bearer().as_deref(), Some("Bearer a1"));
    }

    #[test]
    fn test_store_keeps_previous_refresh_token() {
        let now = Utc::now();
        let mut state = TokenState::default();
        state.store(&json!({"access_token": "a1", "refresh_token": "r1"}), now, LIFETIME);
        state.store(&json!({"access_token": "a2"}), now, LIFETIME);

        assert_eq!(state.access_token.as_deref(), Some("a2"));
        assert_eq!(state.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn test_missing_expires_in_uses_default_lifetime() {
        let now = Utc::now();
        let mut state = TokenState::default();
        state.store(&json!({"access_token": "a", "expires_in": "soon"}), now, LIFETIME);
        assert_eq!(state.expires_at, Some(now + chrono::Duration::seconds(3600)));
    }

    #[test]
    fn test_unrepresentable_expires_in_uses_default_lifetime() {
        let now = Utc::now();
        let default = Some(now + chrono::Duration::seconds(3600));

        for expires_in in [json!(1e300), json!(-1e300), json!(-5), json!(u64::MAX)] {
            let mut state = TokenState::default();
            state.store(&json!({"access_token": "a", "expires_in": expires_in}), now, LIFETIME);
            assert_eq!(state.expires_at, default, "expires_in = {}", expires_in);
        }
    }

    #[test]
    fn test_huge_margin_counts_as_expiring() {
        let now = Utc::now();
        let mut state = TokenState::default();
        state.store(&json!({"access_token": "a", "expires_in": 3600}), now, LIFETIME);
        // Representable, but reaches before the earliest date
        assert!(state.is_expiring(now, Duration::from_secs(1_000_000_000_000_000)));
        assert!(state.is_expiring(now, Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn test_refresh_margin_applies() {
        let now = Utc::now();
        let mut state = TokenState::default();
        state.store(&json!({"access_token": "a", "expires_in": 30}), now, LIFETIME);

        // 30s left is inside the 60s margin
        assert!(state.is_expiring(now, MARGIN));
        assert!(!state.is_expiring(now, Duration::from_secs(10)));
    }

    #[test]
    fn test_debug_does_not_leak_tokens() {
        let mut state = TokenState::default();
        state.store(&json!({"access_token": "sekret"}), Utc::now(), LIFETIME);
        assert!(!format!("{:?}", state).contains("sekret"));
    }
}
