//! Credential types.
//!
//! # Security
//! - Token values never appear in `Debug` output or logs
//! - Serialization is only used by secure-storage collaborators

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound applied to a provider's `expires_in`, one year.
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// An OAuth access credential for one account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub account_id: String,
}

impl Credential {
    /// True once `now` has reached `expires_at - buffer`.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expires_at
            .checked_sub_signed(buffer)
            .map_or(true, |threshold| now >= threshold)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s.eq_ignore_ascii_case(scope))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Token payload returned by the broker for refresh and code exchange.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    pub expires_in: i64,
    /// Space-separated scopes.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
}

impl TokenResponse {
    /// Build a credential. A missing refresh token keeps `previous`'s.
    pub fn into_credential(self, account_hint: &str, previous: Option<&Credential>, now: DateTime<Utc>) -> Credential {
        let scopes = match self.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => previous.map(|p| p.scopes.clone()).unwrap_or_default(),
        };
        let account_id = self
            .account_id
            .or_else(|| previous.map(|p| p.account_id.clone()))
            .unwrap_or_else(|| account_hint.to_string());

        Credential {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            expires_at: expiry(now, self.expires_in),
            scopes,
            account_id,
        }
    }
}

/// `now + expires_in`, the lifetime clamped to `0..=MAX_TOKEN_LIFETIME_SECS`.
fn expiry(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    let lifetime = Duration::try_seconds(expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS)).unwrap_or(Duration::zero());
    now.checked_add_signed(lifetime).unwrap_or(now)
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_at: DateTime<Utc>) -> Credential {
        Credential {
            access_token: "at-secret".into(),
            refresh_token: Some("rt-secret".into()),
            expires_at,
            scopes: vec!["Mail.Send".into()],
            account_id: "acc-1".into(),
        }
    }

    #[test]
    fn test_refresh_threshold() {
        let t = Utc::now();
        let cred = credential(t + Duration::seconds(180));
        let buffer = Duration::minutes(5);

        // Expires in 170s with a 300s buffer: already inside the window.
        assert!(cred.needs_refresh_at(t + Duration::seconds(10), buffer));

        let fresh = credential(t + Duration::hours(1));
        assert!(!fresh.needs_refresh_at(t, buffer));
        assert!(fresh.needs_refresh_at(t + Duration::minutes(55), buffer));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", credential(Utc::now()));
        assert!(!rendered.contains("at-secret"));
        assert!(!rendered.contains("rt-secret"));
        assert!(rendered.contains("acc-1"));
    }

    #[test]
    fn test_token_response_keeps_previous_refresh_token() {
        let now = Utc::now();
        let previous = credential(now);
        let response: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "new-at",
            "expires_in": 3600
        }))
        .unwrap();

        let next = response.into_credential("default", Some(&previous), now);
        assert_eq!(next.access_token, "new-at");
        assert_eq!(next.refresh_token.as_deref(), Some("rt-secret"));
        assert_eq!(next.account_id, "acc-1");
        assert_eq!(next.scopes, vec!["Mail.Send".to_string()]);
        assert_eq!(next.expires_at, now + Duration::seconds(3600));
    }

    #[test]
    fn test_extreme_expires_in_is_clamped() {
        let now = Utc::now();
        let token = |expires_in: i64| -> TokenResponse {
            serde_json::from_value(serde_json::json!({
                "access_token": "at",
                "expires_in": expires_in
            }))
            .unwrap()
        };

        let far = token(i64::MAX).into_credential("default", None, now);
        assert_eq!(far.expires_at, now + Duration::seconds(MAX_TOKEN_LIFETIME_SECS));

        let past = token(i64::MIN).into_credential("default", None, now);
        assert_eq!(past.expires_at, now);
        assert!(past.needs_refresh_at(now, Duration::minutes(5)));
    }

    #[test]
    fn test_scope_parsing() {
        let response: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 60,
            "scope": "offline_access Mail.Send",
            "account_id": "acc-9"
        }))
        .unwrap();
        let cred = response.into_credential("default", None, Utc::now());
        assert!(cred.has_scope("mail.send"));
        assert_eq!(cred.account_id, "acc-9");
    }
}
