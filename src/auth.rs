//! Scoped, time-limited credentials for the game topic.
//!
//! The relay issues a token over HTTP; the client presents it once when the
//! WebSocket connects. A missing or rejected credential is terminal for
//! session start: it is surfaced as a failure, never retried automatically.

use crate::types::GAME_TOPIC;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What a token is good for on the topic
pub const TOKEN_CAPABILITIES: &[&str] = &["publish", "subscribe", "presence"];

const DEFAULT_TTL_SECS: i64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature mismatch")]
    BadSignature,

    #[error("token expired at {0}")]
    Expired(i64),

    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// The credential handed to a connecting client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub client_id: String,
    pub topic: String,
    pub capability: Vec<String>,
    /// RFC 3339 expiry timestamp, informational for the client
    pub expires_at: String,
}

/// Signs and validates topic tokens.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, ttl_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs,
        }
    }

    /// Read `QUIZZOS_TOKEN_SECRET` and `QUIZZOS_TOKEN_TTL_SECS`. Without a
    /// configured secret a random one is generated, so issued tokens only
    /// survive this process.
    pub fn from_env() -> Self {
        let secret = match std::env::var("QUIZZOS_TOKEN_SECRET") {
            Ok(s) if !s.trim().is_empty() => s.trim().as_bytes().to_vec(),
            _ => {
                tracing::warn!(
                    "QUIZZOS_TOKEN_SECRET not set; using a random per-process secret"
                );
                let mut rng = rand::rng();
                (0..32).map(|_| rng.random::<u8>()).collect()
            }
        };

        let ttl_secs = std::env::var("QUIZZOS_TOKEN_TTL_SECS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_TTL_SECS);

        Self { secret, ttl_secs }
    }

    /// Issue a credential for a fresh client id.
    pub fn issue(&self) -> IssuedToken {
        let client_id = format!("user-{}", ulid::Ulid::new());
        let expires = chrono::Utc::now().timestamp() + self.ttl_secs;
        self.issue_for(client_id, expires)
    }

    fn issue_for(&self, client_id: String, expires_unix: i64) -> IssuedToken {
        let payload = format!("{client_id}:{expires_unix}");
        let token = format!("{}.{}", URL_SAFE_NO_PAD.encode(&payload), self.sign(&payload));

        let expires_at = chrono::DateTime::from_timestamp(expires_unix, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        IssuedToken {
            token,
            client_id,
            topic: GAME_TOPIC.to_string(),
            capability: TOKEN_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            expires_at,
        }
    }

    /// Check signature and expiry; returns the client id the token was
    /// issued for.
    pub fn validate(&self, token: &str) -> Result<String, AuthError> {
        let (encoded, signature) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let payload = URL_SAFE_NO_PAD
            .decode(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(AuthError::Malformed)?;

        if !constant_time_eq(self.sign(&payload).as_bytes(), signature.as_bytes()) {
            return Err(AuthError::BadSignature);
        }

        let (client_id, expires_raw) = payload.split_once(':').ok_or(AuthError::Malformed)?;
        let expires_unix: i64 = expires_raw.parse().map_err(|_| AuthError::Malformed)?;

        if expires_unix < chrono::Utc::now().timestamp() {
            return Err(AuthError::Expired(expires_unix));
        }

        Ok(client_id.to_string())
    }

    fn sign(&self, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(payload.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Fetch a credential from the relay's token endpoint, once, at session
/// start. Any failure here is terminal for the session.
pub async fn request_token(endpoint: &str) -> Result<IssuedToken, AuthError> {
    let response = reqwest::get(endpoint).await?.error_for_status()?;
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_issue_validate_roundtrip() {
        let issuer = TokenIssuer::new(*b"topic-secret", 60);
        let issued = issuer.issue();

        assert!(issued.client_id.starts_with("user-"));
        assert_eq!(issued.topic, GAME_TOPIC);
        assert_eq!(issued.capability, vec!["publish", "subscribe", "presence"]);

        let client_id = issuer.validate(&issued.token).unwrap();
        assert_eq!(client_id, issued.client_id);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let issuer = TokenIssuer::new(*b"topic-secret", 60);
        let issued = issuer.issue();

        let (payload, signature) = issued.token.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode("user-somebodyelse:9999999999");
        let tampered = format!("{forged_payload}.{signature}");
        assert!(matches!(
            issuer.validate(&tampered),
            Err(AuthError::BadSignature)
        ));

        let garbled = format!("{payload}x.{signature}");
        assert!(issuer.validate(&garbled).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = TokenIssuer::new(*b"topic-secret", 60);
        let other = TokenIssuer::new(*b"other-secret", 60);
        let issued = issuer.issue();
        assert!(matches!(
            other.validate(&issued.token),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = TokenIssuer::new(*b"topic-secret", 60);
        let expired = issuer.issue_for(
            "user-late".to_string(),
            chrono::Utc::now().timestamp() - 10,
        );
        assert!(matches!(
            issuer.validate(&expired.token),
            Err(AuthError::Expired(_))
        ));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let issuer = TokenIssuer::new(*b"topic-secret", 60);
        for bad in ["", "nodot", "notbase64!!.abcd", "aGk.sig"] {
            assert!(issuer.validate(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_ttl() {
        std::env::set_var("QUIZZOS_TOKEN_SECRET", "a-test-secret");
        std::env::set_var("QUIZZOS_TOKEN_TTL_SECS", "120");
        let issuer = TokenIssuer::from_env();
        std::env::remove_var("QUIZZOS_TOKEN_SECRET");
        std::env::remove_var("QUIZZOS_TOKEN_TTL_SECS");

        assert_eq!(issuer.ttl_secs, 120);
        assert_eq!(issuer.secret, b"a-test-secret".to_vec());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::remove_var("QUIZZOS_TOKEN_SECRET");
        std::env::remove_var("QUIZZOS_TOKEN_TTL_SECS");
        let issuer = TokenIssuer::from_env();
        assert_eq!(issuer.ttl_secs, DEFAULT_TTL_SECS);
        assert_eq!(issuer.secret.len(), 32);
    }
}
