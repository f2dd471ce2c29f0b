//! Bearer Token Service
//! Mission: Issue and validate signed, time-limited tokens without server-side state

use crate::auth::models::Claims;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::debug;

/// Every token lives exactly this long after issuance.
pub const TOKEN_LIFETIME_HOURS: i64 = 24;

/// Why a presented token was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token signature does not verify")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

/// A freshly issued token and the fields it carries.
#[derive(Debug, Clone)]
pub struct Token {
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Wire form: `base64url(header).base64url(payload).base64url(signature)`
    pub encoded: String,
}

/// Stateless HS256 token handler. The key is fixed after construction.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an explicit instant in `verify_at`.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "iat", "exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn lifetime() -> Duration {
        Duration::hours(TOKEN_LIFETIME_HOURS)
    }

    /// Issue a token for `subject`, valid for 24 hours from now.
    pub fn issue(&self, subject: &str) -> Result<Token> {
        self.issue_at(subject, Utc::now())
    }

    pub fn issue_at(&self, subject: &str, now: DateTime<Utc>) -> Result<Token> {
        let issued_at = Utc
            .timestamp_opt(now.timestamp(), 0)
            .single()
            .context("Invalid timestamp")?;
        let expires_at = issued_at
            .checked_add_signed(Self::lifetime())
            .context("Invalid timestamp")?;

        let claims = Claims {
            sub: subject.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let encoded = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to sign token")?;

        debug!(subject, expires_at = %expires_at, "issued bearer token");

        Ok(Token {
            subject: subject.to_string(),
            issued_at,
            expires_at,
            encoded,
        })
    }

    /// True iff the signature verifies and the token has not expired.
    /// Malformed input is simply invalid.
    pub fn validate(&self, token: &str) -> bool {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        self.verify_at(token, now).is_ok()
    }

    /// The embedded subject of a currently valid token.
    pub fn subject_of(&self, token: &str) -> Result<String, TokenError> {
        self.subject_of_at(token, Utc::now())
    }

    pub fn subject_of_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        self.verify_at(token, now).map(|claims| claims.sub)
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        // HMAC comparison inside jsonwebtoken is constant-time.
        let decoded = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            }
        })?;

        let claims = decoded.claims;
        let expires_at_ms = claims.exp.saturating_mul(1000);
        if now.timestamp_millis() >= expires_at_ms {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_millis(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_token_issue_and_subject_round_trip() {
        let service = TokenService::new("test-secret-key-12345");

        let token = service.issue("alice").unwrap();
        assert!(!token.encoded.is_empty());
        assert_eq!(token.encoded.split('.').count(), 3);
        assert_eq!(token.expires_at - token.issued_at, Duration::hours(24));

        assert!(service.validate(&token.encoded));
        assert_eq!(service.subject_of(&token.encoded).unwrap(), "alice");
    }

    #[test]
    fn test_token_expires_after_exactly_24_hours() {
        let service = TokenService::new("test-secret-key-12345");
        let token = service.issue_at("alice", at_millis(0)).unwrap();

        assert!(service.validate_at(&token.encoded, at_millis(86_399_999)));
        assert!(!service.validate_at(&token.encoded, at_millis(86_400_000)));
        assert!(!service.validate_at(&token.encoded, at_millis(86_400_001)));
        assert_eq!(
            service.subject_of_at(&token.encoded, at_millis(86_400_001)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_invalid_token_rejected() {
        let service = TokenService::new("test-secret-key-12345");

        assert!(!service.validate("invalid.token.here"));
        assert!(!service.validate(""));
        assert!(!service.validate("no-dots-at-all"));
        assert_eq!(
            service.subject_of("invalid.token.here"),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_different_secrets_reject() {
        let issuer = TokenService::new("secret1");
        let verifier = TokenService::new("secret2");

        let token = issuer.issue("alice").unwrap();

        assert!(!verifier.validate(&token.encoded));
        assert_eq!(
            verifier.subject_of(&token.encoded),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let service = TokenService::new("test-secret-key-12345");
        let token = service.issue("alice").unwrap().encoded;

        let (head, signature) = token.rsplit_once('.').unwrap();
        let mut sig: Vec<char> = signature.chars().collect();
        sig[0] = if sig[0] == 'A' { 'B' } else { 'A' };
        let tampered = format!("{}.{}", head, sig.into_iter().collect::<String>());

        assert!(!service.validate(&tampered));
    }
}
