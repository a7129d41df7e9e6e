//! Session-token verification.
//!
//! Tokens are HS256 JWTs minted by the school's session service and signed
//! with the shared `GATE_SESSION_SECRET`. The gate only ever reads them.
//!
//! next-auth's default session cookie is an encrypted JWE, not a signed JWT,
//! and is NOT accepted here. The session service has to issue a signed HS256
//! token (for example through next-auth's custom `jwt.encode`) under the
//! configured cookie name.

use std::fmt;

use axum::http::HeaderValue;
use chrono::DateTime;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

use crate::models::{Identity, Role};

/// Claims the gate cares about. Anything else in the payload is ignored.
#[derive(Debug, Deserialize)]
struct SessionClaims {
    #[serde(default)]
    sub:   Option<String>,
    /// Older sessions carry the user id here instead of `sub`.
    #[serde(default)]
    id:    Option<String>,
    #[serde(default)]
    role:  Option<String>,
    #[serde(default)]
    email: Option<String>,
    exp:   i64,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("no session token supplied")]
    Missing,
    #[error("session token is malformed")]
    Malformed,
    #[error("session token has expired")]
    Expired,
    #[error("session token signature is invalid")]
    BadSignature,
    #[error("session token carries no subject")]
    MissingSubject,
    #[error("session token carries an unrecognised role")]
    UnknownRole,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            _                           => TokenError::Malformed,
        }
    }
}

/// Verifies session tokens against the shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation:   Validation,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is enforced to the second.
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify `raw` and turn its claims into an [`Identity`].
    pub fn verify(&self, raw: &str) -> Result<Identity, TokenError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TokenError::Missing);
        }

        let claims = decode::<SessionClaims>(raw, &self.decoding_key, &self.validation)?.claims;

        let subject = claims
            .sub
            .or(claims.id)
            .filter(|s| !s.is_empty())
            .ok_or(TokenError::MissingSubject)?;

        // The subject is propagated as `X-User-Id`.
        let subject_header = HeaderValue::from_str(&subject).map_err(|_| TokenError::Malformed)?;

        let role = claims
            .role
            .as_deref()
            .ok_or(TokenError::UnknownRole)?
            .parse::<Role>()
            .map_err(|_| TokenError::UnknownRole)?;

        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(TokenError::Malformed)?;

        Ok(Identity {
            subject,
            subject_header,
            role,
            email: claims.email,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};

    const SECRET: &str = "unit-test-secret";

    fn mint(claims: Value, secret: &str) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn in_one_hour() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[test]
    fn valid_token_yields_identity() {
        let exp = in_one_hour();
        let token = mint(
            json!({ "sub": "u-42", "role": "trainer", "email": "t@example.com", "exp": exp }),
            SECRET,
        );

        let identity = TokenVerifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(identity.subject, "u-42");
        assert_eq!(identity.subject_header, "u-42");
        assert_eq!(identity.role, Role::Trainer);
        assert_eq!(identity.email.as_deref(), Some("t@example.com"));
        assert_eq!(identity.expires_at.timestamp(), exp);
    }

    #[test]
    fn legacy_id_claim_stands_in_for_sub() {
        let token = mint(json!({ "id": "legacy-7", "role": "student", "exp": in_one_hour() }), SECRET);
        let identity = TokenVerifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(identity.subject, "legacy-7");
    }

    #[test]
    fn empty_input_is_missing() {
        let verifier = TokenVerifier::new(SECRET);
        assert_eq!(verifier.verify(""), Err(TokenError::Missing));
        assert_eq!(verifier.verify("   "), Err(TokenError::Missing));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(TokenVerifier::new(SECRET).verify("not-a-jwt"), Err(TokenError::Malformed));
    }

    #[test]
    fn encrypted_session_cookie_is_malformed() {
        // Five-part JWE as issued by next-auth's default session encoding.
        let jwe = "eyJhbGciOiJkaXIiLCJlbmMiOiJBMjU2R0NNIn0..bm9uY2Utbm9uY2U.Y2lwaGVydGV4dA.dGFnLXRhZy10YWc";
        assert_eq!(TokenVerifier::new(SECRET).verify(jwe), Err(TokenError::Malformed));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = mint(json!({ "sub": "u", "role": "admin", "exp": in_one_hour() }), "other-secret");
        assert_eq!(TokenVerifier::new(SECRET).verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn expired_token_is_rejected() {
        let exp = Utc::now().timestamp() - 120;
        let token = mint(json!({ "sub": "u", "role": "admin", "exp": exp }), SECRET);
        assert_eq!(TokenVerifier::new(SECRET).verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn token_without_exp_is_malformed() {
        let token = mint(json!({ "sub": "u", "role": "admin" }), SECRET);
        assert_eq!(TokenVerifier::new(SECRET).verify(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn unknown_or_missing_role_is_rejected() {
        let verifier = TokenVerifier::new(SECRET);
        let parent = mint(json!({ "sub": "u", "role": "parent", "exp": in_one_hour() }), SECRET);
        let none = mint(json!({ "sub": "u", "exp": in_one_hour() }), SECRET);
        assert_eq!(verifier.verify(&parent), Err(TokenError::UnknownRole));
        assert_eq!(verifier.verify(&none), Err(TokenError::UnknownRole));
    }

    #[test]
    fn subject_must_be_header_safe() {
        let token = mint(json!({ "sub": "u\r\nx-user-role: admin", "role": "student", "exp": in_one_hour() }), SECRET);
        assert_eq!(TokenVerifier::new(SECRET).verify(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn subjectless_token_is_rejected() {
        let token = mint(json!({ "sub": "", "role": "admin", "exp": in_one_hour() }), SECRET);
        assert_eq!(TokenVerifier::new(SECRET).verify(&token), Err(TokenError::MissingSubject));
    }
}
