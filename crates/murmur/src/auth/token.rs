//! Bearer token issuance and validation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::{debug, warn};
use std::sync::Arc;
use uuid::Uuid;

use super::revocation::RevocationList;
use super::{AuthError, Claims};

const ISSUER: &str = "murmur";

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Validates HS256 bearer tokens against a shared secret and the revocation list.
pub struct TokenValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
    revocations: Arc<RevocationList>,
}

impl TokenValidator {
    pub fn new(secret: &str, token_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl: Duration::seconds(token_ttl_secs),
            revocations: Arc::new(RevocationList::new()),
        }
    }

    pub fn revocations(&self) -> &Arc<RevocationList> {
        &self.revocations
    }

    /// Issue a token for `identity`.
    pub fn issue_token(&self, identity: &str) -> Result<IssuedToken, AuthError> {
        self.issue_token_at(identity, Utc::now())
    }

    pub fn issue_token_at(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        if identity.trim().is_empty() {
            return Err(AuthError::MissingSubject);
        }

        let token_id = Uuid::new_v4().to_string();
        let expires_at = now + self.token_ttl;
        let claims = Claims {
            sub: identity.to_string(),
            exp: expires_at.timestamp(),
            iat: Some(now.timestamp()),
            iss: Some(ISSUER.to_string()),
            jti: Some(token_id.clone()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(IssuedToken {
            token,
            token_id,
            expires_at,
        })
    }

    /// Validate a token and return its subject.
    pub fn validate(&self, token: &str) -> Result<String, AuthError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        self.validate_claims_at(token, now).map(|claims| claims.sub)
    }

    /// Full validation returning the claims.
    ///
    /// Checks, in order: signature and algorithm, expiry, revocation, subject.
    pub fn validate_claims_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        // Expiry is checked below against `now` so callers can pin the clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_required_spec_claims(&["exp"]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            warn!("JWT validation failed: {:?}", e);
            AuthError::InvalidToken(e.to_string())
        })?;
        let claims = token_data.claims;

        if claims.exp <= now.timestamp() {
            return Err(AuthError::TokenExpired);
        }

        if let Some(jti) = claims.jti.as_deref()
            && self.revocations.is_revoked_at(jti, now)
        {
            debug!("Rejected revoked token {}", jti);
            return Err(AuthError::Revoked);
        }

        if claims.identity().is_none() {
            return Err(AuthError::MissingSubject);
        }

        Ok(claims)
    }

    /// Revoke a token id until `expires_at`.
    pub fn revoke(&self, token_id: &str, expires_at: DateTime<Utc>) {
        self.revocations.revoke(token_id, expires_at);
    }

    /// Revoke the token described by `claims` until its own expiry.
    ///
    /// Returns false when the token has no `jti` and therefore cannot be revoked.
    pub fn revoke_claims(&self, claims: &Claims) -> bool {
        let Some(jti) = claims.jti.as_deref() else {
            return false;
        };
        match DateTime::from_timestamp(claims.exp, 0) {
            Some(expires_at) => {
                self.revoke(jti, expires_at);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "test-secret-for-unit-tests-minimum-32-chars-long";

    fn validator() -> TokenValidator {
        TokenValidator::new(SECRET, 48 * 3600)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn sign(claims: &Claims, alg: Algorithm) -> String {
        encode(
            &Header::new(alg),
            claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_validate() {
        let v = validator();
        let issued = v.issue_token("alice").unwrap();
        assert_eq!(v.validate(&issued.token).unwrap(), "alice");
    }

    #[test]
    fn test_rejects_other_algorithm() {
        let v = validator();
        let claims = Claims {
            sub: "alice".to_string(),
            exp: Utc::now().timestamp() + 3600,
            iat: None,
            iss: None,
            jti: None,
        };
        let token = sign(&claims, Algorithm::HS512);
        assert!(matches!(v.validate(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let v = validator();
        let other = TokenValidator::new("another-secret-that-is-also-32-characters", 3600);
        let issued = other.issue_token("alice").unwrap();
        assert!(matches!(
            v.validate(&issued.token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_rejects_expired() {
        let v = validator();
        let issued = v.issue_token_at("alice", t0()).unwrap();
        assert!(v.validate_at(&issued.token, t0() + Duration::hours(47)).is_ok());
        assert!(matches!(
            v.validate_at(&issued.token, t0() + Duration::hours(48)),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_rejects_missing_subject() {
        let v = validator();
        let claims = Claims {
            sub: String::new(),
            exp: Utc::now().timestamp() + 3600,
            iat: None,
            iss: None,
            jti: None,
        };
        let token = sign(&claims, Algorithm::HS256);
        assert!(matches!(v.validate(&token), Err(AuthError::MissingSubject)));
        assert!(matches!(
            v.issue_token(" "),
            Err(AuthError::MissingSubject)
        ));
    }

    #[test]
    fn test_garbage_token() {
        let v = validator();
        assert!(matches!(
            v.validate("not-a-jwt"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_revocation_window() {
        let v = validator();
        let issued = v.issue_token_at("alice", t0()).unwrap();

        // Revoked at T for 24h.
        v.revocations()
            .revoke_at(&issued.token_id, t0() + Duration::hours(24), t0());

        assert!(matches!(
            v.validate_at(&issued.token, t0() + Duration::hours(1)),
            Err(AuthError::Revoked)
        ));
        assert_eq!(
            v.validate_at(&issued.token, t0() + Duration::hours(25)).unwrap(),
            "alice"
        );
    }

    #[test]
    fn test_revoke_claims_uses_token_expiry() {
        let v = TokenValidator::new(SECRET, 3600);
        let issued = v.issue_token("bob").unwrap();
        let claims = v.validate_claims_at(&issued.token, Utc::now()).unwrap();

        assert!(v.revoke_claims(&claims));
        assert!(matches!(v.validate(&issued.token), Err(AuthError::Revoked)));

        let other = v.issue_token("bob").unwrap();
        assert_eq!(v.validate(&other.token).unwrap(), "bob");
    }
}
