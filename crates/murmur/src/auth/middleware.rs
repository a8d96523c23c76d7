//! Authentication middleware.

use axum::{
    extract::{FromRequestParts, State},
    http::{HeaderMap, Uri, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::sync::Arc;

use super::{AuthConfig, AuthError, Claims, IssuedToken, TokenValidator};

/// Name of the session cookie carrying the bearer token.
pub const AUTH_COOKIE: &str = "auth_token";

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::InvalidAuthHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = parts.next().ok_or(AuthError::InvalidAuthHeader)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok(token)
}

fn token_from_cookie_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name.trim() == cookie_name && !value.trim().is_empty() {
            Some(value.trim())
        } else {
            None
        }
    })
}

fn token_from_query(uri: &Uri) -> Option<String> {
    uri.query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == "token" && !value.is_empty() {
            urlencoding::decode(value).ok().map(|s| s.into_owned())
        } else {
            None
        }
    })
}

/// Locate the bearer token of a request.
///
/// Priority order:
/// 1. Authorization: Bearer <token> header
/// 2. auth_token cookie
/// 3. token query parameter (browsers cannot set headers on WebSocket upgrades)
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Result<String, AuthError> {
    if let Some(header) = headers.get(AUTHORIZATION) {
        let header = header.to_str().map_err(|_| AuthError::InvalidAuthHeader)?;
        return bearer_token_from_header(header).map(str::to_string);
    }

    if let Some(token) = headers
        .get(axum::http::header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookie_header| token_from_cookie_header(cookie_header, AUTH_COOKIE))
    {
        return Ok(token.to_string());
    }

    token_from_query(uri).ok_or(AuthError::MissingToken)
}

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    config: Arc<AuthConfig>,
    validator: Arc<TokenValidator>,
}

impl AuthState {
    /// Build auth state, resolving and validating the signing secret.
    pub fn new(config: AuthConfig) -> Result<Self, super::ConfigValidationError> {
        let secret = config.validate()?;
        let validator = TokenValidator::new(&secret, config.token_ttl_secs);
        Ok(Self {
            config: Arc::new(config),
            validator: Arc::new(validator),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn validator(&self) -> &Arc<TokenValidator> {
        &self.validator
    }

    /// Validate a token and return its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.validator.validate_claims_at(token, Utc::now())
    }

    pub fn issue_token(&self, identity: &str) -> Result<IssuedToken, AuthError> {
        self.validator.issue_token(identity)
    }
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// Validated claims.
    pub claims: Claims,
}

impl CurrentUser {
    /// The user identity (subject claim).
    pub fn id(&self) -> &str {
        &self.claims.sub
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}

/// Authentication middleware.
///
/// Validates the bearer token and injects `CurrentUser` into request extensions.
/// Requests without a valid token are rejected before reaching the handler.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_token(req.headers(), req.uri())?;
    let claims = auth.validate_token(&token)?;

    req.extensions_mut().insert(CurrentUser { claims });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_from_header_valid() {
        assert_eq!(
            bearer_token_from_header("Bearer abc.def.ghi").unwrap(),
            "abc.def.ghi"
        );
        assert_eq!(
            bearer_token_from_header("bearer   token123").unwrap(),
            "token123"
        );
    }

    #[test]
    fn test_bearer_token_from_header_invalid() {
        for case in ["", "Bearer", "Bearer ", "Token something", "Bearer token extra"] {
            assert!(
                bearer_token_from_header(case).is_err(),
                "{case} should fail"
            );
        }
    }

    #[test]
    fn test_token_from_cookie_header() {
        assert_eq!(
            token_from_cookie_header("theme=dark; auth_token=abc; other=1", AUTH_COOKIE),
            Some("abc")
        );
        assert_eq!(token_from_cookie_header("auth_token=", AUTH_COOKIE), None);
        assert_eq!(token_from_cookie_header("theme=dark", AUTH_COOKIE), None);
    }

    #[test]
    fn test_extract_token_priority() {
        let uri: Uri = "/ws?token=from-query".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers, &uri).unwrap(), "from-query");

        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("auth_token=from-cookie"),
        );
        assert_eq!(extract_token(&headers, &uri).unwrap(), "from-cookie");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_token(&headers, &uri).unwrap(), "from-header");
    }

    #[test]
    fn test_extract_token_url_decodes_query() {
        let uri: Uri = "/ws?peer=x&token=a%2Eb%2Ec".parse().unwrap();
        assert_eq!(extract_token(&HeaderMap::new(), &uri).unwrap(), "a.b.c");
    }

    #[test]
    fn test_extract_token_missing() {
        let uri: Uri = "/ws".parse().unwrap();
        assert!(matches!(
            extract_token(&HeaderMap::new(), &uri),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn test_auth_state_requires_secret() {
        assert!(AuthState::new(AuthConfig::default()).is_err());

        let config = AuthConfig {
            jwt_secret: Some("test-secret-for-unit-tests-minimum-32-chars-long".to_string()),
            ..AuthConfig::default()
        };
        let state = AuthState::new(config).unwrap();
        let issued = state.issue_token("carol").unwrap();
        let claims = state.validate_token(&issued.token).unwrap();
        assert_eq!(claims.sub, "carol");
        assert_eq!(claims.jti.as_deref(), Some(issued.token_id.as_str()));
    }
}
