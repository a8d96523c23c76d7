//! Authentication module.
//!
//! Provides bearer token issuance and validation with:
//! - HS256-only signature verification
//! - a process-wide revocation list with lazy expiry eviction
//! - request middleware that accepts header, cookie or query tokens

mod claims;
mod config;
mod error;
mod middleware;
mod revocation;
mod token;

pub use claims::Claims;
pub use config::{AuthConfig, ConfigValidationError};
pub use error::AuthError;
pub use middleware::{AUTH_COOKIE, AuthState, CurrentUser, auth_middleware, extract_token};
pub use revocation::RevocationList;
pub use token::{IssuedToken, TokenValidator};
