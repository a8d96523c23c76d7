//! JWT claims carried by murmur bearer tokens.

use serde::{Deserialize, Serialize};

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identity).
    #[serde(default)]
    pub sub: String,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// Issued at (as Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,

    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,

    /// JWT ID, the key used by the revocation list.
    #[serde(default)]
    pub jti: Option<String>,
}

impl Claims {
    /// The subject, if present and non-blank.
    pub fn identity(&self) -> Option<&str> {
        let sub = self.sub.trim();
        if sub.is_empty() { None } else { Some(&self.sub) }
    }
}
