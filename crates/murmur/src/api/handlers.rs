//! HTTP handlers.

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::auth::{AUTH_COOKIE, CurrentUser};
use crate::history::{HistoryError, StoredMessage};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub time: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        time: Utc::now().to_rfc3339(),
    })
}

/// Query parameters for history.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub peer: String,
    pub limit: Option<i64>,
}

/// Recent conversation between the caller and `peer`, oldest first.
///
/// GET /history?peer=<identity>[&limit=N]
pub async fn history(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<StoredMessage>>> {
    let peer = query.peer.trim();
    if peer.is_empty() {
        return Err(ApiError::bad_request("peer must not be empty"));
    }

    let limit = match query.limit {
        Some(limit) if limit <= 0 => {
            return Err(ApiError::bad_request("limit must be positive"));
        }
        Some(limit) => limit.min(state.history_limit),
        None => state.history_limit,
    };

    let messages = tokio::time::timeout(
        state.query_timeout,
        state.log.query_recent(user.id(), peer, limit),
    )
    .await
    .map_err(|_| HistoryError::Timeout(state.query_timeout))??;

    Ok(Json(messages))
}

/// Build the `Set-Cookie` value that clears the session cookie.
pub fn clear_auth_cookie(secure: bool) -> String {
    let mut cookie = format!("{AUTH_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Revoke the presenting token until its own expiry and clear the cookie.
///
/// POST /auth/logout
pub async fn logout(State(state): State<AppState>, user: CurrentUser) -> impl IntoResponse {
    if state.auth.validator().revoke_claims(&user.claims) {
        info!(user = %user.id(), "Token revoked on logout");
    } else {
        warn!(user = %user.id(), "Logout with a token that has no id; nothing to revoke");
    }

    (
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            clear_auth_cookie(state.auth.config().secure_cookies),
        )],
    )
}
