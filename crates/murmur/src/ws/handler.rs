//! WebSocket upgrade handler.

use axum::{
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, header::ORIGIN},
    response::Response,
};
use log::{info, warn};

use super::session::run_session;
use crate::api::AppState;
use crate::auth::{AuthError, CurrentUser};

/// Reject cross-origin upgrades from origins that are not allowed.
///
/// Requests without an `Origin` header come from non-browser clients and are
/// accepted; the bearer token already authenticated them.
fn check_origin(state: &AppState, headers: &HeaderMap) -> Result<(), AuthError> {
    let Some(origin) = headers.get(ORIGIN) else {
        return Ok(());
    };
    let origin = origin
        .to_str()
        .map_err(|_| AuthError::OriginNotAllowed("<invalid>".to_string()))?;

    if state.auth.config().origin_allowed(origin) {
        Ok(())
    } else {
        Err(AuthError::OriginNotAllowed(origin.to_string()))
    }
}

/// WebSocket upgrade handler.
///
/// GET /ws
///
/// Runs behind the auth middleware, so an invalid token is rejected with 401
/// before any connection state exists.
pub async fn ws_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, AuthError> {
    if let Err(err) = check_origin(&state, &headers) {
        warn!("Rejected WebSocket upgrade for user {}: {}", user.id(), err);
        return Err(err);
    }

    let identity = user.id().to_string();
    info!("WebSocket upgrade request from user {}", identity);

    let router = state.router.clone();
    let settings = state.session;
    let (conn, outbound) = state.hub.open_connection(&identity);

    Ok(ws.on_upgrade(move |socket| run_session(socket, conn, outbound, router, settings)))
}
