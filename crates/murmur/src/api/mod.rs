//! HTTP API module.
//!
//! Serves the WebSocket endpoint plus a few authenticated REST helpers.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{HealthResponse, HistoryQuery, clear_auth_cookie};
pub use routes::create_router;
pub use state::AppState;
