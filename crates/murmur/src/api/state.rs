//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthState, ConfigValidationError};
use crate::bot::{BotService, MarketData};
use crate::config::AppConfig;
use crate::history::MessageLog;
use crate::msgid::MessageIdGenerator;
use crate::ws::{Hub, MessageRouter, RouterSettings, SessionSettings};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Token validation and issuance.
    pub auth: AuthState,
    /// Live connection registry.
    pub hub: Arc<Hub>,
    /// Inbound frame router.
    pub router: Arc<MessageRouter>,
    /// Durable message log.
    pub log: Arc<dyn MessageLog>,
    /// Keepalive timing for new sessions.
    pub session: SessionSettings,
    /// Maximum messages returned by a history request.
    pub history_limit: i64,
    /// Upper bound on a single log query.
    pub query_timeout: Duration,
}

impl AppState {
    /// Wire up the hub, router and bot from configuration.
    ///
    /// The bot is attached when it is enabled and a market-data source is given.
    pub fn new(
        config: &AppConfig,
        log: Arc<dyn MessageLog>,
        market: Option<Arc<dyn MarketData>>,
    ) -> Result<Self, ConfigValidationError> {
        let auth = AuthState::new(config.auth.clone())?;
        let hub = Arc::new(Hub::new(config.hub.outbound_capacity));

        let bot = market
            .filter(|_| config.bot.enabled)
            .map(|market| BotService::new(market, config.bot.timeout()));

        let router = Arc::new(MessageRouter::new(
            hub.clone(),
            log.clone(),
            Arc::new(MessageIdGenerator::new()),
            bot,
            RouterSettings {
                history_limit: config.hub.history_limit,
                query_timeout: config.hub.query_timeout(),
            },
        ));

        Ok(Self {
            auth,
            hub,
            router,
            log,
            session: SessionSettings::from(&config.hub),
            history_limit: config.hub.history_limit,
            query_timeout: config.hub.query_timeout(),
        })
    }
}
