//! Test utilities and common setup.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;

use murmur::api::{self, AppState};
use murmur::bot::{BotResult, Headline, MarketData, Quote};
use murmur::config::AppConfig;
use murmur::db::Database;
use murmur::history::SqliteMessageLog;

pub const TEST_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";

/// Configuration with a test signing secret and the bot enabled.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some(TEST_SECRET.to_string());
    config
}

/// Market data with fixed answers.
pub struct FixedMarket;

#[async_trait]
impl MarketData for FixedMarket {
    async fn quote(&self, symbol: &str) -> BotResult<Quote> {
        Ok(Quote {
            symbol: symbol.to_string(),
            price: 187.5,
            change: 1.25,
            ema20: 180.0,
        })
    }

    async fn top_movers(&self) -> BotResult<Vec<Quote>> {
        Ok(vec![Quote::new("NVDA", 900.0, 4.0)])
    }

    async fn news(&self, _symbol: Option<&str>) -> BotResult<Vec<Headline>> {
        Ok(Vec::new())
    }

    async fn crypto(&self) -> BotResult<Vec<Quote>> {
        Ok(Vec::new())
    }

    async fn indices(&self) -> BotResult<Vec<Quote>> {
        Ok(Vec::new())
    }

    async fn trending(&self) -> BotResult<Vec<Quote>> {
        Ok(Vec::new())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub log: Arc<SqliteMessageLog>,
}

impl TestApp {
    /// Issue a valid token for `identity`.
    pub fn token(&self, identity: &str) -> String {
        self.state.auth.issue_token(identity).unwrap().token
    }
}

/// Create a test application backed by an in-memory database.
pub async fn test_app_with(config: AppConfig) -> TestApp {
    let db = Database::in_memory().await.unwrap();
    let log = Arc::new(SqliteMessageLog::new(&db));
    let market: Arc<dyn MarketData> = Arc::new(FixedMarket);

    let state = AppState::new(&config, log.clone(), Some(market)).unwrap();
    let router = api::create_router(state.clone());
    TestApp { router, state, log }
}

pub async fn test_app() -> TestApp {
    test_app_with(test_config()).await
}

/// Serve the app on an ephemeral local port.
pub async fn spawn_server(app: &TestApp) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
