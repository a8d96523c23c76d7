//! Market-data source used by the bot.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

use super::error::{BotError, BotResult};

/// Price snapshot for one instrument.
///
/// Missing fields decode as zero, matching the loosely-typed payloads the
/// market-data service returns for lists.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub ema20: f64,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, price: f64, change: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change,
            ema20: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Headline {
    pub title: String,
}

/// Source of quotes, movers and headlines.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn quote(&self, symbol: &str) -> BotResult<Quote>;

    async fn top_movers(&self) -> BotResult<Vec<Quote>>;

    /// Headlines for `symbol`, or general market news.
    async fn news(&self, symbol: Option<&str>) -> BotResult<Vec<Headline>>;

    async fn crypto(&self) -> BotResult<Vec<Quote>>;

    async fn indices(&self) -> BotResult<Vec<Quote>>;

    async fn trending(&self) -> BotResult<Vec<Quote>>;
}

/// HTTP client for the market-data service.
#[derive(Debug, Clone)]
pub struct HttpMarketData {
    client: Client,
    base_url: String,
}

impl HttpMarketData {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> BotResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> BotResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("Market data request failed: status={} url={}", status, url);
            return Err(BotError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketData for HttpMarketData {
    async fn quote(&self, symbol: &str) -> BotResult<Quote> {
        let path = format!("/api/stocks/{}", urlencoding::encode(symbol));
        self.get_json(&path, &[]).await
    }

    async fn top_movers(&self) -> BotResult<Vec<Quote>> {
        self.get_json("/api/top-movers/", &[]).await
    }

    async fn news(&self, symbol: Option<&str>) -> BotResult<Vec<Headline>> {
        let query = match symbol {
            Some(symbol) => vec![("symbol", symbol.to_string()), ("limit", "3".to_string())],
            None => vec![("limit", "5".to_string())],
        };
        self.get_json("/api/news", &query).await
    }

    async fn crypto(&self) -> BotResult<Vec<Quote>> {
        self.get_json("/api/crypto", &[]).await
    }

    async fn indices(&self) -> BotResult<Vec<Quote>> {
        // Keyed by index name; ordered by key for stable output.
        let indices: BTreeMap<String, Quote> = self.get_json("/api/indices", &[]).await?;
        Ok(indices.into_values().collect())
    }

    async fn trending(&self) -> BotResult<Vec<Quote>> {
        self.get_json("/api/trending", &[]).await
    }
}
