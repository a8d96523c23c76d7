//! Market-data bot.
//!
//! Chat bodies that start with a known slash command produce exactly one
//! reply text. Fetch failures and timeouts produce an error text instead, so
//! the invoker always sees an answer.

mod command;
mod error;
mod format;
mod market;

pub use command::BotCommand;
pub use error::{BotError, BotResult};
pub use market::{Headline, HttpMarketData, MarketData, Quote};

use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use format::{
    NEWS_LIMIT, TRENDING_LIMIT, format_error, format_news, format_price_list, format_quote,
    format_top_movers,
};

/// Answers slash commands using a market-data source.
#[derive(Clone)]
pub struct BotService {
    market: Arc<dyn MarketData>,
    timeout: Duration,
}

impl BotService {
    pub fn new(market: Arc<dyn MarketData>, timeout: Duration) -> Self {
        Self { market, timeout }
    }

    /// Reply to `body`, or `None` when it is not a command.
    pub async fn respond(&self, body: &str) -> Option<String> {
        let command = BotCommand::parse(body)?;
        debug!("Running bot command {:?}", command);

        let result = match tokio::time::timeout(self.timeout, self.run(&command)).await {
            Ok(result) => result,
            Err(_) => Err(BotError::Timeout(self.timeout)),
        };

        Some(match result {
            Ok(text) => text,
            Err(err) => {
                warn!("Bot command {:?} failed: {}", command, err);
                format_error(&command.subject(), err)
            }
        })
    }

    async fn run(&self, command: &BotCommand) -> BotResult<String> {
        let text = match command {
            BotCommand::Stock(symbol) => format_quote(&self.market.quote(symbol).await?),
            BotCommand::TopMovers => format_top_movers(&self.market.top_movers().await?),
            BotCommand::News(symbol) => {
                let headlines = self.market.news(symbol.as_deref()).await?;
                format_news(symbol.as_deref(), &headlines, NEWS_LIMIT)
            }
            BotCommand::Crypto => {
                let quotes = self.market.crypto().await?;
                format_price_list("₿ **Crypto Prices:**", &quotes, quotes.len())
            }
            BotCommand::Indices => {
                let quotes = self.market.indices().await?;
                format_price_list("📊 **Market Indices:**", &quotes, quotes.len())
            }
            BotCommand::Trending => {
                let quotes = self.market.trending().await?;
                format_price_list("🔥 **Trending Stocks:**", &quotes, TRENDING_LIMIT)
            }
        };
        Ok(text)
    }
}
