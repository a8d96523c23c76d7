//! Rendering of bot replies.

use std::fmt::Display;

use super::market::{Headline, Quote};

const MAX_HEADLINE_CHARS: usize = 100;
const MOVERS_PER_SIDE: usize = 3;
pub const NEWS_LIMIT: usize = 3;
pub const TRENDING_LIMIT: usize = 5;

pub fn format_quote(quote: &Quote) -> String {
    format!(
        "📈 {}  Price: ${:.2}  Change: {:.2}%  EMA20: ${:.2}",
        quote.symbol, quote.price, quote.change, quote.ema20
    )
}

/// Split movers into gainers and losers, keeping service order.
pub fn format_top_movers(movers: &[Quote]) -> String {
    let (gainers, losers): (Vec<&Quote>, Vec<&Quote>) =
        movers.iter().partition(|quote| quote.change > 0.0);

    let mut lines = vec![
        "📊 **Top Movers Today**".to_string(),
        String::new(),
        "🟢 **Top Gainers:**".to_string(),
    ];
    lines.extend(
        gainers
            .iter()
            .take(MOVERS_PER_SIDE)
            .map(|q| format!("**{}** ${:.2} (+{:.1}%)", q.symbol, q.price, q.change)),
    );
    lines.push(String::new());
    lines.push("🔴 **Top Losers:**".to_string());
    lines.extend(
        losers
            .iter()
            .take(MOVERS_PER_SIDE)
            .map(|q| format!("**{}** ${:.2} ({:.1}%)", q.symbol, q.price, q.change)),
    );
    lines.join("\n")
}

/// A titled list with a green/red marker per entry.
pub fn format_price_list(title: &str, quotes: &[Quote], limit: usize) -> String {
    let mut lines = vec![title.to_string(), String::new()];
    lines.extend(quotes.iter().take(limit).map(|q| {
        let marker = if q.change > 0.0 { "🟢" } else { "🔴" };
        format!("{} **{}** ${:.2} ({:+.1}%)", marker, q.symbol, q.price, q.change)
    }));
    lines.join("\n")
}

pub fn format_news(symbol: Option<&str>, headlines: &[Headline], limit: usize) -> String {
    let header = match symbol {
        Some(symbol) => format!("📰 **{symbol} News:**"),
        None => "📰 **Market News:**".to_string(),
    };
    let mut lines = vec![header, String::new()];
    lines.extend(
        headlines
            .iter()
            .take(limit)
            .map(|h| format!("• {}", truncate_title(&h.title))),
    );
    lines.join("\n")
}

pub fn format_error(subject: &str, err: impl Display) -> String {
    format!("❌ Could not fetch {subject}: {err}")
}

fn truncate_title(title: &str) -> String {
    match title.char_indices().nth(MAX_HEADLINE_CHARS) {
        Some((cut, _)) => format!("{}...", &title[..cut]),
        None => title.to_string(),
    }
}
