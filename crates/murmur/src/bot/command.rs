//! Slash-command parsing.

/// A bot command recognised in a chat body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// `/stocks SYMBOL`
    Stock(String),
    /// `/top-movers`
    TopMovers,
    /// `/news [SYMBOL]`
    News(Option<String>),
    /// `/crypto`
    Crypto,
    /// `/indices`
    Indices,
    /// `/trending`
    Trending,
}

impl BotCommand {
    /// Parse a chat body. Returns `None` for anything that is not a command.
    ///
    /// Commands are matched on the first whitespace-separated token and must
    /// carry exactly the expected number of arguments, except `/news` whose
    /// symbol is only taken when it is the sole argument.
    pub fn parse(body: &str) -> Option<Self> {
        let tokens: Vec<&str> = body.split_whitespace().collect();
        let (command, args) = tokens.split_first()?;

        match (*command, args) {
            ("/stocks", [symbol]) => Some(Self::Stock(symbol.to_uppercase())),
            ("/top-movers", []) => Some(Self::TopMovers),
            ("/news", [symbol]) => Some(Self::News(Some(symbol.to_uppercase()))),
            ("/news", _) => Some(Self::News(None)),
            ("/crypto", []) => Some(Self::Crypto),
            ("/indices", []) => Some(Self::Indices),
            ("/trending", []) => Some(Self::Trending),
            _ => None,
        }
    }

    /// What the command fetches, for error messages.
    pub fn subject(&self) -> String {
        match self {
            Self::Stock(symbol) => symbol.clone(),
            Self::TopMovers => "top movers".to_string(),
            Self::News(_) => "news".to_string(),
            Self::Crypto => "crypto data".to_string(),
            Self::Indices => "indices data".to_string(),
            Self::Trending => "trending data".to_string(),
        }
    }
}
