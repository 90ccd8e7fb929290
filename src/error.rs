use thiserror::Error;

use crate::domain::DomainError;
use crate::exchange::ExchangeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Domain invariant violated: {0}")]
    Domain(#[from] DomainError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Stuck position on {venue}: {reason}")]
    StuckPosition { venue: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
