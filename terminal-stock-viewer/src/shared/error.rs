use crate::shared::types::Cluster;
use thiserror::Error;

/// Startup configuration errors. Fatal before any task is spawned.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("missing POLYGON_API_KEY env var")]
    MissingApiKey,

    #[error("no instruments configured: set TICKERS to a comma separated list")]
    NoInstruments,
}

/// Rendering failures. A snapshot that cannot be formatted is a core bug,
/// so the renderer surfaces these instead of drawing a partial frame.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid {field} for {instrument}: {value}")]
    InvalidPrice {
        instrument: String,
        field: &'static str,
        value: f64,
    },

    #[error("terminal write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Feed boundary errors. Never propagated into the aggregator; the feed
/// tasks convert them into warnings.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Error from {cluster} cluster: {message}")]
    Socket { cluster: Cluster, message: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("failed to decode message: {0}")]
    Decode(String),
}

impl FeedError {
    /// Determine if an error means the socket must be re-established.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            FeedError::Socket { .. } => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}
