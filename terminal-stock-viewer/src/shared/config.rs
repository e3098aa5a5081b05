//! Runtime configuration, read from environment variables
//!
//! - `POLYGON_API_KEY` (required)
//! - `TICKERS`: comma separated instrument keys (default: X:BTC-USD,C:EUR-USD,X:ETH-USD)
//! - `DEBUG`: show debug messages when set to 1/true/yes/on
//! - `POLYGON_WS_DOMAIN` (default: socket.polygon.io)
//! - `POLYGON_REST_DOMAIN` (default: api.polygon.io)

use crate::shared::error::ConfigError;
use crate::shared::renderer::DEFAULT_MIN_FRAME_INTERVAL;
use crate::shared::state::DEFAULT_HEARTBEAT_PERIOD;
use crate::shared::types::Cluster;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_TICKERS: &str = "X:BTC-USD,C:EUR-USD,X:ETH-USD";
pub const DEFAULT_WS_DOMAIN: &str = "socket.polygon.io";
pub const DEFAULT_REST_DOMAIN: &str = "api.polygon.io";

/// Validated configuration handed to the orchestrator
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    /// Instrument keys to track, deduplicated, in configured order
    pub instruments: Vec<String>,
    pub debug_mode: bool,
    pub websocket_domain: String,
    pub rest_domain: String,
    /// Period of the aggregator heartbeat
    pub heartbeat_period: Duration,
    /// Minimum spacing between redraws
    pub min_frame_interval: Duration,
    /// Delay before a dropped cluster connection is retried
    pub reconnect_delay: Duration,
}

impl Config {
    pub fn new(api_key: impl Into<String>, instruments: Vec<String>) -> Self {
        Self {
            api_key: api_key.into(),
            instruments,
            debug_mode: false,
            websocket_domain: DEFAULT_WS_DOMAIN.to_string(),
            rest_domain: DEFAULT_REST_DOMAIN.to_string(),
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            min_frame_interval: DEFAULT_MIN_FRAME_INTERVAL,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn with_websocket_domain(mut self, domain: impl Into<String>) -> Self {
        self.websocket_domain = domain.into();
        self
    }

    pub fn with_rest_domain(mut self, domain: impl Into<String>) -> Self {
        self.rest_domain = domain.into();
        self
    }

    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    pub fn with_min_frame_interval(mut self, interval: Duration) -> Self {
        self.min_frame_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load using `var` as the variable lookup
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = var("POLYGON_API_KEY").unwrap_or_default();
        let tickers = var("TICKERS").unwrap_or_else(|| DEFAULT_TICKERS.to_string());

        let mut config = Self::new(api_key.trim(), parse_tickers(&tickers))
            .with_debug_mode(var("DEBUG").map(|v| parse_flag(&v)).unwrap_or(false));
        if let Some(domain) = var("POLYGON_WS_DOMAIN") {
            config = config.with_websocket_domain(domain);
        }
        if let Some(domain) = var("POLYGON_REST_DOMAIN") {
            config = config.with_rest_domain(domain);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.instruments.is_empty() {
            return Err(ConfigError::NoInstruments);
        }
        Ok(())
    }

    /// Configured instruments grouped by the cluster that streams them
    pub fn instruments_by_cluster(&self) -> BTreeMap<Cluster, Vec<String>> {
        let mut grouped: BTreeMap<Cluster, Vec<String>> = BTreeMap::new();
        for instrument in &self.instruments {
            grouped
                .entry(Cluster::of_instrument(instrument))
                .or_default()
                .push(instrument.clone());
        }
        grouped
    }
}

/// Split, trim, uppercase and deduplicate a comma separated ticker list
fn parse_tickers(raw: &str) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::new();
    for ticker in raw.split(',').map(|s| s.trim().to_uppercase()) {
        if !ticker.is_empty() && !tickers.contains(&ticker) {
            tickers.push(ticker);
        }
    }
    tickers
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
