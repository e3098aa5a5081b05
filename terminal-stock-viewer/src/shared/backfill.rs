//! One-shot REST backfill: last known price and previous close per instrument.
//!
//! The two passes are independent; [`spawn_producers`](super::startup::spawn_producers)
//! decides when each runs. Every failure is reported as a warning; nothing here is fatal.

use crate::shared::error::FeedError;
use crate::shared::state::StateAggregator;
use crate::shared::types::{Cluster, CRYPTO_PREFIX, FOREX_PREFIX};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `/v1/last/...` and `/v1/last_quote/...` response body
#[derive(Debug, Deserialize)]
pub struct LastResponse {
    #[serde(default)]
    pub last: Option<LastTick>,
}

#[derive(Debug, Deserialize)]
pub struct LastTick {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub bid: Option<f64>,
    /// Epoch millis
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl LastResponse {
    /// Price and time of the last tick: bid for forex quotes, trade price otherwise
    pub fn observation(&self, cluster: Cluster) -> Option<(f64, DateTime<Utc>)> {
        let last = self.last.as_ref()?;
        let price = match cluster {
            Cluster::Forex => last.bid?,
            Cluster::Crypto | Cluster::Stocks => last.price?,
        };
        let observed_at = DateTime::from_timestamp_millis(last.timestamp?)?;
        Some((price, observed_at))
    }
}

/// `/v2/aggs/ticker/{ticker}/prev` response body
#[derive(Debug, Deserialize)]
pub struct PreviousCloseResponse {
    #[serde(default)]
    pub results: Vec<PreviousCloseBar>,
}

#[derive(Debug, Deserialize)]
pub struct PreviousCloseBar {
    #[serde(rename = "c")]
    pub close: Option<f64>,
}

impl PreviousCloseResponse {
    pub fn close(&self) -> Option<f64> {
        self.results.first().and_then(|bar| bar.close)
    }
}

/// Backfill outcome, for logging
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillResult {
    pub prices_loaded: usize,
    pub closes_loaded: usize,
    pub failures: usize,
}

/// Path of the last-price endpoint for an instrument.
///
/// Crypto and forex keys must look like `PREFIX:FROM-TO`; the error is the
/// user-facing warning.
pub fn last_price_path(instrument: &str) -> Result<String, String> {
    let cluster = Cluster::of_instrument(instrument);
    let pair = |prefix: &str| -> Result<(String, String), String> {
        let parts: Vec<&str> = instrument[prefix.len()..].split('-').collect();
        match parts.as_slice() {
            [from, to] if !from.is_empty() && !to.is_empty() => {
                Ok((from.to_string(), to.to_string()))
            }
            _ => Err(format!(
                "Could not parse {} ticker: {}",
                cluster.path(),
                instrument
            )),
        }
    };

    match cluster {
        Cluster::Crypto => {
            let (from, to) = pair(CRYPTO_PREFIX)?;
            Ok(format!("/v1/last/crypto/{from}/{to}"))
        }
        Cluster::Forex => {
            let (from, to) = pair(FOREX_PREFIX)?;
            Ok(format!("/v1/last_quote/currencies/{from}/{to}"))
        }
        Cluster::Stocks => Ok(format!("/v1/last/stocks/{instrument}")),
    }
}

/// Path of the previous-close endpoint. The aggregates API rejects `-` in pairs.
pub fn previous_close_path(instrument: &str) -> String {
    format!("/v2/aggs/ticker/{}/prev", instrument.replace('-', ""))
}

/// Thin Polygon REST client
#[derive(Debug, Clone)]
pub struct BackfillClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl BackfillClient {
    pub fn new(rest_domain: &str, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("https://{rest_domain}"),
            api_key: api_key.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FeedError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(&[("apiKey", self.api_key.as_str())])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FeedError::Http(format!(
                "HTTP error {} for {}",
                response.status(),
                path
            )));
        }

        Ok(response.json().await?)
    }

    pub async fn fetch_last_price(
        &self,
        instrument: &str,
        path: &str,
    ) -> Result<Option<(f64, DateTime<Utc>)>, FeedError> {
        let body: LastResponse = self.get_json(path).await?;
        Ok(body.observation(Cluster::of_instrument(instrument)))
    }

    pub async fn fetch_previous_close(&self, instrument: &str) -> Result<Option<f64>, FeedError> {
        let body: PreviousCloseResponse = self.get_json(&previous_close_path(instrument)).await?;
        Ok(body.close())
    }
}

/// Load the previous close of every instrument. Only touches `previous_close`.
pub async fn backfill_previous_closes(
    client: &BackfillClient,
    instruments: &[String],
    aggregator: &StateAggregator,
) -> BackfillResult {
    let mut result = BackfillResult::default();
    for instrument in instruments {
        match client.fetch_previous_close(instrument).await {
            Ok(Some(close)) if close.is_finite() && close >= 0.0 => {
                aggregator.record_previous_close(instrument, close);
                result.closes_loaded += 1;
            }
            Ok(_) => {
                debug!("No previous close for {}", instrument);
                aggregator.add_debug_message(format!("No previous close for: {instrument}"));
            }
            Err(e) => {
                warn!("[backfill] previous close for {} failed: {}", instrument, e);
                aggregator.add_warning(format!("Couldn't get previous close for {instrument}: {e}"));
                result.failures += 1;
            }
        }
    }
    result
}

/// Load the last known price of every instrument
pub async fn backfill_last_prices(
    client: &BackfillClient,
    instruments: &[String],
    aggregator: &StateAggregator,
) -> BackfillResult {
    let mut result = BackfillResult::default();
    for instrument in instruments {
        let path = match last_price_path(instrument) {
            Ok(path) => path,
            Err(warning) => {
                aggregator.add_warning(warning);
                result.failures += 1;
                continue;
            }
        };

        match client.fetch_last_price(instrument, &path).await {
            Ok(Some((price, observed_at))) if price.is_finite() && price >= 0.0 => {
                aggregator.record_price(instrument, price, observed_at);
                result.prices_loaded += 1;
            }
            Ok(_) => {
                aggregator.add_warning(format!("couldn't get initial price for: {instrument}"));
                result.failures += 1;
            }
            Err(e) => {
                warn!("[backfill] last price for {} failed: {}", instrument, e);
                aggregator.add_warning(format!("couldn't get initial price for: {instrument} ({e})"));
                result.failures += 1;
            }
        }
    }
    result
}
