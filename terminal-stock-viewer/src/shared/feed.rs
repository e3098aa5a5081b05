//! Polygon cluster feeds
//!
//! One feed per cluster keeps a WebSocket open, authenticates, subscribes to the
//! configured instruments and turns every message into an aggregator mutation.
//! Transport failures never escape the feed: they become warnings, the cluster
//! is marked disconnected and the connection is retried.

use crate::shared::config::Config;
use crate::shared::error::FeedError;
use crate::shared::state::StateAggregator;
use crate::shared::types::{Cluster, ClusterStatus, CRYPTO_PREFIX, FOREX_PREFIX};
use chrono::DateTime;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Messages consumed from a Polygon cluster
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "ev")]
pub enum FeedMessage {
    /// Crypto trade, pair like `BTC-USD`
    #[serde(rename = "XT")]
    CryptoTrade {
        pair: String,
        #[serde(rename = "p")]
        price: f64,
        #[serde(rename = "t")]
        timestamp_ms: i64,
    },
    /// Forex quote, pair like `EUR/USD`
    #[serde(rename = "C")]
    ForexQuote {
        #[serde(rename = "p")]
        pair: String,
        #[serde(rename = "b")]
        bid: f64,
        #[serde(rename = "t")]
        timestamp_ms: i64,
    },
    #[serde(rename = "T")]
    StockTrade {
        #[serde(rename = "sym")]
        symbol: String,
        #[serde(rename = "p")]
        price: f64,
        #[serde(rename = "t")]
        timestamp_ms: i64,
    },
    #[serde(rename = "status")]
    Status {
        status: String,
        #[serde(default)]
        message: String,
    },
    /// Anything else, kept raw for the warning
    #[serde(skip_deserializing)]
    Other(String),
}

impl FeedMessage {
    /// Decode one message object; unknown or malformed shapes become [`FeedMessage::Other`]
    pub fn decode(value: serde_json::Value) -> Self {
        match serde_json::from_value::<FeedMessage>(value.clone()) {
            Ok(message) => message,
            Err(_) => FeedMessage::Other(value.to_string()),
        }
    }

    /// Apply this message, received on `cluster`'s socket, to the aggregator
    pub fn apply(self, cluster: Cluster, aggregator: &StateAggregator) {
        match self {
            FeedMessage::CryptoTrade { pair, price, timestamp_ms } => {
                record_observation(aggregator, &crypto_key(&pair), price, timestamp_ms)
            }
            FeedMessage::ForexQuote { pair, bid, timestamp_ms } => {
                record_observation(aggregator, &forex_key(&pair), bid, timestamp_ms)
            }
            FeedMessage::StockTrade { symbol, price, timestamp_ms } => {
                record_observation(aggregator, &symbol, price, timestamp_ms)
            }
            FeedMessage::Status { status, message } => match status.as_str() {
                "connected" => aggregator.set_cluster_status(cluster, ClusterStatus::Connected),
                "auth_success" | "success" => {
                    aggregator.add_debug_message(format!("Good status message: {message}"))
                }
                _ => {
                    warn!("Unexpected {} status {}: {}", cluster, status, message);
                    aggregator.add_warning(format!("Unexpected status message: {message}"))
                }
            },
            FeedMessage::Other(raw) => {
                aggregator.add_warning(format!("Unexpected websocket message: {raw}"))
            }
        }
    }
}

fn crypto_key(pair: &str) -> String {
    format!("{CRYPTO_PREFIX}{pair}")
}

/// Quotes arrive as `EUR/USD`, keys are `C:EUR-USD`
fn forex_key(pair: &str) -> String {
    format!("{FOREX_PREFIX}{}", pair.replace('/', "-"))
}

/// Record a price observation, rejecting values the aggregator must never hold
fn record_observation(
    aggregator: &StateAggregator,
    instrument: &str,
    price: f64,
    timestamp_ms: i64,
) {
    if !price.is_finite() || price < 0.0 {
        aggregator.add_warning(format!("Ignoring invalid price {price} for {instrument}"));
        return;
    }
    match DateTime::from_timestamp_millis(timestamp_ms) {
        Some(observed_at) => aggregator.record_price(instrument, price, observed_at),
        None => aggregator.add_warning(format!(
            "Ignoring invalid timestamp {timestamp_ms} for {instrument}"
        )),
    }
}

/// Decode a text frame. Polygon batches messages into a JSON array.
pub fn decode_frame(text: &str) -> Result<Vec<FeedMessage>, FeedError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    Ok(match value {
        serde_json::Value::Array(items) => items.into_iter().map(FeedMessage::decode).collect(),
        other => vec![FeedMessage::decode(other)],
    })
}

/// Subscription params, e.g. `XT.X:BTC-USD,XT.X:ETH-USD`
pub fn subscription_params(cluster: Cluster, instruments: &[String]) -> String {
    instruments
        .iter()
        .map(|instrument| format!("{}{}", cluster.channel_prefix(), instrument))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn cluster_url(domain: &str, cluster: Cluster) -> String {
    format!("wss://{}/{}", domain, cluster.path())
}

/// Per-cluster connection settings
#[derive(Debug, Clone)]
pub struct ClusterFeedConfig {
    pub cluster: Cluster,
    pub url: String,
    pub api_key: String,
    pub params: String,
    pub reconnect_delay: Duration,
}

impl ClusterFeedConfig {
    pub fn new(config: &Config, cluster: Cluster, instruments: &[String]) -> Self {
        Self {
            cluster,
            url: cluster_url(&config.websocket_domain, cluster),
            api_key: config.api_key.clone(),
            params: subscription_params(cluster, instruments),
            reconnect_delay: config.reconnect_delay,
        }
    }
}

/// Drive the feed for one cluster. Never finishes on its own.
pub async fn run_cluster_feed(config: ClusterFeedConfig, aggregator: Arc<StateAggregator>) {
    let cluster = config.cluster;
    info!("Starting {} feed handler for {}", cluster, config.url);

    loop {
        match run_session(&config, &aggregator).await {
            Ok(()) => info!("{} cluster closed the connection", cluster),
            Err(e) => {
                error!("{}", e);
                aggregator.add_warning(e.to_string());
            }
        }
        aggregator.set_cluster_status(cluster, ClusterStatus::Disconnected);

        debug!(
            "Waiting {:?} before reconnecting to {} cluster...",
            config.reconnect_delay, cluster
        );
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

/// One connection lifetime: connect, authenticate, subscribe, pump messages
async fn run_session(
    config: &ClusterFeedConfig,
    aggregator: &StateAggregator,
) -> Result<(), FeedError> {
    let cluster = config.cluster;
    let socket_error = |e: tokio_tungstenite::tungstenite::Error| FeedError::Socket {
        cluster,
        message: e.to_string(),
    };

    let (ws_stream, _) = connect_async(config.url.as_str())
        .await
        .map_err(socket_error)?;
    info!("Connected to {} cluster at {}", cluster, config.url);

    let (mut write, mut read) = ws_stream.split();

    let auth = json!({ "action": "auth", "params": config.api_key }).to_string();
    write
        .send(Message::Text(auth.into()))
        .await
        .map_err(socket_error)?;

    let subscribe = json!({ "action": "subscribe", "params": config.params }).to_string();
    write
        .send(Message::Text(subscribe.into()))
        .await
        .map_err(socket_error)?;
    aggregator.add_debug_message(format!("Subscribed to {}", config.params));

    while let Some(msg) = read.next().await {
        let result = match msg {
            Ok(Message::Text(text)) => decode_frame(&text).map(|messages| {
                for message in messages {
                    message.apply(cluster, aggregator);
                }
            }),
            Ok(Message::Close(_)) => return Ok(()),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Heartbeat - handled automatically
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(socket_error(e)),
        };

        if let Err(e) = result {
            if e.is_terminal() {
                return Err(e);
            }
            debug!("Skipping {} frame: {}", cluster, e);
            aggregator.add_warning(format!("Could not decode {cluster} message: {e}"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frame_variants() {
        let frame = r#"[
            {"ev":"status","status":"connected","message":"Connected Successfully"},
            {"ev":"XT","pair":"BTC-USD","p":33021.9,"t":1610462007425,"s":0.01,"x":1},
            {"ev":"C","p":"EUR/USD","b":1.0845,"a":1.0847,"t":1610462007000},
            {"ev":"T","sym":"MSFT","p":114.125,"t":1536036818784,"s":100},
            {"ev":"AM","sym":"MSFT"}
        ]"#;

        let messages = decode_frame(frame).unwrap();
        assert_eq!(messages.len(), 5);
        assert_eq!(
            messages[0],
            FeedMessage::Status {
                status: "connected".to_string(),
                message: "Connected Successfully".to_string(),
            }
        );
        assert!(matches!(
            &messages[1],
            FeedMessage::CryptoTrade { pair, price, timestamp_ms: 1610462007425 }
                if pair == "BTC-USD" && *price == 33021.9
        ));
        assert!(matches!(
            &messages[2],
            FeedMessage::ForexQuote { pair, bid, .. } if pair == "EUR/USD" && *bid == 1.0845
        ));
        assert!(matches!(
            &messages[3],
            FeedMessage::StockTrade { symbol, .. } if symbol == "MSFT"
        ));
        assert!(matches!(&messages[4], FeedMessage::Other(raw) if raw.contains("AM")));
    }

    #[test]
    fn test_decode_single_object_and_garbage() {
        let messages = decode_frame(r#"{"ev":"T","sym":"AAPL","p":190.5,"t":1700000000000}"#).unwrap();
        assert_eq!(messages.len(), 1);

        // Known tag with missing fields is kept raw
        let messages = decode_frame(r#"[{"ev":"XT","pair":"BTC-USD"}]"#).unwrap();
        assert!(matches!(&messages[0], FeedMessage::Other(_)));

        assert!(matches!(decode_frame("not json"), Err(FeedError::Decode(_))));
    }

    #[test]
    fn test_apply_prices() {
        let aggregator = StateAggregator::new();
        let frame = r#"[
            {"ev":"XT","pair":"BTC-USD","p":33021.9,"t":1610462007425},
            {"ev":"C","p":"EUR/USD","b":1.0845,"a":1.0847,"t":1610462007000},
            {"ev":"T","sym":"MSFT","p":114.125,"t":1536036818784}
        ]"#;
        for message in decode_frame(frame).unwrap() {
            message.apply(Cluster::Crypto, &aggregator);
        }

        let snapshot = aggregator.snapshot();
        let btc = &snapshot.prices["X:BTC-USD"];
        assert_eq!(btc.current_price, Some(33021.9));
        assert_eq!(btc.last_updated.timestamp_millis(), 1610462007425);
        assert_eq!(snapshot.prices["C:EUR-USD"].current_price, Some(1.0845));
        assert_eq!(snapshot.prices["MSFT"].current_price, Some(114.125));
        assert!(snapshot.warnings.is_empty());
    }

    #[test]
    fn test_apply_status_messages() {
        let aggregator = StateAggregator::new();
        let frame = r#"[
            {"ev":"status","status":"connected","message":"Connected Successfully"},
            {"ev":"status","status":"auth_success","message":"authenticated"},
            {"ev":"status","status":"auth_failed","message":"authentication failed"}
        ]"#;
        for message in decode_frame(frame).unwrap() {
            message.apply(Cluster::Forex, &aggregator);
        }

        let snapshot = aggregator.snapshot();
        assert_eq!(
            snapshot.status_of(Cluster::Forex),
            Some(ClusterStatus::Connected)
        );
        assert_eq!(
            *snapshot.debug_messages,
            vec![
                "Connected to Forex cluster!",
                "Good status message: authenticated",
            ]
        );
        assert_eq!(
            *snapshot.warnings,
            vec!["Unexpected status message: authentication failed"]
        );
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let aggregator = StateAggregator::new();
        FeedMessage::StockTrade {
            symbol: "AAPL".to_string(),
            price: -1.0,
            timestamp_ms: 1_700_000_000_000,
        }
        .apply(Cluster::Stocks, &aggregator);
        FeedMessage::StockTrade {
            symbol: "AAPL".to_string(),
            price: 1.0,
            timestamp_ms: i64::MAX,
        }
        .apply(Cluster::Stocks, &aggregator);
        FeedMessage::Other(r#"{"ev":"Q"}"#.to_string()).apply(Cluster::Stocks, &aggregator);

        let snapshot = aggregator.snapshot();
        assert!(snapshot.prices.is_empty());
        assert_eq!(snapshot.warnings.len(), 3);
        assert!(snapshot.warnings[0].contains("invalid price"));
        assert!(snapshot.warnings[1].contains("invalid timestamp"));
        assert_eq!(
            snapshot.warnings[2],
            r#"Unexpected websocket message: {"ev":"Q"}"#
        );
    }

    #[test]
    fn test_subscription_params_and_url() {
        let instruments = vec!["X:BTC-USD".to_string(), "X:ETH-USD".to_string()];
        assert_eq!(
            subscription_params(Cluster::Crypto, &instruments),
            "XT.X:BTC-USD,XT.X:ETH-USD"
        );
        assert_eq!(
            subscription_params(Cluster::Stocks, &["AAPL".to_string()]),
            "T.AAPL"
        );
        assert_eq!(
            cluster_url("socket.polygon.io", Cluster::Forex),
            "wss://socket.polygon.io/forex"
        );

        let config = Config::new("k", instruments.clone()).with_reconnect_delay(Duration::from_secs(1));
        let feed = ClusterFeedConfig::new(&config, Cluster::Crypto, &instruments);
        assert_eq!(feed.url, "wss://socket.polygon.io/crypto");
        assert_eq!(feed.params, "XT.X:BTC-USD,XT.X:ETH-USD");
        assert_eq!(feed.reconnect_delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_marked_disconnected() {
        let aggregator = Arc::new(StateAggregator::new());
        let config = ClusterFeedConfig {
            cluster: Cluster::Stocks,
            url: "ws://127.0.0.1:1/stocks".to_string(),
            api_key: "k".to_string(),
            params: "T.AAPL".to_string(),
            reconnect_delay: Duration::from_secs(60),
        };
        let mut rx = aggregator.subscribe();
        let handle = tokio::spawn(run_cluster_feed(config, Arc::clone(&aggregator)));

        let snapshot = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                rx.changed().await.unwrap();
                let snapshot = Arc::clone(&rx.borrow_and_update());
                if snapshot.status_of(Cluster::Stocks).is_some() {
                    return snapshot;
                }
            }
        })
        .await
        .expect("feed never reported a status");
        handle.abort();

        assert_eq!(
            snapshot.status_of(Cluster::Stocks),
            Some(ClusterStatus::Disconnected)
        );
        assert!(snapshot.warnings[0].starts_with("Error from Stocks cluster:"));
        assert_eq!(snapshot.warnings[1], "Disconnected from Stocks cluster!");
    }
}
