//! Core data types shared by the aggregator, the feeds and the renderer.
//!
//! Instruments are identified by their Polygon ticker key (e.g. `X:BTC-USD`,
//! `C:EUR-USD`, `AAPL`). The key prefix decides which cluster serves it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key prefix marking a crypto pair
pub const CRYPTO_PREFIX: &str = "X:";

/// Key prefix marking a forex pair
pub const FOREX_PREFIX: &str = "C:";

/// Market data cluster an instrument is streamed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Cluster {
    Crypto,
    Forex,
    Stocks,
}

impl Cluster {
    /// Classify an instrument key by prefix.
    ///
    /// This is the only place the prefix policy lives; subscription grouping
    /// and table partitioning both go through it.
    pub fn of_instrument(instrument: &str) -> Cluster {
        if instrument.starts_with(CRYPTO_PREFIX) {
            Cluster::Crypto
        } else if instrument.starts_with(FOREX_PREFIX) {
            Cluster::Forex
        } else {
            Cluster::Stocks
        }
    }

    /// Display name (e.g., "Crypto")
    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::Crypto => "Crypto",
            Cluster::Forex => "Forex",
            Cluster::Stocks => "Stocks",
        }
    }

    /// WebSocket path segment for this cluster
    pub fn path(&self) -> &'static str {
        match self {
            Cluster::Crypto => "crypto",
            Cluster::Forex => "forex",
            Cluster::Stocks => "stocks",
        }
    }

    /// Channel prefix used when subscribing: crypto trades, forex quotes, stock trades
    pub fn channel_prefix(&self) -> &'static str {
        match self {
            Cluster::Crypto => "XT.",
            Cluster::Forex => "C.",
            Cluster::Stocks => "T.",
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Connection state of a cluster. Absence from the status map means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ClusterStatus {
    Connected,
    Disconnected,
}

/// Per-instrument price state
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TickRecord {
    /// Last traded/quoted price; `None` until a price-affecting event arrives
    pub current_price: Option<f64>,
    /// Previous session close, populated independently by backfill
    pub previous_close: Option<f64>,
    /// Time of the most recent price-affecting event
    pub last_updated: DateTime<Utc>,
}

impl TickRecord {
    /// Signed fractional change vs previous close (0.05 == +5%).
    ///
    /// `None` when either price is unknown or the previous close is zero.
    pub fn change_ratio(&self) -> Option<f64> {
        let current = self.current_price?;
        let previous = self.previous_close?;
        if previous == 0.0 {
            return None;
        }
        Some((current - previous) / previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_by_prefix() {
        struct TestCase {
            input: &'static str,
            expected: Cluster,
        }

        let tests = vec![
            TestCase {
                // TC0: crypto prefix
                input: "X:BTC-USD",
                expected: Cluster::Crypto,
            },
            TestCase {
                // TC1: crypto prefix wins regardless of the remainder
                input: "X:C:EUR-USD",
                expected: Cluster::Crypto,
            },
            TestCase {
                // TC2: forex prefix
                input: "C:EUR-USD",
                expected: Cluster::Forex,
            },
            TestCase {
                // TC3: no recognised prefix
                input: "AAPL",
                expected: Cluster::Stocks,
            },
            TestCase {
                // TC4: lowercase prefix is not recognised
                input: "x:BTC-USD",
                expected: Cluster::Stocks,
            },
            TestCase {
                // TC5: empty key falls through to the default
                input: "",
                expected: Cluster::Stocks,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Cluster::of_instrument(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_cluster_display_and_channels() {
        assert_eq!(Cluster::Crypto.to_string(), "Crypto");
        assert_eq!(Cluster::Forex.path(), "forex");
        assert_eq!(Cluster::Stocks.channel_prefix(), "T.");
        assert!(Cluster::Crypto < Cluster::Forex && Cluster::Forex < Cluster::Stocks);
    }

    #[test]
    fn test_change_ratio() {
        let mut record = TickRecord {
            current_price: Some(105.0),
            previous_close: Some(100.0),
            last_updated: Utc::now(),
        };
        assert!((record.change_ratio().unwrap() - 0.05).abs() < 1e-12);

        record.previous_close = Some(0.0);
        assert_eq!(record.change_ratio(), None);

        record.previous_close = Some(100.0);
        record.current_price = None;
        assert_eq!(record.change_ratio(), None);
    }
}
