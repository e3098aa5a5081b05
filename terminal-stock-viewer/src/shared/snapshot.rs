//! Immutable display state at one instant.

use crate::shared::types::{Cluster, ClusterStatus, TickRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Complete rendering input published by the [`StateAggregator`](super::state::StateAggregator).
///
/// Snapshots are value copies; holding one never affects the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub prices: BTreeMap<String, TickRecord>,
    pub cluster_statuses: BTreeMap<Cluster, ClusterStatus>,
    pub warnings: Arc<Vec<String>>,
    pub debug_messages: Arc<Vec<String>>,
    pub taken_at: DateTime<Utc>,
    /// Publication order. 0 is the initial empty snapshot; every publish adds exactly 1.
    pub sequence: u64,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            prices: BTreeMap::new(),
            cluster_statuses: BTreeMap::new(),
            warnings: Arc::default(),
            debug_messages: Arc::default(),
            taken_at: Utc::now(),
            sequence: 0,
        }
    }

    pub fn status_of(&self, cluster: Cluster) -> Option<ClusterStatus> {
        self.cluster_statuses.get(&cluster).copied()
    }

    /// True if the cluster serving this instrument was last reported disconnected
    pub fn is_disconnected(&self, instrument: &str) -> bool {
        self.status_of(Cluster::of_instrument(instrument)) == Some(ClusterStatus::Disconnected)
    }

    /// Instruments grouped by cluster, keys sorted within each group
    pub fn partitions(&self) -> BTreeMap<Cluster, Vec<(&str, &TickRecord)>> {
        let mut partitions: BTreeMap<Cluster, Vec<(&str, &TickRecord)>> = BTreeMap::new();
        // BTreeMap iteration is already key-ordered
        for (instrument, record) in &self.prices {
            partitions
                .entry(Cluster::of_instrument(instrument))
                .or_default()
                .push((instrument.as_str(), record));
        }
        partitions
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(price: f64) -> TickRecord {
        TickRecord {
            current_price: Some(price),
            previous_close: None,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_partitions_group_and_sort() {
        let mut snapshot = Snapshot::empty();
        for key in ["MSFT", "X:ETH-USD", "C:EUR-USD", "AAPL", "X:BTC-USD"] {
            snapshot.prices.insert(key.to_string(), record(1.0));
        }

        let partitions = snapshot.partitions();
        let keys: Vec<(Cluster, Vec<&str>)> = partitions
            .iter()
            .map(|(cluster, rows)| (*cluster, rows.iter().map(|(key, _)| *key).collect()))
            .collect();

        assert_eq!(
            keys,
            vec![
                (Cluster::Crypto, vec!["X:BTC-USD", "X:ETH-USD"]),
                (Cluster::Forex, vec!["C:EUR-USD"]),
                (Cluster::Stocks, vec!["AAPL", "MSFT"]),
            ]
        );
    }

    #[test]
    fn test_is_disconnected() {
        let mut snapshot = Snapshot::empty();
        assert!(!snapshot.is_disconnected("X:BTC-USD"));

        snapshot
            .cluster_statuses
            .insert(Cluster::Crypto, ClusterStatus::Disconnected);
        assert!(snapshot.is_disconnected("X:BTC-USD"));
        assert!(!snapshot.is_disconnected("AAPL"));

        snapshot
            .cluster_statuses
            .insert(Cluster::Crypto, ClusterStatus::Connected);
        assert!(!snapshot.is_disconnected("X:BTC-USD"));
    }
}
