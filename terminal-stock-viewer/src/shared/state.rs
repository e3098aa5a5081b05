//! Shared aggregation layer between the feeds and the renderer.
//!
//! Every producer (cluster feeds, backfill, heartbeat) mutates the working state
//! through [`StateAggregator`]. Each mutation and the publication of the resulting
//! [`Snapshot`] happen under one lock, so subscribers observe a strict total order
//! of snapshots with no lost or duplicated updates.

use crate::shared::snapshot::Snapshot;
use crate::shared::types::{Cluster, ClusterStatus, TickRecord};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Default heartbeat period: keeps "time since last update" columns ticking
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Mutable working state. Only reachable through [`StateAggregator`].
#[derive(Debug, Default)]
struct WorkingState {
    prices: BTreeMap<String, TickRecord>,
    cluster_statuses: BTreeMap<Cluster, ClusterStatus>,
    // Append-only logs are shared with published snapshots and only copied on append
    warnings: Arc<Vec<String>>,
    debug_messages: Arc<Vec<String>>,
    sequence: u64,
}

impl WorkingState {
    fn to_snapshot(&self, taken_at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            prices: self.prices.clone(),
            cluster_statuses: self.cluster_statuses.clone(),
            warnings: Arc::clone(&self.warnings),
            debug_messages: Arc::clone(&self.debug_messages),
            taken_at,
            sequence: self.sequence,
        }
    }
}

/// Serializes all mutations and publishes a new [`Snapshot`] after each one.
///
/// Shared between tasks as `Arc<StateAggregator>`. Mutations are synchronous and
/// never suspend, so the lock is never held across an `.await`.
pub struct StateAggregator {
    state: Mutex<WorkingState>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
}

impl StateAggregator {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::empty()));
        Self {
            state: Mutex::new(WorkingState::default()),
            snapshot_tx,
        }
    }

    /// Subscribe to the latest-snapshot slot. Slow subscribers skip intermediate
    /// snapshots and only ever see the newest one.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Most recently published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot_tx.borrow())
    }

    /// Upsert the current price, keeping any known previous close
    pub fn record_price(&self, instrument: &str, price: f64, observed_at: DateTime<Utc>) {
        self.mutate(|state| match state.prices.get_mut(instrument) {
            Some(record) => {
                record.current_price = Some(price);
                record.last_updated = observed_at;
            }
            None => {
                state.prices.insert(
                    instrument.to_string(),
                    TickRecord {
                        current_price: Some(price),
                        previous_close: None,
                        last_updated: observed_at,
                    },
                );
            }
        });
    }

    /// Upsert the previous close, keeping any known current price and update time
    pub fn record_previous_close(&self, instrument: &str, price: f64) {
        self.mutate(|state| match state.prices.get_mut(instrument) {
            Some(record) => record.previous_close = Some(price),
            None => {
                state.prices.insert(
                    instrument.to_string(),
                    TickRecord {
                        current_price: None,
                        previous_close: Some(price),
                        last_updated: Utc::now(),
                    },
                );
            }
        });
    }

    /// Record a cluster status change along with exactly one diagnostic entry
    pub fn set_cluster_status(&self, cluster: Cluster, status: ClusterStatus) {
        self.mutate(|state| {
            state.cluster_statuses.insert(cluster, status);
            match status {
                ClusterStatus::Connected => Arc::make_mut(&mut state.debug_messages)
                    .push(format!("Connected to {cluster} cluster!")),
                ClusterStatus::Disconnected => Arc::make_mut(&mut state.warnings)
                    .push(format!("Disconnected from {cluster} cluster!")),
            }
        });
    }

    pub fn add_warning(&self, text: impl Into<String>) {
        let text = text.into();
        self.mutate(|state| Arc::make_mut(&mut state.warnings).push(text));
    }

    pub fn add_debug_message(&self, text: impl Into<String>) {
        let text = text.into();
        self.mutate(|state| Arc::make_mut(&mut state.debug_messages).push(text));
    }

    /// Publish a fresh snapshot without changing any data
    pub fn tick(&self) {
        self.mutate(|_| {});
    }

    /// Apply `f` and publish inside one critical section.
    fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut WorkingState),
    {
        let mut state = self.state.lock();
        f(&mut *state);
        state.sequence += 1;
        let snapshot = Arc::new(state.to_snapshot(Utc::now()));
        // send_replace never blocks and succeeds with zero receivers
        self.snapshot_tx.send_replace(snapshot);
    }
}

impl Default for StateAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the heartbeat producer: calls [`StateAggregator::tick`] every `period`
pub fn spawn_heartbeat(aggregator: Arc<StateAggregator>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Starting heartbeat every {:?}", period);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            aggregator.tick();
        }
    })
}
