//! Producer startup order.
//!
//! Initial prices are loaded before any cluster socket opens, so a REST price can
//! never overwrite a newer live trade. Previous closes only touch `previous_close`
//! and keep loading in the background while the feeds run.

use crate::shared::backfill::{backfill_last_prices, backfill_previous_closes, BackfillClient};
use crate::shared::feed::{run_cluster_feed, ClusterFeedConfig};
use crate::shared::state::StateAggregator;
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Spawn backfill and every cluster feed as one task. Aborting it stops them all.
pub fn spawn_producers(
    client: BackfillClient,
    instruments: Vec<String>,
    feeds: Vec<ClusterFeedConfig>,
    aggregator: Arc<StateAggregator>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Backfilling {} instruments", instruments.len());

        let previous_closes = async {
            let result = backfill_previous_closes(&client, &instruments, &aggregator).await;
            info!(
                "Previous closes loaded: {} ok, {} failed",
                result.closes_loaded, result.failures
            );
        };

        let live = async {
            let result = backfill_last_prices(&client, &instruments, &aggregator).await;
            info!(
                "Initial prices loaded: {} ok, {} failed; starting {} cluster feeds",
                result.prices_loaded,
                result.failures,
                feeds.len()
            );
            join_all(
                feeds
                    .iter()
                    .cloned()
                    .map(|config| run_cluster_feed(config, Arc::clone(&aggregator))),
            )
            .await;
        };

        futures::join!(previous_closes, live);
    })
}
