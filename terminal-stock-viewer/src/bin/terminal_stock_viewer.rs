//! Terminal Stock Viewer
//!
//! Starts the aggregator heartbeat, the REST backfill followed by one feed per
//! Polygon cluster, and the display loop, then runs until Ctrl-C or a render failure.

use std::{error::Error, io, sync::Arc};

use rustls::crypto::ring::default_provider;
use terminal_stock_viewer::{
    run_renderer, spawn_heartbeat, spawn_producers, BackfillClient, ClusterFeedConfig, Config,
    StateAggregator,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = default_provider().install_default();
    init_logging();

    // Configuration errors are fatal before any task starts
    let config = Config::from_env()?;
    info!(
        "Tracking {} instruments (debug mode: {})",
        config.instruments.len(),
        config.debug_mode
    );

    let aggregator = Arc::new(StateAggregator::new());
    let snapshots = aggregator.subscribe();

    let heartbeat = spawn_heartbeat(Arc::clone(&aggregator), config.heartbeat_period);

    let feeds = config
        .instruments_by_cluster()
        .into_iter()
        .map(|(cluster, instruments)| ClusterFeedConfig::new(&config, cluster, &instruments))
        .collect();
    let producers = spawn_producers(
        BackfillClient::new(&config.rest_domain, config.api_key.clone()),
        config.instruments.clone(),
        feeds,
        Arc::clone(&aggregator),
    );

    let mut stdout = io::stdout();
    let result = tokio::select! {
        result = run_renderer(snapshots, config.debug_mode, config.min_frame_interval, &mut stdout) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            Ok(())
        }
    };

    producers.abort();
    heartbeat.abort();

    if let Err(e) = &result {
        error!("Renderer failed: {}", e);
    }
    result?;
    Ok(())
}

/// Logs go to stderr so they never interleave with the frame on stdout.
/// Silent unless RUST_LOG is set.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
        )
        .with_writer(io::stderr)
        .init();
}
