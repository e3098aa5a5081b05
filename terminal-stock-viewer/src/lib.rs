/// Terminal Stock Viewer - Shared Library
///
/// Streams prices for crypto, forex and stock instruments from Polygon clusters
/// and renders them as a continuously refreshed terminal table.
///
/// The library includes:
/// - A state aggregator that serializes updates from every producer and
///   publishes immutable snapshots
/// - WebSocket feeds (one per cluster) and a REST backfill
/// - The snapshot renderer and its display loop
pub mod shared;

// Re-export commonly used types for convenience
pub use shared::types::{Cluster, ClusterStatus, TickRecord, CRYPTO_PREFIX, FOREX_PREFIX};

pub use shared::config::Config;
pub use shared::error::{ConfigError, FeedError, RenderError};
pub use shared::snapshot::Snapshot;

// Aggregation core
pub use shared::state::{spawn_heartbeat, StateAggregator};

// Producers
pub use shared::backfill::{BackfillClient, BackfillResult};
pub use shared::feed::{run_cluster_feed, ClusterFeedConfig, FeedMessage};
pub use shared::startup::spawn_producers;

// Display
pub use shared::render::render_snapshot;
pub use shared::renderer::run_renderer;
