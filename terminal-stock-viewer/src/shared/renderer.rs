//! Display loop: redraws the terminal from the latest-snapshot slot.
//!
//! A redraw only happens for a new snapshot; after each frame the loop sleeps
//! `min_frame_interval`, so bursts of updates collapse into the newest snapshot.

use crate::shared::error::RenderError;
use crate::shared::render::render_snapshot;
use crate::shared::snapshot::Snapshot;
use chrono::Utc;
use crossterm::{
    cursor::MoveTo,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Default minimum spacing between frames (avoids tearing)
pub const DEFAULT_MIN_FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Run until the aggregator goes away (`Ok`) or a frame cannot be rendered/written (`Err`).
pub async fn run_renderer<W: Write>(
    mut snapshots: watch::Receiver<Arc<Snapshot>>,
    debug_mode: bool,
    min_frame_interval: Duration,
    out: &mut W,
) -> Result<(), RenderError> {
    loop {
        let snapshot = Arc::clone(&snapshots.borrow_and_update());
        let frame = render_snapshot(&snapshot, debug_mode, Utc::now())?;
        draw_frame(out, &frame)?;

        tokio::time::sleep(min_frame_interval).await;

        if snapshots.changed().await.is_err() {
            debug!("Snapshot source closed, stopping renderer");
            return Ok(());
        }
    }
}

/// Clear the screen and write `frame` from the top-left corner
pub fn draw_frame<W: Write>(out: &mut W, frame: &str) -> std::io::Result<()> {
    queue!(out, Clear(ClearType::All), MoveTo(0, 0), Print(frame), Print("\n"))?;
    out.flush()
}
