/// Shared modules for the Terminal Stock Viewer
pub mod backfill;
pub mod config;
pub mod error;
pub mod feed;
pub mod render;
pub mod renderer;
pub mod snapshot;
pub mod startup;
pub mod state;
pub mod types;
