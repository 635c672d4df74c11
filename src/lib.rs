//! Resolves video, playlist and channel URLs into individual items and
//! downloads them one at a time through yt-dlp.

// Batch orchestration on a background task
pub mod batch;
// Extraction engine seam and yt-dlp process driver
pub mod engine;
// Crate error type
pub mod error;
// Source URL expansion
pub mod expand;
// Single item download
pub mod job;
// Run events and notices exchanged with the UI
pub mod model;
// Progress parsing and state
pub mod progress;
// Quality labels and format expressions
pub mod quality;

pub use error::{Error, Result};
