//! Error types for the downloader.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing or running a batch.
#[derive(Debug, Error)]
pub enum Error {
    /// No output directory was given.
    #[error("Please specify an output folder.")]
    MissingOutputDir,

    /// The source text contained no URL.
    #[error("Please enter at least one URL.")]
    NoSources,

    /// The extraction engine could not be started.
    #[error("Failed to start yt-dlp: {0}")]
    EngineSpawn(#[source] std::io::Error),

    /// The extraction engine exited with a failure status.
    #[error("yt-dlp failed ({}): {stderr}", describe_exit(.code))]
    EngineFailed {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Tail of the engine's stderr output.
        stderr: String,
    },

    /// The engine printed metadata that is not valid JSON.
    #[error("Invalid metadata from yt-dlp: {0}")]
    InvalidMetadata(#[from] serde_json::Error),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "killed".to_string(),
    }
}
