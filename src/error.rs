//! Error types for pixelflut-client.

use std::ops::Range;
use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectionState;

/// Main error type for all Pixelflut operations.
#[derive(Debug, Error)]
pub enum PixelflutError {
    /// Malformed caller input (bad color text, zero workers, out-of-canvas pixel, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error during connect, write or read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the connection, or the writer task stopped.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connect or response read did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Malformed or unparseable server response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation attempted outside the `Open` connection state.
    #[error("Cannot {operation} while connection is {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    /// A draw worker failed; identifies the strip and row in flight.
    #[error("Chunk {index} (columns {}..{}) failed at row {row}: {source}", columns.start, columns.end)]
    ChunkFailed {
        index: usize,
        columns: Range<u32>,
        row: u32,
        #[source]
        source: Box<PixelflutError>,
    },

    /// A draw worker panicked (typically inside a pixel source). Draws
    /// report it as the source of a `ChunkFailed`.
    #[error("Draw worker panicked: {0}")]
    WorkerPanicked(String),

    /// Draw stopped by a caller-level cancellation signal.
    #[error("Draw cancelled")]
    Cancelled,

    /// JSON error (config files only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PixelflutError {
    /// True for transport failures: I/O, premature close and timeouts.
    pub fn is_connection_error(&self) -> bool {
        match self {
            PixelflutError::Io(_) | PixelflutError::ConnectionClosed => true,
            PixelflutError::Timeout { .. } => true,
            PixelflutError::ChunkFailed { source, .. } => source.is_connection_error(),
            _ => false,
        }
    }
}

/// Result type alias using PixelflutError.
pub type Result<T> = std::result::Result<T, PixelflutError>;
