//! Error types for the guard proxy.
//!
//! `FramingError` covers per-line read failures on either stdio stream.
//! `GuardError` covers process-level failures: backend spawn, broken proxy
//! pipes, and IO on the guard's own stdio. Per-line governance conditions
//! (malformed JSON, rate denial) are not errors — they are handled in the
//! pipeline as fail-open forwarding or a structured denial response.

use thiserror::Error;

/// Direction of a proxied stream, used to tag framing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    /// Client stdin → backend stdin.
    ClientToBackend,
    /// Backend stdout → client stdout.
    BackendToClient,
}

/// Errors that can occur while reading an NDJSON line from a stream.
#[derive(Debug, Error)]
pub enum FramingError {
    /// A single line exceeds the configured maximum size.
    ///
    /// Checked while reading, before any JSON parsing, so a peer streaming
    /// bytes without a newline cannot force unbounded allocation.
    #[error("line exceeds maximum size of {max_bytes} bytes")]
    LineTooLarge {
        /// The configured maximum line size in bytes.
        max_bytes: usize,
    },

    /// An underlying IO error occurred while reading.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that are fatal to the guard process.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Backend server process failed to start.
    #[error("backend server failed to start: {reason}")]
    BackendSpawn {
        /// The command that was spawned.
        command: String,
        /// Human-readable description of the spawn failure.
        reason: String,
    },

    /// Framing error on one of the proxied streams.
    #[error("framing error on {direction:?} stream: {source}")]
    Framing {
        /// Which stream the error occurred on.
        direction: StreamDirection,
        /// The underlying framing error.
        source: FramingError,
    },

    /// IO error on the guard's own stdin/stdout.
    #[error("stdio IO error: {0}")]
    StdioIo(std::io::Error),
}

/// Result type alias for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;
