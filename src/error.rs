use std::io;

use thiserror::Error;

/// Unified error type for the storage engine.
///
/// A missing key is not an error: reads return `Option`.
#[derive(Error, Debug)]
pub enum Error {
    /// WAL append, fsync, or segment I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption detected (bad opcode, checksum mismatch, bad format).
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Decoder ran out of bytes before a complete item was read.
    #[error("Unexpected end of data")]
    Incomplete,

    /// The engine was shut down (or its background worker is gone).
    #[error("Engine is closed")]
    Closed,

    /// Invalid engine options.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
