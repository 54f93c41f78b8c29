//! Error types for CSO conversion operations

use thiserror::Error;

/// Main error type for CSO conversion operations
#[derive(Debug, Error)]
pub enum CsoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid CISO header: {0}")]
    InvalidHeader(String),
    #[error("Block {block}: inflate failed: {reason}")]
    BlockInflate { block: u32, reason: String },
    #[error("Block {block}: decompressed size mismatch: expected {expected}, got {actual}")]
    BlockSizeMismatch {
        block: u32,
        expected: u32,
        actual: u64,
    },
    #[error("Block {block}: stored offset does not fit the 32-bit index")]
    OffsetOverflow { block: u32 },
    #[error("Source image is empty")]
    EmptySource,
    #[error("Buffer too small: needed {needed}, got {available}")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("Path has no file extension to replace: {0}")]
    NoExtension(String),
}
