//! CISO (compressed ISO) container handling
//!
//! This crate reads and writes the `CISO` block-compressed disc image format
//! (`.CSO` files) used by PSP and PS Vita backup tools. A CSO file stores a
//! plain ISO9660 image as a sequence of independently deflate-compressed
//! 2048-byte sectors behind an offset index, so any sector can be located
//! without scanning the data that precedes it.

pub mod convert;
pub mod error;
pub mod progress;
pub mod reader;
pub mod structs;
pub mod writer;

// Re-export main types for convenience
pub use convert::{compress_iso, decompress_cso};
pub use error::CsoError;
pub use progress::{NoProgress, ProgressSink, PROGRESS_INTERVAL};
pub use reader::CsoReader;
pub use structs::{CisoHeader, IndexEntry, IndexTable, PLAIN_BLOCK_FLAG};
pub use writer::CsoStreamWriter;
pub use writer::CsoWriter;
