//! Progress reporting for long-running conversions.
//!
//! Both conversion directions walk the image one block at a time and report
//! `(done, total)` block counts to a caller-supplied sink. The surrounding
//! application typically forwards these to a UI progress bar.

/// How often progress is reported, in blocks.
pub const PROGRESS_INTERVAL: u32 = 0x100;

/// Sink for conversion progress updates.
///
/// Updates arrive at block 0, every [`PROGRESS_INTERVAL`] blocks, and once
/// more at completion with a `"Done!"` label. The codec itself has no
/// cancellation support; a sink that must stop a conversion should do so by
/// not returning.
pub trait ProgressSink {
    fn update(&mut self, done: u32, total: u32, label: &str);
}

impl<F: FnMut(u32, u32, &str)> ProgressSink for F {
    fn update(&mut self, done: u32, total: u32, label: &str) {
        self(done, total, label);
    }
}

/// Sink that discards all updates.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&mut self, _done: u32, _total: u32, _label: &str) {}
}
