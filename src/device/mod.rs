//! C1: `TapeDevice` — block-aligned positioned I/O against a character tape
//! device, plus the test-only simulated backend and a real Linux `st(4)`
//! backend driven through `MTIOCTOP`/`MTIOCGET`.

mod simulated;
pub use simulated::{SimulatedBackingStore, SimulatedTapeDevice};

#[cfg(target_os = "linux")]
mod linux_mtio;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::LinuxTapeDevice;

use crate::error::TapeResult;

/// Block-level I/O against one mounted tape. Implementations serialize
/// access internally; the write pipeline holds one instance for the
/// lifetime of a run.
pub trait TapeDevice: Send {
    /// Fixed block size for this mount, negotiated once at open time.
    fn block_size(&self) -> usize;

    /// Rewind to the beginning of the medium (file 0, block 0).
    fn rewind(&mut self) -> TapeResult<()>;

    /// Position at the start of the given file number (0-based), skipping
    /// over filemarks.
    fn seek_file(&mut self, file: u64) -> TapeResult<()>;

    /// Position at the given absolute block number within the current file.
    fn seek_block(&mut self, block: u64) -> TapeResult<()>;

    /// Write one block. `buf.len()` must be a multiple of `block_size()`.
    /// Returns `EndOfMedium` if the block does not fit; in that case the
    /// block is not considered written.
    fn write_block(&mut self, buf: &[u8]) -> TapeResult<()>;

    /// Move the position back by one block, for write-retry.
    fn backspace_block(&mut self) -> TapeResult<()>;

    /// Read one block into `buf` (`buf.len()` must equal `block_size()`),
    /// returning the number of bytes actually valid in the block, or
    /// `EndOfData` if positioned past the last written record.
    fn read_block(&mut self, buf: &mut [u8]) -> TapeResult<usize>;

    /// Write a filemark. After this call returns, all blocks written to the
    /// current file since the previous filemark are durable.
    fn write_filemark(&mut self) -> TapeResult<()>;

    /// Current `(file, block)` position.
    fn query_position(&mut self) -> TapeResult<(u64, u64)>;

    /// `(total_bytes, remaining_bytes)` capacity of the mounted medium.
    fn query_capacity(&mut self) -> TapeResult<(u64, u64)>;

    fn close(&mut self) -> TapeResult<()>;
}
