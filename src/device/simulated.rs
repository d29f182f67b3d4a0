//! A simulated tape device backed by an in-process byte store.
//!
//! Used by tests (and anywhere a physical drive isn't available) to exercise
//! the write pipeline, spanning coordinator and restore planner without
//! hardware. The backing store is exposed so tests can inject corruption
//! (see scenario 6 in the test suite: a single-bit flip between write and
//! verify).

use std::sync::{Arc, Mutex};

use crate::error::{TapeError, TapeResult};

use super::TapeDevice;

#[derive(Debug, Clone)]
enum Entry {
    Block(Vec<u8>),
    Filemark,
}

/// The in-memory state of one simulated tape. Cheaply cloneable handle via
/// `Arc<Mutex<_>>`, so a test can hold a reference to corrupt bytes while the
/// device is mounted elsewhere.
pub struct SimulatedBackingStore {
    entries: Vec<Entry>,
    capacity_bytes: u64,
    used_bytes: u64,
}

impl SimulatedBackingStore {
    pub fn new(capacity_bytes: u64) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            entries: Vec::new(),
            capacity_bytes,
            used_bytes: 0,
        }))
    }

    /// Flip one bit in the `block_index`-th written block, at `byte_offset`.
    /// Used by tests to simulate medium corruption.
    pub fn corrupt_block(&mut self, block_index: usize, byte_offset: usize, bit: u8) {
        let mut seen = 0usize;
        for entry in self.entries.iter_mut() {
            if let Entry::Block(buf) = entry {
                if seen == block_index {
                    buf[byte_offset] ^= 1 << bit;
                    return;
                }
                seen += 1;
            }
        }
        panic!("no such block {block_index} to corrupt");
    }
}

/// A `TapeDevice` whose medium lives entirely in memory.
pub struct SimulatedTapeDevice {
    store: Arc<Mutex<SimulatedBackingStore>>,
    block_size: usize,
    cursor: usize,
    file_start: usize,
}

impl SimulatedTapeDevice {
    pub fn new(store: Arc<Mutex<SimulatedBackingStore>>, block_size: usize) -> Self {
        Self {
            store,
            block_size,
            cursor: 0,
            file_start: 0,
        }
    }
}

impl TapeDevice for SimulatedTapeDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn rewind(&mut self) -> TapeResult<()> {
        self.cursor = 0;
        self.file_start = 0;
        Ok(())
    }

    fn seek_file(&mut self, file: u64) -> TapeResult<()> {
        let store = self.store.lock().unwrap();
        let mut idx = 0usize;
        let mut filemarks_seen = 0u64;
        while filemarks_seen < file {
            match store.entries.get(idx) {
                Some(Entry::Filemark) => {
                    filemarks_seen += 1;
                    idx += 1;
                }
                Some(Entry::Block(_)) => idx += 1,
                None => return Err(TapeError::end_of_data()),
            }
        }
        self.cursor = idx;
        self.file_start = idx;
        Ok(())
    }

    fn seek_block(&mut self, block: u64) -> TapeResult<()> {
        let store = self.store.lock().unwrap();
        let mut idx = self.file_start;
        let mut blocks_seen = 0u64;
        while blocks_seen < block {
            match store.entries.get(idx) {
                Some(Entry::Block(_)) => {
                    blocks_seen += 1;
                    idx += 1;
                }
                _ => return Err(TapeError::end_of_data()),
            }
        }
        self.cursor = idx;
        Ok(())
    }

    fn write_block(&mut self, buf: &[u8]) -> TapeResult<()> {
        if buf.is_empty() || buf.len() % self.block_size != 0 {
            return Err(TapeError::invariant_violation(
                "write_block called with a buffer that is not block-aligned",
            ));
        }
        let mut store = self.store.lock().unwrap();
        let remaining = store.capacity_bytes.saturating_sub(store.used_bytes);
        if buf.len() as u64 > remaining {
            return Err(TapeError::end_of_medium());
        }
        store.entries.truncate(self.cursor);
        for chunk in buf.chunks(self.block_size) {
            store.entries.push(Entry::Block(chunk.to_vec()));
            self.cursor += 1;
        }
        store.used_bytes += buf.len() as u64;
        Ok(())
    }

    fn backspace_block(&mut self) -> TapeResult<()> {
        if self.cursor > self.file_start {
            self.cursor -= 1;
        }
        Ok(())
    }

    fn read_block(&mut self, buf: &mut [u8]) -> TapeResult<usize> {
        let store = self.store.lock().unwrap();
        match store.entries.get(self.cursor) {
            Some(Entry::Block(data)) => {
                if buf.len() < data.len() {
                    return Err(TapeError::io_fatal("read buffer smaller than block size"));
                }
                buf[..data.len()].copy_from_slice(data);
                self.cursor += 1;
                Ok(data.len())
            }
            Some(Entry::Filemark) | None => Err(TapeError::end_of_data()),
        }
    }

    fn write_filemark(&mut self) -> TapeResult<()> {
        let mut store = self.store.lock().unwrap();
        store.entries.truncate(self.cursor);
        store.entries.push(Entry::Filemark);
        self.cursor += 1;
        self.file_start = self.cursor;
        Ok(())
    }

    fn query_position(&mut self) -> TapeResult<(u64, u64)> {
        let store = self.store.lock().unwrap();
        let mut file = 0u64;
        let mut idx = 0usize;
        while idx < self.file_start {
            if let Some(Entry::Filemark) = store.entries.get(idx) {
                file += 1;
            }
            idx += 1;
        }
        let block = (self.cursor - self.file_start) as u64;
        Ok((file, block))
    }

    fn query_capacity(&mut self) -> TapeResult<(u64, u64)> {
        let store = self.store.lock().unwrap();
        Ok((
            store.capacity_bytes,
            store.capacity_bytes.saturating_sub(store.used_bytes),
        ))
    }

    fn close(&mut self) -> TapeResult<()> {
        Ok(())
    }
}
