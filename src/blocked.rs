//! Block-accumulating writer/reader shared by the label/TOC records and the
//! write pipeline: arbitrary byte streams in, fixed `block_size` device
//! blocks out, with the trailing partial block zero-padded at `finish()`.

use std::io::Write;

use crate::device::TapeDevice;
use crate::error::{TapeError, TapeResult};

pub struct BlockedWriter<'a> {
    device: &'a mut dyn TapeDevice,
    block_size: usize,
    buf: Vec<u8>,
    bytes_written: u64,
    finished: bool,
}

impl<'a> BlockedWriter<'a> {
    pub fn new(device: &'a mut dyn TapeDevice) -> Self {
        let block_size = device.block_size();
        Self {
            device,
            block_size,
            buf: Vec::with_capacity(block_size),
            bytes_written: 0,
            finished: false,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn flush_full_block(&mut self) -> TapeResult<()> {
        self.device.write_block(&self.buf)?;
        self.bytes_written += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    /// Pad the trailing partial block with zeros, write it (if non-empty),
    /// then write the filemark that makes everything durable.
    pub fn finish(mut self) -> TapeResult<u64> {
        if !self.buf.is_empty() {
            self.buf.resize(self.block_size, 0);
            self.flush_full_block()?;
        }
        self.device.write_filemark()?;
        self.finished = true;
        Ok(self.bytes_written)
    }
}

impl<'a> Write for BlockedWriter<'a> {
    fn write(&mut self, mut data: &[u8]) -> std::io::Result<usize> {
        let total = data.len();
        while !data.is_empty() {
            let space = self.block_size - self.buf.len();
            let take = space.min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buf.len() == self.block_size {
                self.flush_full_block()
                    .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
            }
        }
        Ok(total)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> Drop for BlockedWriter<'a> {
    fn drop(&mut self) {
        if !self.finished && !self.buf.is_empty() {
            // Best-effort: an un-finished writer being dropped mid-run (e.g.
            // panic unwind) should not silently lose the filemark boundary.
            self.buf.resize(self.block_size, 0);
            let _ = self.device.write_block(&self.buf);
            let _ = self.device.write_filemark();
        }
    }
}

/// Reads a block-accumulated stream back into a flat byte stream, stopping
/// at the first `EndOfData` (i.e. a filemark).
pub struct BlockedReader<'a> {
    device: &'a mut dyn TapeDevice,
    block_size: usize,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<'a> BlockedReader<'a> {
    pub fn new(device: &'a mut dyn TapeDevice) -> Self {
        let block_size = device.block_size();
        Self {
            device,
            block_size,
            buf: Vec::new(),
            pos: 0,
            eof: false,
        }
    }
}

impl<'a> std::io::Read for BlockedReader<'a> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.buf.len() {
            if self.eof {
                return Ok(0);
            }
            let mut block = vec![0u8; self.block_size];
            match self.device.read_block(&mut block) {
                Ok(n) => {
                    block.truncate(n);
                    self.buf = block;
                    self.pos = 0;
                }
                Err(err) if err.kind() == crate::error::ErrorKind::EndOfData => {
                    self.eof = true;
                    return Ok(0);
                }
                Err(err) => {
                    return Err(std::io::Error::new(std::io::ErrorKind::Other, err));
                }
            }
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

pub fn map_io_to_tape(err: std::io::Error) -> TapeError {
    TapeError::from(err)
}
