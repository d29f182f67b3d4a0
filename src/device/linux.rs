//! Real Linux tape device backend, driven through `st(4)`'s `MTIOCTOP`
//! and `MTIOCGET` ioctls.
//!
//! Capacity reporting is a best-effort local estimate (`nominal_capacity`):
//! precise values require vendor SCSI MAM attribute reads, which are outside
//! this crate's scope (see `TapeDevice` doc comment). The important
//! contract — `write_block` turning `ENOSPC`/`EIO` at end of tape into
//! `EndOfMedium` — holds regardless.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::errno::Errno;

use crate::error::{TapeError, TapeResult};

use super::linux_mtio::{mtioctop, Mtop, MTBSR, MTFSF, MTFSR, MTREW, MTWEOF};
use super::TapeDevice;

pub struct LinuxTapeDevice {
    file: File,
    block_size: usize,
    nominal_capacity: u64,
    used_bytes: u64,
    /// Block offset within the current file, relative to where `seek_file`
    /// last positioned us. `MTFSR`/`MTBSR` are relative to the drive's
    /// current position, not absolute, so `seek_block` has to compute a
    /// delta against this rather than space forward by the requested count.
    block_pos: u64,
}

impl LinuxTapeDevice {
    /// Open a character-mode tape device (e.g. `/dev/nst0`).
    ///
    /// `block_size` must match the drive's negotiated block size; mismatches
    /// are a pre-flight `BadLabel`-class configuration error, not something
    /// this layer can repair.
    pub fn open(path: &Path, block_size: usize, nominal_capacity: u64) -> TapeResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|err| match err.raw_os_error() {
                Some(libc::EBUSY) => TapeError::device_busy(),
                Some(libc::ENOMEDIUM) | Some(libc::ENODEV) => TapeError::not_mounted(),
                _ => TapeError::from(err),
            })?;

        Ok(Self {
            file,
            block_size,
            nominal_capacity,
            used_bytes: 0,
            block_pos: 0,
        })
    }

    fn mt_op(&self, op: i16, count: i32) -> TapeResult<()> {
        let mtop = Mtop {
            mt_op: op,
            mt_count: count,
        };
        unsafe { mtioctop(self.file.as_raw_fd(), &mtop) }
            .map(|_| ())
            .map_err(map_nix_err)
    }
}

fn map_nix_err(err: Errno) -> TapeError {
    match err {
        Errno::ENOSPC => TapeError::end_of_medium(),
        Errno::EBUSY => TapeError::device_busy(),
        Errno::ENOMEDIUM | Errno::ENODEV => TapeError::not_mounted(),
        Errno::EINTR | Errno::EAGAIN => TapeError::io_transient(err),
        other => TapeError::io_fatal(other),
    }
}

impl TapeDevice for LinuxTapeDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn rewind(&mut self) -> TapeResult<()> {
        self.mt_op(MTREW, 1)?;
        self.block_pos = 0;
        Ok(())
    }

    fn seek_file(&mut self, file: u64) -> TapeResult<()> {
        self.mt_op(MTREW, 1)?;
        if file > 0 {
            self.mt_op(MTFSF, file as i32)?;
        }
        self.block_pos = 0;
        Ok(())
    }

    /// `block` is absolute within the current file; `MTFSR`/`MTBSR` only
    /// move relative to wherever the drive already is, so this spaces by
    /// the delta against `block_pos` rather than by `block` itself.
    fn seek_block(&mut self, block: u64) -> TapeResult<()> {
        if block > self.block_pos {
            self.mt_op(MTFSR, (block - self.block_pos) as i32)?;
        } else if block < self.block_pos {
            self.mt_op(MTBSR, (self.block_pos - block) as i32)?;
        }
        self.block_pos = block;
        Ok(())
    }

    fn write_block(&mut self, buf: &[u8]) -> TapeResult<()> {
        if buf.is_empty() || buf.len() % self.block_size != 0 {
            return Err(TapeError::invariant_violation(
                "write_block called with a buffer that is not block-aligned",
            ));
        }
        if self.used_bytes.saturating_add(buf.len() as u64) > self.nominal_capacity {
            return Err(TapeError::end_of_medium());
        }
        nix::unistd::write(&self.file, buf).map_err(map_nix_err)?;
        self.used_bytes += buf.len() as u64;
        self.block_pos += (buf.len() / self.block_size) as u64;
        Ok(())
    }

    fn backspace_block(&mut self) -> TapeResult<()> {
        self.mt_op(MTBSR, 1)?;
        self.block_pos = self.block_pos.saturating_sub(1);
        Ok(())
    }

    fn read_block(&mut self, buf: &mut [u8]) -> TapeResult<usize> {
        match nix::unistd::read(self.file.as_raw_fd(), buf) {
            Ok(0) => Err(TapeError::end_of_data()),
            Ok(n) => {
                self.block_pos += 1;
                Ok(n)
            }
            Err(err) => Err(map_nix_err(err)),
        }
    }

    fn write_filemark(&mut self) -> TapeResult<()> {
        self.mt_op(MTWEOF, 1)
    }

    fn query_position(&mut self) -> TapeResult<(u64, u64)> {
        use super::linux_mtio::{mtiocget, Mtget};
        let mut status = Mtget::default();
        unsafe { mtiocget(self.file.as_raw_fd(), &mut status) }.map_err(map_nix_err)?;
        Ok((status.mt_fileno as u64, status.mt_blkno as u64))
    }

    fn query_capacity(&mut self) -> TapeResult<(u64, u64)> {
        Ok((
            self.nominal_capacity,
            self.nominal_capacity.saturating_sub(self.used_bytes),
        ))
    }

    fn close(&mut self) -> TapeResult<()> {
        Ok(())
    }
}
