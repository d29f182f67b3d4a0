//! C3: the archive stream (§4.3).
//!
//! A self-describing, forward-only sequence of member records. Each member
//! carries path/mode/ownership/mtime/size/checksum plus its payload; both
//! the header section and the payload section are zero-padded to the
//! configured block size, so a `CatalogEntry.block_offset` can point a
//! restore directly at a payload's first byte without replaying the stream
//! from the start of the file. A zero-length terminator record closes the
//! stream.

use std::io::{Read, Write};

use endian_trait::Endian;
use openssl::sha::Sha256;
use proxmox_io::{ReadExt, WriteExt};

use crate::error::{TapeError, TapeResult};

#[derive(Endian, Copy, Clone)]
#[repr(C)]
struct RawMemberHeader {
    path_len: u32,
    mode: u32,
    uid: u32,
    gid: u32,
    mtime: i64,
    size: u64,
    checksum: [u8; 32],
}

/// One archived file's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub path: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: i64,
    pub size: u64,
    pub checksum: [u8; 32],
}

impl ArchiveHeader {
    pub fn for_payload(path: impl Into<String>, mode: u32, uid: u32, gid: u32, mtime: i64, payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        Self {
            path: path.into(),
            mode,
            uid,
            gid,
            mtime,
            size: payload.len() as u64,
            checksum: hasher.finish(),
        }
    }
}

fn pad_len(written: usize, block_size: usize) -> usize {
    let rem = written % block_size;
    if rem == 0 {
        0
    } else {
        block_size - rem
    }
}

fn write_zeros(w: &mut impl Write, n: usize) -> TapeResult<()> {
    if n == 0 {
        return Ok(());
    }
    let zeros = vec![0u8; n];
    w.write_all(&zeros).map_err(TapeError::from)
}

fn skip_exact(r: &mut impl Read, n: usize) -> TapeResult<()> {
    if n == 0 {
        return Ok(());
    }
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf).map_err(TapeError::from)
}

/// Writes archive member records to an inner byte sink (typically a
/// block-accumulating writer, optionally wrapped in the chunk codec).
///
/// Tracks its own byte count so callers can learn, via `write_member`'s
/// return value, the logical offset at which each member's header began —
/// the basis for `CatalogEntry.block_offset` (see the write pipeline).
pub struct ArchiveWriter<W: Write> {
    inner: W,
    block_size: usize,
    count: u64,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(inner: W, block_size: usize) -> Self {
        Self {
            inner,
            block_size,
            count: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.count
    }

    fn write_all(&mut self, buf: &[u8]) -> TapeResult<()> {
        self.inner.write_all(buf).map_err(TapeError::from)?;
        self.count += buf.len() as u64;
        Ok(())
    }

    /// Write one member. Both the header section and the payload section
    /// are rounded up to `block_size`. Returns the byte offset, relative to
    /// the start of this writer's stream, at which the header began.
    pub fn write_member(&mut self, header: &ArchiveHeader, payload: &[u8]) -> TapeResult<u64> {
        if header.path.len() > u32::MAX as usize {
            return Err(TapeError::invariant_violation("path too long to encode"));
        }
        let member_start = self.count;
        let raw = RawMemberHeader {
            path_len: header.path.len() as u32,
            mode: header.mode,
            uid: header.uid,
            gid: header.gid,
            mtime: header.mtime,
            size: header.size,
            checksum: header.checksum,
        };
        let header_bytes = std::mem::size_of::<RawMemberHeader>() + header.path.len();

        let mut raw_bytes = Vec::with_capacity(std::mem::size_of::<RawMemberHeader>());
        unsafe {
            raw_bytes.write_le_value(raw).map_err(TapeError::from)?;
        }
        self.write_all(&raw_bytes)?;
        self.write_all(header.path.as_bytes())?;
        let pad = pad_len(header_bytes, self.block_size);
        let zeros = vec![0u8; pad];
        self.write_all(&zeros)?;

        self.write_all(payload)?;
        let pad = pad_len(payload.len(), self.block_size);
        let zeros = vec![0u8; pad];
        self.write_all(&zeros)?;
        Ok(member_start)
    }

    /// Close the stream with a zero-length terminator record.
    pub fn write_terminator(&mut self) -> TapeResult<()> {
        let raw = RawMemberHeader {
            path_len: 0,
            mode: 0,
            uid: 0,
            gid: 0,
            mtime: 0,
            size: 0,
            checksum: [0u8; 32],
        };
        let header_bytes = std::mem::size_of::<RawMemberHeader>();
        unsafe {
            self.inner.write_le_value(raw).map_err(TapeError::from)?;
        }
        write_zeros(&mut self.inner, pad_len(header_bytes, self.block_size))
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads archive member records back out. Stops (`Ok(None)`) at the
/// terminator record.
pub struct ArchiveReader<R: Read> {
    inner: R,
    block_size: usize,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(inner: R, block_size: usize) -> Self {
        Self { inner, block_size }
    }

    /// Read the next member, verifying its payload checksum.
    pub fn read_member(&mut self) -> TapeResult<Option<(ArchiveHeader, Vec<u8>)>> {
        let raw: RawMemberHeader = unsafe { self.inner.read_le_value().map_err(TapeError::from)? };
        let header_bytes = std::mem::size_of::<RawMemberHeader>() + raw.path_len as usize;

        if raw.path_len == 0 {
            skip_exact(&mut self.inner, pad_len(std::mem::size_of::<RawMemberHeader>(), self.block_size))?;
            return Ok(None);
        }

        let mut path_buf = vec![0u8; raw.path_len as usize];
        self.inner.read_exact(&mut path_buf).map_err(TapeError::from)?;
        let path = String::from_utf8(path_buf)
            .map_err(|_| TapeError::invariant_violation("archive member path is not valid UTF-8"))?;
        skip_exact(&mut self.inner, pad_len(header_bytes, self.block_size))?;

        let mut payload = vec![0u8; raw.size as usize];
        self.inner.read_exact(&mut payload).map_err(TapeError::from)?;
        skip_exact(&mut self.inner, pad_len(payload.len(), self.block_size))?;

        let mut hasher = Sha256::new();
        hasher.update(&payload);
        if hasher.finish() != raw.checksum {
            return Err(TapeError::checksum_mismatch(format!(
                "payload checksum mismatch while reading member"
            )));
        }

        let header = ArchiveHeader {
            path,
            mode: raw.mode,
            uid: raw.uid,
            gid: raw.gid,
            mtime: raw.mtime,
            size: raw.size,
            checksum: raw.checksum,
        };
        Ok(Some((header, payload)))
    }
}

