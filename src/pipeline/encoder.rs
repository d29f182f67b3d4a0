//! Renders one source file into a complete, block-padded record buffer,
//! optionally AEAD-framed. Pure function: easy to unit test without a device.

use crate::archive::{ArchiveHeader, ArchiveWriter};
use crate::codec::ChunkEncryptWriter;
use crate::error::TapeResult;

use super::scanner::SourceFile;

fn pad_to_block(buf: &mut Vec<u8>, block_size: usize) {
    let rem = buf.len() % block_size;
    if rem != 0 {
        buf.resize(buf.len() + (block_size - rem), 0);
    }
}

pub fn encode_record(file: &SourceFile, block_size: usize, key: Option<[u8; 32]>) -> TapeResult<Vec<u8>> {
    let header = ArchiveHeader::for_payload(
        file.path.clone(),
        file.mode,
        file.uid,
        file.gid,
        file.mtime,
        &file.payload,
    );

    let mut archive = ArchiveWriter::new(Vec::new(), block_size);
    archive.write_member(&header, &file.payload)?;
    let raw = archive.into_inner();

    let mut bytes = match key {
        Some(key) => {
            let mut encryptor = ChunkEncryptWriter::new(Vec::new(), key);
            encryptor.write_plain(&raw)?;
            encryptor.finish()?
        }
        None => raw,
    };
    pad_to_block(&mut bytes, block_size);
    Ok(bytes)
}

/// Encode the zero-length terminator record that closes a set's archive
/// stream, through the same per-record framing as every other record so a
/// restore reader's loop is uniform.
pub fn encode_terminator(block_size: usize, key: Option<[u8; 32]>) -> TapeResult<Vec<u8>> {
    let mut archive = ArchiveWriter::new(Vec::new(), block_size);
    archive.write_terminator()?;
    let raw = archive.into_inner();

    let mut bytes = match key {
        Some(key) => {
            let mut encryptor = ChunkEncryptWriter::new(Vec::new(), key);
            encryptor.write_plain(&raw)?;
            encryptor.finish()?
        }
        None => raw,
    };
    pad_to_block(&mut bytes, block_size);
    Ok(bytes)
}
