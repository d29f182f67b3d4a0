//! C4: label and TOC records (§4.4).
//!
//! The label is a single block of JSON at file 0, written exactly once and
//! never encrypted (a reader must be able to identify a tape before it has
//! any key material). Each backup set ends with a TOC: a length-prefixed
//! JSON table of its `CatalogEntry` rows plus a trailing SHA-256 over the
//! table, written as its own filemark-delimited file. When the owning set
//! is encrypted the TOC is wrapped in its own chunk-codec session (see
//! `SPEC_FULL.md` §13) so an encrypted tape never carries plaintext file
//! names or sizes at rest.

use std::io::{Read, Write};

use openssl::sha::Sha256;
use serde::{Deserialize, Serialize};

use tape_api_types::{CatalogEntry, TapeFormat};

use crate::blocked::{BlockedReader, BlockedWriter};
use crate::codec::{ChunkDecryptReader, ChunkEncryptWriter};
use crate::device::TapeDevice;
use crate::error::{TapeError, TapeResult};

pub const LABEL_MAGIC: &str = "TAPEBACKARR_LABEL_V1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRecord {
    pub magic: String,
    pub uuid: proxmox_uuid::Uuid,
    pub pool: String,
    pub lto_type: String,
    pub format: TapeFormat,
    pub labeled_at: i64,
}

impl LabelRecord {
    pub fn new(uuid: proxmox_uuid::Uuid, pool: impl Into<String>, lto_type: impl Into<String>, labeled_at: i64) -> Self {
        Self {
            magic: LABEL_MAGIC.to_string(),
            uuid,
            pool: pool.into(),
            lto_type: lto_type.into(),
            format: TapeFormat::Raw,
            labeled_at,
        }
    }
}

/// Write the label record at file 0. The caller is responsible for
/// positioning the device appropriately beforehand (normally this is only
/// ever called once, on a blank tape, before any other write).
pub fn write_label(device: &mut dyn TapeDevice, label: &LabelRecord) -> TapeResult<()> {
    device.rewind()?;
    let json = serde_json::to_vec(label)?;
    if json.len() > device.block_size() {
        return Err(TapeError::invariant_violation(
            "label record does not fit in a single block",
        ));
    }
    let mut writer = BlockedWriter::new(device);
    writer.write_all(&json).map_err(TapeError::from)?;
    writer.finish()?;
    Ok(())
}

/// Read the label at file 0. `Ok(None)` means the tape is blank (no data at
/// all). Any other read failure is propagated.
pub fn read_label(device: &mut dyn TapeDevice) -> TapeResult<Option<LabelRecord>> {
    device.rewind()?;
    let mut reader = BlockedReader::new(device);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(TapeError::from)?;
    if buf.iter().all(|b| *b == 0) {
        return Ok(None);
    }
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    let label: LabelRecord = serde_json::from_slice(&buf[..end])?;
    if label.magic != LABEL_MAGIC {
        return Err(TapeError::bad_label("label magic mismatch"));
    }
    Ok(Some(label))
}

/// The serialized table written as a set's TOC, plus the checksum that also
/// becomes `BackupSet.checksum`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TocTable {
    backup_set_id: u64,
    entries: Vec<CatalogEntry>,
}

/// Write a set's TOC as its own filemark-delimited file, wrapped in its own
/// chunk-codec session when `key` is set. Returns the SHA-256 over the
/// plaintext serialized table (the set's checksum) regardless of
/// encryption, since that is what `BackupSet.checksum` verifies against.
pub fn write_toc(
    device: &mut dyn TapeDevice,
    backup_set_id: u64,
    entries: &[CatalogEntry],
    key: Option<[u8; 32]>,
) -> TapeResult<[u8; 32]> {
    let table = TocTable {
        backup_set_id,
        entries: entries.to_vec(),
    };
    let json = serde_json::to_vec(&table)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    let checksum = hasher.finish();

    let mut plain = Vec::with_capacity(8 + json.len() + 32);
    plain.extend_from_slice(&(json.len() as u64).to_be_bytes());
    plain.extend_from_slice(&json);
    plain.extend_from_slice(&checksum);

    let mut writer = BlockedWriter::new(device);
    match key {
        Some(key) => {
            let mut encrypt = ChunkEncryptWriter::new(Vec::new(), key);
            encrypt.write_plain(&plain)?;
            let framed = encrypt.finish()?;
            writer.write_all(&framed).map_err(TapeError::from)?;
        }
        None => writer.write_all(&plain).map_err(TapeError::from)?,
    }
    writer.finish()?;
    Ok(checksum)
}

/// Read a set's TOC back, verifying the trailing checksum. This is how a
/// reader recovers a set's catalog directly from tape, without consulting
/// the external Catalog. `key` must match whatever `write_toc` was called
/// with for this set.
pub fn read_toc(device: &mut dyn TapeDevice, key: Option<[u8; 32]>) -> TapeResult<(u64, Vec<CatalogEntry>)> {
    let reader = BlockedReader::new(device);
    let (_len, json, checksum) = match key {
        Some(key) => {
            let mut decrypt = ChunkDecryptReader::new(reader, key);
            read_toc_fields(&mut decrypt)?
        }
        None => {
            let mut reader = reader;
            read_toc_fields(&mut reader)?
        }
    };

    let mut hasher = Sha256::new();
    hasher.update(&json);
    if hasher.finish() != checksum {
        return Err(TapeError::checksum_mismatch("TOC checksum mismatch"));
    }

    let table: TocTable = serde_json::from_slice(&json)?;
    Ok((table.backup_set_id, table.entries))
}

fn read_toc_fields(reader: &mut dyn Read) -> TapeResult<(u64, Vec<u8>, [u8; 32])> {
    let mut len_buf = [0u8; 8];
    reader.read_exact(&mut len_buf).map_err(TapeError::from)?;
    let len = u64::from_be_bytes(len_buf);
    let mut json = vec![0u8; len as usize];
    reader.read_exact(&mut json).map_err(TapeError::from)?;
    let mut checksum = [0u8; 32];
    reader.read_exact(&mut checksum).map_err(TapeError::from)?;
    Ok((len, json, checksum))
}
