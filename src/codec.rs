//! C2: chunked authenticated-encryption framing (§4.2).
//!
//! ```text
//! "TAPEBACKARR_ENC_V1" (18 bytes)
//! repeat until EOF of logical stream:
//!     uint32be chunk_ct_len        -- length of ciphertext+tag
//!     12 bytes nonce               -- random, unique per chunk
//!     chunk_ct_len bytes           -- AES-256-GCM(ciphertext || 16-byte tag)
//! ```
//!
//! Exposed as streaming transforms so neither direction buffers more than
//! one chunk at a time.

use std::collections::{HashSet, VecDeque};
use std::io::{Read, Write};

use openssl::symm::{Cipher, Crypter, Mode};

use crate::error::{TapeError, TapeResult};

pub const CODEC_MAGIC: &[u8; 18] = b"TAPEBACKARR_ENC_V1";
pub const CHUNK_PLAINTEXT_SIZE: usize = 1024 * 1024;
const GCM_TAG_LEN: usize = 16;
const NONCE_LEN: usize = 12;
/// Hard ceiling enforced on decode: `1 MiB + 1 KiB + 28 bytes`.
const MAX_CHUNK_CT_LEN: usize = CHUNK_PLAINTEXT_SIZE + 1024 + 28;

/// Produces the per-chunk nonce. The default CSPRNG source refuses to
/// re-emit a nonce it has already handed out, turning the "CSPRNG collision"
/// scenario from a silent corruption into a hard `InvariantViolation`.
pub trait NonceSource: Send {
    fn next_nonce(&mut self) -> TapeResult<[u8; NONCE_LEN]>;
}

pub struct CsprngNonceSource {
    seen: HashSet<[u8; NONCE_LEN]>,
}

impl CsprngNonceSource {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }
}

impl Default for CsprngNonceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceSource for CsprngNonceSource {
    fn next_nonce(&mut self) -> TapeResult<[u8; NONCE_LEN]> {
        let mut nonce = [0u8; NONCE_LEN];
        openssl::rand::rand_bytes(&mut nonce)?;
        if !self.seen.insert(nonce) {
            return Err(TapeError::invariant_violation(
                "chunk codec CSPRNG produced a duplicate nonce",
            ));
        }
        Ok(nonce)
    }
}

fn encrypt_chunk(key: &[u8; 32], nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> TapeResult<Vec<u8>> {
    let cipher = Cipher::aes_256_gcm();
    let mut crypter = Crypter::new(cipher, Mode::Encrypt, key, Some(nonce))?;
    let mut ciphertext = vec![0u8; plaintext.len() + cipher.block_size()];
    let mut len = crypter.update(plaintext, &mut ciphertext)?;
    len += crypter.finalize(&mut ciphertext[len..])?;
    ciphertext.truncate(len);
    let mut tag = [0u8; GCM_TAG_LEN];
    crypter.get_tag(&mut tag)?;
    ciphertext.extend_from_slice(&tag);
    Ok(ciphertext)
}

fn decrypt_chunk(key: &[u8; 32], nonce: &[u8; NONCE_LEN], chunk_ct: &[u8]) -> TapeResult<Vec<u8>> {
    if chunk_ct.len() < GCM_TAG_LEN {
        return Err(TapeError::bad_key("ciphertext chunk shorter than the AEAD tag"));
    }
    let (ciphertext, tag) = chunk_ct.split_at(chunk_ct.len() - GCM_TAG_LEN);
    let cipher = Cipher::aes_256_gcm();
    let mut crypter = Crypter::new(cipher, Mode::Decrypt, key, Some(nonce))?;
    crypter.set_tag(tag)?;
    let mut plaintext = vec![0u8; ciphertext.len() + cipher.block_size()];
    let mut len = crypter
        .update(ciphertext, &mut plaintext)
        .map_err(|_| TapeError::bad_key("AEAD decryption failed"))?;
    len += crypter
        .finalize(&mut plaintext[len..])
        .map_err(|_| TapeError::bad_key("AEAD tag verification failed"))?;
    plaintext.truncate(len);
    Ok(plaintext)
}

/// Wraps a downstream writer, turning plaintext written to it into framed
/// AEAD chunks. Call `finish()` to flush the trailing partial chunk.
pub struct ChunkEncryptWriter<W: Write> {
    inner: W,
    key: [u8; 32],
    nonces: Box<dyn NonceSource>,
    buf: Vec<u8>,
    wrote_magic: bool,
}

impl<W: Write> ChunkEncryptWriter<W> {
    pub fn new(inner: W, key: [u8; 32]) -> Self {
        Self::with_nonce_source(inner, key, Box::new(CsprngNonceSource::new()))
    }

    pub fn with_nonce_source(inner: W, key: [u8; 32], nonces: Box<dyn NonceSource>) -> Self {
        Self {
            inner,
            key,
            nonces,
            buf: Vec::with_capacity(CHUNK_PLAINTEXT_SIZE),
            wrote_magic: false,
        }
    }

    fn ensure_magic(&mut self) -> TapeResult<()> {
        if !self.wrote_magic {
            self.inner.write_all(CODEC_MAGIC).map_err(TapeError::from)?;
            self.wrote_magic = true;
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> TapeResult<()> {
        self.ensure_magic()?;
        let nonce = self.nonces.next_nonce()?;
        let ciphertext = encrypt_chunk(&self.key, &nonce, &self.buf)?;
        let len = ciphertext.len() as u32;
        self.inner.write_all(&len.to_be_bytes()).map_err(TapeError::from)?;
        self.inner.write_all(&nonce).map_err(TapeError::from)?;
        self.inner.write_all(&ciphertext).map_err(TapeError::from)?;
        self.buf.clear();
        Ok(())
    }

    /// Push plaintext, encrypting any chunk that fills up along the way.
    pub fn write_plain(&mut self, mut data: &[u8]) -> TapeResult<()> {
        while !data.is_empty() {
            let space = CHUNK_PLAINTEXT_SIZE - self.buf.len();
            let take = space.min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buf.len() == CHUNK_PLAINTEXT_SIZE {
                self.flush_chunk()?;
            }
        }
        Ok(())
    }

    /// Flush the trailing partial chunk (even if empty, so an empty logical
    /// stream still carries the magic header) and return the inner writer.
    pub fn finish(mut self) -> TapeResult<W> {
        self.ensure_magic()?;
        if !self.buf.is_empty() {
            self.flush_chunk()?;
        }
        Ok(self.inner)
    }
}

/// Wraps an upstream reader of framed ciphertext, yielding plaintext.
pub struct ChunkDecryptReader<R: Read> {
    inner: R,
    key: [u8; 32],
    read_magic: bool,
    pending: VecDeque<u8>,
    finished: bool,
}

impl<R: Read> ChunkDecryptReader<R> {
    pub fn new(inner: R, key: [u8; 32]) -> Self {
        Self {
            inner,
            key,
            read_magic: false,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn ensure_magic(&mut self) -> TapeResult<()> {
        if self.read_magic {
            return Ok(());
        }
        let mut magic = [0u8; 18];
        self.inner.read_exact(&mut magic).map_err(TapeError::from)?;
        if &magic != CODEC_MAGIC {
            return Err(TapeError::bad_label("chunk codec magic mismatch"));
        }
        self.read_magic = true;
        Ok(())
    }

    fn read_next_chunk(&mut self) -> TapeResult<bool> {
        self.ensure_magic()?;
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finished = true;
                return Ok(false);
            }
            Err(err) => return Err(TapeError::from(err)),
        }
        let chunk_ct_len = u32::from_be_bytes(len_buf) as usize;
        if chunk_ct_len > MAX_CHUNK_CT_LEN || chunk_ct_len < GCM_TAG_LEN {
            return Err(TapeError::bad_key("chunk length outside permitted bounds"));
        }
        let mut nonce = [0u8; NONCE_LEN];
        self.inner.read_exact(&mut nonce).map_err(TapeError::from)?;
        let mut chunk_ct = vec![0u8; chunk_ct_len];
        self.inner.read_exact(&mut chunk_ct).map_err(TapeError::from)?;
        let plaintext = decrypt_chunk(&self.key, &nonce, &chunk_ct)?;
        self.pending.extend(plaintext);
        Ok(true)
    }
}

impl<R: Read> Read for ChunkDecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.pending.is_empty() && !self.finished {
            self.read_next_chunk()
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        }
        let n = self.pending.len().min(buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.pending.pop_front().unwrap();
        }
        Ok(n)
    }
}
