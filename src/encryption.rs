//! Encryption key lifecycle.
//!
//! Keys are raw 256-bit AES-GCM material, identified by a `Fingerprint`
//! (SHA-256 of the key bytes themselves — deliberately distinct from any
//! chunk or nonce derived from it). A key in use by an in-progress run is
//! pinned: `remove` refuses to drop key material out from under a pipeline
//! that still holds a handle to it, returning `CatalogConflict` instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use openssl::sha::Sha256;

use tape_api_types::encryption_key::{EncryptionKeyInfo, KeyAlgorithm};
use tape_api_types::Fingerprint;

use crate::error::{TapeError, TapeResult};

struct Entry {
    info: EncryptionKeyInfo,
    material: [u8; 32],
    pins: u32,
    /// Set once a set written under this key reaches `Completed` and never
    /// cleared again, unlike `pins` (which drops back to zero once the
    /// writing run's handle is dropped).
    referenced: bool,
}

struct Inner {
    keys: HashMap<u64, Entry>,
    next_id: u64,
}

/// A registry of known encryption keys, shared between whatever loads keys
/// (config layer, out of scope here) and whatever uses them (the write
/// pipeline, the restore planner).
#[derive(Clone)]
pub struct KeyRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                keys: HashMap::new(),
                next_id: 1,
            })),
        }
    }

    pub fn register(&self, name: impl Into<String>, material: [u8; 32]) -> EncryptionKeyInfo {
        let mut hasher = Sha256::new();
        hasher.update(&material);
        let fingerprint = Fingerprint::new(hasher.finish());
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        let info = EncryptionKeyInfo {
            id,
            name: name.into(),
            algorithm: KeyAlgorithm::Aes256Gcm,
            fingerprint,
        };
        inner.keys.insert(
            id,
            Entry {
                info: info.clone(),
                material,
                pins: 0,
                referenced: false,
            },
        );
        info
    }

    pub fn info(&self, id: u64) -> Option<EncryptionKeyInfo> {
        self.inner.lock().unwrap().keys.get(&id).map(|e| e.info.clone())
    }

    /// Pin a key for the lifetime of the returned handle; `remove` on this
    /// id will fail for as long as any handle is outstanding.
    pub fn pin(&self, id: u64) -> TapeResult<KeyHandle> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .keys
            .get_mut(&id)
            .ok_or_else(|| TapeError::invariant_violation("no such encryption key"))?;
        entry.pins += 1;
        Ok(KeyHandle {
            registry: self.inner.clone(),
            id,
            material: entry.material,
        })
    }

    /// Mark a key permanently referenced: once any completed `BackupSet`
    /// used it, its material must survive for as long as that set's data
    /// might still be restored, regardless of whether any run still holds
    /// a pin on it.
    pub fn mark_referenced(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.keys.get_mut(&id) {
            entry.referenced = true;
        }
    }

    /// Remove a key. Fails with `CatalogConflict` while any run holds a pin,
    /// or permanently once a completed backup set has referenced it.
    pub fn remove(&self, id: u64) -> TapeResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.keys.get(&id) {
            Some(entry) if entry.pins > 0 => Err(TapeError::catalog_conflict(
                "encryption key is pinned by an in-progress run",
            )),
            Some(entry) if entry.referenced => Err(TapeError::catalog_conflict(
                "encryption key is referenced by a completed backup set",
            )),
            Some(_) => {
                inner.keys.remove(&id);
                Ok(())
            }
            None => Err(TapeError::invariant_violation("no such encryption key")),
        }
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII pin on one key's material. Clone the raw bytes out with `key()` for
/// handing to `ChunkEncryptWriter`/`ChunkDecryptReader`, which both take keys
/// by value.
pub struct KeyHandle {
    registry: Arc<Mutex<Inner>>,
    id: u64,
    material: [u8; 32],
}

impl KeyHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> [u8; 32] {
        self.material
    }
}

impl Drop for KeyHandle {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.registry.lock() {
            if let Some(entry) = inner.keys.get_mut(&self.id) {
                entry.pins = entry.pins.saturating_sub(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinned_key_blocks_removal() {
        let registry = KeyRegistry::new();
        let info = registry.register("test", [9u8; 32]);
        let handle = registry.pin(info.id).unwrap();
        assert!(registry.remove(info.id).is_err());
        drop(handle);
        assert!(registry.remove(info.id).is_ok());
    }

    #[test]
    fn referenced_key_cannot_be_removed_even_after_its_pin_drops() {
        let registry = KeyRegistry::new();
        let info = registry.register("test", [3u8; 32]);
        let handle = registry.pin(info.id).unwrap();
        registry.mark_referenced(info.id);
        drop(handle);
        assert!(registry.remove(info.id).is_err());
    }

    #[test]
    fn fingerprint_is_stable() {
        let registry = KeyRegistry::new();
        let info = registry.register("test", [1u8; 32]);
        let again = registry.register("test2", [1u8; 32]);
        assert_eq!(info.fingerprint, again.fingerprint);
    }
}
