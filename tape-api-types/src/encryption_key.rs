use serde::{Deserialize, Serialize};

use crate::Fingerprint;

/// Algorithms the chunk codec supports. Only one today, kept as an enum so
/// the on-disk key record can grow without a format break.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAlgorithm {
    Aes256Gcm,
}

/// Metadata describing an encryption key known to the system.
///
/// The raw key material is handled separately (see `tapearc::encryption`);
/// this type is what the Catalog persists and cross-references from
/// completed backup sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionKeyInfo {
    pub id: u64,
    pub name: String,
    pub algorithm: KeyAlgorithm,
    pub fingerprint: Fingerprint,
}
