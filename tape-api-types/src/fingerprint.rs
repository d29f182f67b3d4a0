use std::fmt::{self, Display};
use std::str::FromStr;

use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};

/// 32-byte SHA-256 fingerprint, used to identify encryption keys without
/// exposing the key material itself.
#[derive(Debug, Eq, PartialEq, Hash, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Fingerprint {
    #[serde(with = "hex_bytes")]
    bytes: [u8; 32],
}

impl Fingerprint {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Short, colon-separated form used in logs (first 8 bytes).
    pub fn short(&self) -> String {
        self.bytes[0..8]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tmp = s.to_string();
        tmp.retain(|c| c != ':');
        let raw = hex::decode(&tmp)?;
        if raw.len() != 32 {
            bail!("fingerprint must be 32 bytes, got {}", raw.len());
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw);
        Ok(Fingerprint::new(bytes))
    }
}

mod hex_bytes {
    use hex::FromHex;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        <[u8; 32]>::from_hex(s).map_err(serde::de::Error::custom)
    }
}
