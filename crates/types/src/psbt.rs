//! Opaque partially-signed transaction blobs and signature proofs.

use crate::Fingerprint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// An opaque partially-signed-transaction container.
///
/// The bytes are immutable once constructed. Every signature or remote
/// update produces a new `Psbt` that replaces the previous one wholesale;
/// clones share the same allocation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Psbt(Arc<[u8]>);

impl Psbt {
    /// Wrap raw PSBT bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    /// Decode a hex-encoded PSBT.
    pub fn from_hex(encoded: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(encoded).map(Self::from_bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex-encode the PSBT.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Length of the blob in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the blob is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Psbt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = &self.0[..self.0.len().min(4)];
        write!(f, "Psbt({}.., {} bytes)", hex::encode(head), self.0.len())
    }
}

impl Serialize for Psbt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Psbt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Psbt::from_hex(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Proof that a signer contributed its partial signature.
///
/// Produced by a signer adapter: it carries the fingerprint of the key that
/// signed and the PSBT that now includes the new partial signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureProof {
    /// Key that produced the signature.
    pub fingerprint: Fingerprint,
    /// PSBT carrying the signature.
    pub psbt: Psbt,
}

impl SignatureProof {
    /// Create a new signature proof.
    pub fn new(fingerprint: Fingerprint, psbt: Psbt) -> Self {
        Self { fingerprint, psbt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psbt_hex_serde() {
        let psbt = Psbt::from_bytes(vec![0x70, 0x73, 0x62, 0x74, 0xff]);
        let json = serde_json::to_string(&psbt).unwrap();
        assert_eq!(json, "\"70736274ff\"");
        let back: Psbt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, psbt);
    }

    #[test]
    fn test_psbt_clone_shares_allocation() {
        let psbt = Psbt::from_bytes(vec![1, 2, 3]);
        let copy = psbt.clone();
        assert!(std::ptr::eq(psbt.as_bytes(), copy.as_bytes()));
    }

    #[test]
    fn test_psbt_debug_is_truncated() {
        let psbt = Psbt::from_bytes(vec![0xab; 64]);
        assert_eq!(format!("{psbt:?}"), "Psbt(abababab.., 64 bytes)");
    }
}
