//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced when parsing identifiers from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The identifier was empty.
    #[error("{kind} must not be empty")]
    Empty {
        /// Which identifier kind was being parsed.
        kind: &'static str,
    },

    /// A fingerprint was not 4 bytes of hex.
    #[error("Invalid fingerprint {0:?}: expected 8 hex characters")]
    InvalidFingerprint(String),
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier, rejecting empty strings.
            pub fn parse(value: impl Into<String>) -> Result<Self, IdentifierError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(IdentifierError::Empty { kind: $label });
                }
                Ok(Self(value))
            }

            /// Create an identifier without validation.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// Transaction identifier (txid or server-assigned id).
    TxId,
    "transaction id"
);

string_id!(
    /// Wallet identifier.
    WalletId,
    "wallet id"
);

string_id!(
    /// Collaborative group identifier.
    GroupId,
    "group id"
);

string_id!(
    /// Identifier of an inbound asynchronous notification.
    EventId,
    "event id"
);

string_id!(
    /// Alert identifier.
    AlertId,
    "alert id"
);

/// Stable short identifier of a signing key or device (BIP32 master fingerprint).
///
/// Always stored lowercase so that lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parse a fingerprint from its 8-character hex form.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        let normalized = value.trim().to_ascii_lowercase();
        match hex::decode(&normalized) {
            Ok(bytes) if bytes.len() == 4 => Ok(Self(normalized)),
            _ => Err(IdentifierError::InvalidFingerprint(value.to_string())),
        }
    }

    /// Build a fingerprint from its raw 4 bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Get the fingerprint as a lowercase hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

/// Bitcoin network the account operates on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Bitcoin mainnet.
    #[default]
    Main,
    /// Bitcoin testnet.
    Testnet,
    /// Signet.
    Signet,
    /// Local regtest.
    Regtest,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Chain::Main => "main",
            Chain::Testnet => "testnet",
            Chain::Signet => "signet",
            Chain::Regtest => "regtest",
        };
        f.write_str(name)
    }
}

/// The authenticated account a local cache belongs to.
///
/// Cached entities are always scoped by account so that two accounts on the
/// same device never observe each other's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountContext {
    /// Messaging identity of the account.
    pub chat_id: String,
    /// Network the account is on.
    pub chain: Chain,
}

impl AccountContext {
    /// Create a new account context.
    pub fn new(chat_id: impl Into<String>, chain: Chain) -> Self {
        Self {
            chat_id: chat_id.into(),
            chain,
        }
    }
}

impl fmt::Display for AccountContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.chat_id, self.chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_normalizes_case() {
        let fp = Fingerprint::parse("DEADBEEF").unwrap();
        assert_eq!(fp.as_str(), "deadbeef");
        assert_eq!(fp, Fingerprint::from_bytes([0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn test_fingerprint_rejects_bad_input() {
        assert!(Fingerprint::parse("xyz").is_err());
        assert!(Fingerprint::parse("deadbeef00").is_err());
        assert!(Fingerprint::parse("").is_err());
    }

    #[test]
    fn test_fingerprint_serde_validates() {
        let fp: Fingerprint = serde_json::from_str("\"0A0B0C0D\"").unwrap();
        assert_eq!(fp.as_str(), "0a0b0c0d");
        assert!(serde_json::from_str::<Fingerprint>("\"nope\"").is_err());
    }

    #[test]
    fn test_string_id_rejects_empty() {
        assert!(TxId::parse("  ").is_err());
        assert_eq!(TxId::parse("abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn test_account_display() {
        let account = AccountContext::new("@alice:nunchuk.io", Chain::Testnet);
        assert_eq!(account.to_string(), "@alice:nunchuk.io@testnet");
    }
}
