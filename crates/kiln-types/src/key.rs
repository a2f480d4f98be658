use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;
use crate::hasher::BlockHasher;

/// Multihash-style code for a BLAKE3 digest.
const HASH_CODE: u8 = 0x1e;
/// Digest length in bytes.
const DIGEST_LEN: usize = 32;

/// Content address of a stored block.
///
/// A `BlockKey` is the domain-separated BLAKE3 digest of a block's payload.
/// Identical payloads always produce the same key, so a key both names and
/// verifies the block it points at.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey([u8; DIGEST_LEN]);

impl BlockKey {
    /// Length of the binary form produced by [`BlockKey::to_bytes`].
    pub const ENCODED_LEN: usize = DIGEST_LEN + 2;

    /// Compute the key for a block payload.
    pub fn for_data(data: &[u8]) -> Self {
        BlockHasher::BLOCK.hash(data)
    }

    /// Wrap a pre-computed digest.
    pub fn from_digest(digest: [u8; DIGEST_LEN]) -> Self {
        Self(digest)
    }

    /// The raw 32-byte digest.
    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Binary form: `[code, length, digest..]`.
    ///
    /// This is the representation persisted in datastore values (the files
    /// root, for instance) so that foreign byte strings can be told apart
    /// from real content addresses.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.push(HASH_CODE);
        out.push(DIGEST_LEN as u8);
        out.extend_from_slice(&self.0);
        out
    }

    /// Decode the binary form written by [`BlockKey::to_bytes`].
    pub fn cast(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(TypeError::InvalidLength {
                expected: Self::ENCODED_LEN,
                actual: bytes.len(),
            });
        }
        if bytes[0] != HASH_CODE || bytes[1] as usize != DIGEST_LEN {
            return Err(TypeError::UnknownPrefix {
                code: bytes[0],
                len: bytes[1],
            });
        }
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&bytes[2..]);
        Ok(Self(digest))
    }

    /// Canonical string form: lowercase hex of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse the canonical string form.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != DIGEST_LEN {
            return Err(TypeError::InvalidLength {
                expected: DIGEST_LEN,
                actual: bytes.len(),
            });
        }
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&bytes);
        Ok(Self(digest))
    }
}

impl fmt::Debug for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockKey({})", self.short_hex())
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for BlockKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for BlockKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn for_data_is_deterministic() {
        assert_eq!(BlockKey::for_data(b"hello"), BlockKey::for_data(b"hello"));
        assert_ne!(BlockKey::for_data(b"hello"), BlockKey::for_data(b"world"));
    }

    #[test]
    fn cast_accepts_encoded_form() {
        let key = BlockKey::for_data(b"root");
        let bytes = key.to_bytes();
        assert_eq!(bytes.len(), BlockKey::ENCODED_LEN);
        assert_eq!(BlockKey::cast(&bytes).unwrap(), key);
    }

    #[test]
    fn cast_rejects_bare_digest() {
        let key = BlockKey::for_data(b"root");
        let err = BlockKey::cast(key.digest()).unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 34,
                actual: 32
            }
        );
    }

    #[test]
    fn cast_rejects_foreign_prefix() {
        let mut bytes = BlockKey::for_data(b"x").to_bytes();
        bytes[0] = 0x12;
        assert!(matches!(
            BlockKey::cast(&bytes),
            Err(TypeError::UnknownPrefix { code: 0x12, .. })
        ));
    }

    #[test]
    fn display_is_full_hex() {
        let key = BlockKey::for_data(b"test");
        let shown = key.to_string();
        assert_eq!(shown.len(), 64);
        assert_eq!(shown.parse::<BlockKey>().unwrap(), key);
    }

    #[test]
    fn from_hex_rejects_short_input() {
        assert!(matches!(
            BlockKey::from_hex("abcd"),
            Err(TypeError::InvalidLength { expected: 32, actual: 2 })
        ));
        assert!(matches!(
            BlockKey::from_hex("zz"),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn serializes_as_hex_string() {
        let key = BlockKey::for_data(b"serde");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_hex()));
        let parsed: BlockKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn debug_uses_short_hex() {
        let key = BlockKey::from_digest([0xab; 32]);
        assert_eq!(format!("{key:?}"), "BlockKey(abababab)");
    }

    proptest! {
        #[test]
        fn cast_never_accepts_wrong_lengths(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assume!(bytes.len() != BlockKey::ENCODED_LEN);
            prop_assert!(BlockKey::cast(&bytes).is_err());
        }
    }
}
