use crate::key::BlockKey;

/// Domain-separated BLAKE3 hasher for block payloads.
///
/// The domain tag is prepended to every digest so that keys derived for
/// blocks can never collide with digests computed for other purposes.
pub struct BlockHasher {
    domain: &'static str,
}

impl BlockHasher {
    /// Hasher for stored blocks.
    pub const BLOCK: Self = Self {
        domain: "kiln-block-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash a payload into a block key.
    pub fn hash(&self, data: &[u8]) -> BlockKey {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        BlockKey::from_digest(*hasher.finalize().as_bytes())
    }

    /// Check that `data` hashes to `expected`.
    pub fn verify(&self, data: &[u8], expected: &BlockKey) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}
