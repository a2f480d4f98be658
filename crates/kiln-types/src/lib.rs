//! Foundation types for Kiln.
//!
//! Every block in a Kiln repository is named by a [`BlockKey`], the
//! domain-separated BLAKE3 digest of its payload. [`BlockHasher`] computes
//! and checks those digests.

pub mod error;
pub mod hasher;
pub mod key;

pub use error::TypeError;
pub use hasher::BlockHasher;
pub use key::BlockKey;
