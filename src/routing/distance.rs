//! XOR distance between identifiers.

use sha3::{Digest, Sha3_256};
use std::fmt;

/// Width of an identifier digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// XOR of two identifier digests, ordered as a big-endian unsigned integer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct XorDistance([u8; DIGEST_LEN]);

impl XorDistance {
    /// Distance of an identifier to itself.
    pub const ZERO: Self = Self([0u8; DIGEST_LEN]);

    /// Distance between two digests.
    #[must_use]
    pub fn between(a: &[u8; DIGEST_LEN], b: &[u8; DIGEST_LEN]) -> Self {
        let mut out = [0u8; DIGEST_LEN];
        for (slot, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
            *slot = x ^ y;
        }
        Self(out)
    }

    /// Raw big-endian bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Number of leading zero bits.
    #[must_use]
    pub fn leading_zeros(&self) -> u32 {
        let mut zeros = 0;
        for byte in self.0 {
            if byte == 0 {
                zeros += 8;
            } else {
                return zeros + byte.leading_zeros();
            }
        }
        zeros
    }
}

impl fmt::Debug for XorDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XorDistance({})", hex::encode(self.0))
    }
}

impl fmt::Display for XorDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// SHA3-256 digest of the UTF-8 identifier.
#[must_use]
pub fn identifier_digest(identifier: &str) -> [u8; DIGEST_LEN] {
    Sha3_256::digest(identifier.as_bytes()).into()
}

/// XOR distance between two identifiers.
#[must_use]
pub fn xor_distance(a: &str, b: &str) -> XorDistance {
    XorDistance::between(&identifier_digest(a), &identifier_digest(b))
}
