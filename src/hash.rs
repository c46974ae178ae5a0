//! # SHA-1 Hashes
//!
//! Fixed-size 20-byte identifiers used by the protocol: the info hash of a
//! torrent and the hash of every piece. Downloaded pieces are checked against
//! their expected hash before they are handed to the orchestrator.

use std::fmt;

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// Length of a SHA-1 digest in bytes.
pub const SHA1_LEN: usize = 20;

/// A 20-byte SHA-1 digest.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha1Hash(pub [u8; SHA1_LEN]);

/// Hash of the bencoded info dictionary, identifying a torrent.
pub type InfoHash = Sha1Hash;

/// Expected hash of a single piece.
pub type PieceHash = Sha1Hash;

impl Sha1Hash {
    /// Hash arbitrary data.
    pub fn digest(data: &[u8]) -> Self {
        let mut hash = [0; SHA1_LEN];
        hash.copy_from_slice(&Sha1::digest(data));
        Sha1Hash(hash)
    }

    /// Build a hash from a slice, returning `None` unless it is exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; SHA1_LEN]>::try_from(bytes).ok().map(Sha1Hash)
    }

    pub fn as_bytes(&self) -> &[u8; SHA1_LEN] {
        &self.0
    }
}

impl fmt::Debug for Sha1Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Display for Sha1Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Verify the integrity of a downloaded piece.
///
/// # Arguments
///
/// * `index` - The piece index, reported back on mismatch.
/// * `expected` - The hash recorded in the torrent metadata.
/// * `data` - The assembled piece.
///
pub fn check_integrity(index: u32, expected: &PieceHash, data: &[u8]) -> Result<()> {
    if Sha1Hash::digest(data) != *expected {
        return Err(Error::Integrity { index });
    }

    Ok(())
}
