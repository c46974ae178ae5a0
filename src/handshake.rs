//! # Handshake Protocol
//!
//! The handshake is the first message exchanged on a new connection, in both
//! directions. It identifies the protocol, the torrent (through its info hash)
//! and the peer.
//!
//! ## Message Format
//!
//! ```text
//! <pstrlen><pstr><reserved><info_hash><peer_id>
//! ```
//!
//! - **pstrlen**: 1 byte - length of the protocol string (19)
//! - **pstr**: protocol identifier ("BitTorrent protocol")
//! - **reserved**: 8 bytes - all zeros, ignored on reception
//! - **info_hash**: 20 bytes
//! - **peer_id**: 20 bytes
//!
//! The standard handshake is 68 bytes long.

use std::io::Read;

use crate::error::{ProtocolError, Result};
use crate::hash::{InfoHash, Sha1Hash, SHA1_LEN};
use crate::peer::PeerId;

pub const PROTOCOL_ID: &[u8; 19] = b"BitTorrent protocol";

const RESERVED_LEN: usize = 8;

/// A handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol identifier bytes
    pub pstr: Vec<u8>,
    /// Hash of the torrent's info dictionary
    pub info_hash: InfoHash,
    /// Identifier of the sending peer
    pub peer_id: PeerId,
}

impl Handshake {
    /// Creates a new handshake for the standard protocol.
    ///
    /// # Arguments
    ///
    /// * `info_hash` - Hash of the torrent's info dictionary
    /// * `peer_id` - Our own peer identifier
    ///
    pub fn new(info_hash: InfoHash, peer_id: PeerId) -> Self {
        Handshake {
            pstr: PROTOCOL_ID.to_vec(),
            info_hash,
            peer_id,
        }
    }

    /// Serializes the handshake for network transmission.
    ///
    /// Total size is always 49 + pstrlen bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut serialized: Vec<u8> =
            Vec::with_capacity(1 + self.pstr.len() + RESERVED_LEN + 2 * SHA1_LEN);

        serialized.push(self.pstr.len() as u8);
        serialized.extend_from_slice(&self.pstr);
        serialized.extend_from_slice(&[0; RESERVED_LEN]);
        serialized.extend_from_slice(self.info_hash.as_bytes());
        serialized.extend_from_slice(self.peer_id.as_bytes());

        serialized
    }
}

/// Read a handshake from a byte stream.
///
/// The reserved bytes are skipped. A protocol string length of zero is a
/// protocol error, a short read an I/O error.
pub fn read_handshake<R: Read>(reader: &mut R) -> Result<Handshake> {
    let mut len_buf = [0; 1];
    reader.read_exact(&mut len_buf)?;

    let pstrlen = len_buf[0] as usize;
    if pstrlen == 0 {
        return Err(ProtocolError::ZeroLengthProtocol.into());
    }

    let mut buf: Vec<u8> = vec![0; pstrlen + RESERVED_LEN + 2 * SHA1_LEN];
    reader.read_exact(&mut buf)?;

    let hashes_at = pstrlen + RESERVED_LEN;
    let mut info_hash = [0; SHA1_LEN];
    info_hash.copy_from_slice(&buf[hashes_at..hashes_at + SHA1_LEN]);
    let mut peer_id = [0; SHA1_LEN];
    peer_id.copy_from_slice(&buf[hashes_at + SHA1_LEN..]);

    Ok(Handshake {
        pstr: buf[..pstrlen].to_vec(),
        info_hash: Sha1Hash(info_hash),
        peer_id: PeerId(peer_id),
    })
}
