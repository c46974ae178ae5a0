//! # Peer Information
//!
//! This module defines the `Peer` address structure, our own `PeerId`, and the
//! parser for the compact peer list handed out by trackers.
//!
//! ## Compact Peer Format
//!
//! The compact format consists of 6-byte entries:
//!
//! ```text
//! <IP: 4 bytes><Port: 2 bytes>
//! ```
//!
//! Both the IPv4 address and the port are in network byte order.

use std::fmt;
use std::io::Cursor;
use std::net::{Ipv4Addr, SocketAddrV4};

use byteorder::{BigEndian, ReadBytesExt};
use rand::Rng;

use crate::error::{Error, Result};
use crate::hash::SHA1_LEN;

const PEER_SIZE: usize = 6;

/// Prefix of generated peer ids, in the Azureus style.
const PEER_ID_PREFIX: &[u8; 8] = b"-SG0100-";

/// A 20-byte peer identifier.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; SHA1_LEN]);

impl PeerId {
    /// Generate a random peer id carrying the client prefix.
    pub fn generate() -> Self {
        let mut id = [0; SHA1_LEN];
        id[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX);
        rand::thread_rng().fill(&mut id[PEER_ID_PREFIX.len()..]);
        PeerId(id)
    }

    pub fn as_bytes(&self) -> &[u8; SHA1_LEN] {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// A peer in the swarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Identifier assigned to this peer for logging
    pub id: u32,
    /// IPv4 address of the peer
    pub ip: Ipv4Addr,
    /// Port number for connecting to the peer
    pub port: u16,
}

impl Peer {
    pub fn new(id: u32, ip: Ipv4Addr, port: u16) -> Peer {
        Peer { id, ip, port }
    }

    pub fn addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.id, self.addr())
    }
}

/// Parses a compact peer list into peers, numbered in list order.
///
/// # Arguments
///
/// * `compact` - Binary peer list where each peer is 6 bytes:
///   - Bytes 0-3: IPv4 address
///   - Bytes 4-5: Port number (big-endian)
///
/// # Errors
///
/// Returns `MalformedPeerList` if the length is not a multiple of 6 bytes.
pub fn parse_peers(compact: &[u8]) -> Result<Vec<Peer>> {
    if compact.len() % PEER_SIZE != 0 {
        return Err(Error::MalformedPeerList { len: compact.len() });
    }

    let mut peers: Vec<Peer> = Vec::with_capacity(compact.len() / PEER_SIZE);
    for (i, chunk) in compact.chunks_exact(PEER_SIZE).enumerate() {
        let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
        let port = Cursor::new(&chunk[4..]).read_u16::<BigEndian>()?;
        peers.push(Peer::new(i as u32, ip, port));
    }

    Ok(peers)
}
