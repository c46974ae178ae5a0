//! # Peer Session
//!
//! This module defines the capability the download engine needs from a peer
//! connection, and implements it over TCP.
//!
//! ## Session Contract
//!
//! - [`Connector::connect`] dials a peer and completes the handshake
//! - [`Session::read_message`] blocks until the next frame arrives
//! - [`Session::send_request`] / [`Session::send_have`] write one message
//! - the choke flag and the availability bitfield are owned by the session and
//!   only changed by the state machine driving it
//!
//! ## Connection Setup
//!
//! 1. TCP connect with a deadline
//! 2. Handshake exchange, the remote info hash must match ours
//! 3. The peer's BITFIELD is read into the availability set
//! 4. UNCHOKE and INTERESTED are sent
//!
//! Every later read and write is bounded by the configured read timeout, so a
//! silent peer surfaces as an I/O error instead of blocking its worker forever.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::bitfield::Bitfield;
use crate::config::DownloadConfig;
use crate::error::{Error, ProtocolError, Result};
use crate::handshake::{read_handshake, Handshake};
use crate::hash::InfoHash;
use crate::message::{format_have, format_request, read_message, Message, MessageId};
use crate::peer::{Peer, PeerId};

/// An established connection with one remote peer.
///
/// A session is owned by exactly one worker.
pub trait Session {
    /// The remote peer.
    fn peer(&self) -> &Peer;

    /// Read the next message, a keep-alive included.
    fn read_message(&mut self) -> Result<Message>;

    /// Ask for a block of a piece.
    fn send_request(&mut self, index: u32, begin: u32, length: u32) -> Result<()>;

    /// Tell the peer we now have a piece.
    fn send_have(&mut self, index: u32) -> Result<()>;

    /// Whether the peer currently refuses our requests.
    fn is_choked(&self) -> bool;

    fn set_choked(&mut self, choked: bool);

    /// Pieces the peer has announced.
    fn bitfield(&self) -> &Bitfield;

    fn bitfield_mut(&mut self) -> &mut Bitfield;
}

/// Opens sessions with peers. Shared by every worker of a download.
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    /// Connect to a peer and complete the handshake.
    ///
    /// # Errors
    ///
    /// Any failure is reported as `Error::Connect` for the peer address.
    fn connect(&self, peer: &Peer, peer_id: PeerId, info_hash: InfoHash)
        -> Result<Self::Session>;
}

/// Opens TCP sessions.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpConnector {
    pub fn new(config: &DownloadConfig) -> Self {
        TcpConnector {
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
        }
    }
}

impl Connector for TcpConnector {
    type Session = Client;

    fn connect(&self, peer: &Peer, peer_id: PeerId, info_hash: InfoHash) -> Result<Client> {
        Client::connect(peer, peer_id, info_hash, self.connect_timeout, self.read_timeout)
            .map_err(|source| Error::Connect {
                addr: peer.addr(),
                source: Box::new(source),
            })
    }
}

/// A TCP session with a remote peer.
pub struct Client {
    /// Information about the remote peer
    peer: Peer,
    /// TCP stream connection to the peer
    conn: TcpStream,
    /// Pieces the peer has announced
    bitfield: Bitfield,
    /// Whether the peer has choked us
    choked: bool,
}

impl Client {
    /// Connects to a peer and prepares the session for downloading.
    ///
    /// # Arguments
    ///
    /// * `peer` - Peer address
    /// * `peer_id` - Our own peer identifier
    /// * `info_hash` - Hash of the torrent's info dictionary
    /// * `connect_timeout` - Deadline for the TCP connection
    /// * `read_timeout` - Deadline for every later read and write
    ///
    pub fn connect(
        peer: &Peer,
        peer_id: PeerId,
        info_hash: InfoHash,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Client> {
        let conn = TcpStream::connect_timeout(&SocketAddr::V4(peer.addr()), connect_timeout)?;
        conn.set_read_timeout(Some(read_timeout))?;
        conn.set_write_timeout(Some(read_timeout))?;

        debug!("Connected to peer {}", peer);

        let mut client = Client {
            peer: peer.clone(),
            conn,
            bitfield: Bitfield::new(),
            choked: true,
        };

        client.handshake_with_peer(peer_id, info_hash)?;
        client.read_bitfield()?;
        client.send_message(&Message::new(MessageId::Unchoke))?;
        client.send_message(&Message::new(MessageId::Interested))?;

        Ok(client)
    }

    /// Exchange handshakes and check the peer serves the same torrent.
    fn handshake_with_peer(&mut self, peer_id: PeerId, info_hash: InfoHash) -> Result<()> {
        let handshake = Handshake::new(info_hash, peer_id);
        self.conn.write_all(&handshake.serialize())?;

        let received = read_handshake(&mut self.conn)?;
        if received.info_hash != info_hash {
            return Err(ProtocolError::InfoHashMismatch.into());
        }

        debug!("Completed handshake with peer {} ({:?})", self.peer, received.peer_id);

        Ok(())
    }

    /// Read the BITFIELD message a peer sends right after the handshake.
    fn read_bitfield(&mut self) -> Result<()> {
        let message = self.read_message()?;
        if message.id != MessageId::Bitfield {
            return Err(ProtocolError::ExpectedBitfield.into());
        }

        self.bitfield = Bitfield::from_bytes(message.payload);

        Ok(())
    }

    fn send_message(&mut self, message: &Message) -> Result<()> {
        debug!("Send {} to peer {}", message, self.peer);
        self.conn.write_all(&message.serialize()?)?;
        Ok(())
    }
}

impl Session for Client {
    fn peer(&self) -> &Peer {
        &self.peer
    }

    fn read_message(&mut self) -> Result<Message> {
        let message = read_message(&mut self.conn)?;
        if message.is_keep_alive() {
            trace!("Receive keep-alive from peer {}", self.peer);
        } else {
            debug!("Receive {} from peer {}", message, self.peer);
        }
        Ok(message)
    }

    fn send_request(&mut self, index: u32, begin: u32, length: u32) -> Result<()> {
        self.send_message(&format_request(index, begin, length))
    }

    fn send_have(&mut self, index: u32) -> Result<()> {
        self.send_message(&format_have(index))
    }

    fn is_choked(&self) -> bool {
        self.choked
    }

    fn set_choked(&mut self, choked: bool) {
        self.choked = choked;
    }

    fn bitfield(&self) -> &Bitfield {
        &self.bitfield
    }

    fn bitfield_mut(&mut self) -> &mut Bitfield {
        &mut self.bitfield
    }
}
