//! # Errors
//!
//! Error types shared by the codecs, the peer session and the download engine.
//!
//! Codec and session failures are surfaced to their immediate caller. The
//! worker turns them into a failed attempt for the piece it was working on,
//! and the orchestrator decides whether the piece is retried.

use std::io;
use std::net::SocketAddrV4;

use thiserror::Error;

use crate::message::MessageId;

/// Violations of the peer wire protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("handshake protocol name length cannot be 0")]
    ZeroLengthProtocol,

    #[error("expected message {expected}, got {actual}")]
    WrongMessageId {
        expected: MessageId,
        actual: MessageId,
    },

    #[error("message of {len} bytes exceeds the {max} bytes limit")]
    MessageTooLong { len: usize, max: usize },

    #[error("payload too short: expected at least {expected} bytes, got {actual}")]
    PayloadTooShort { expected: usize, actual: usize },

    #[error("expected piece index {expected}, got {actual}")]
    PieceIndexMismatch { expected: u32, actual: u32 },

    #[error("piece index {index} is outside the torrent's {num_pieces} pieces")]
    PieceIndexOutOfRange { index: u32, num_pieces: u32 },

    #[error("block [{begin}:{begin}+{len}] overflows piece buffer of {capacity} bytes")]
    BlockOutOfBounds {
        begin: usize,
        len: usize,
        capacity: usize,
    },

    #[error("peer answered the handshake with a different info hash")]
    InfoHashMismatch,

    #[error("peer did not send a bitfield after the handshake")]
    ExpectedBitfield,
}

/// Errors raised while talking to peers and assembling the download.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("piece {index} failed integrity check")]
    Integrity { index: u32 },

    #[error("malformed compact peer list of {len} bytes")]
    MalformedPeerList { len: usize },

    #[error("could not connect to peer {addr}: {source}")]
    Connect {
        addr: SocketAddrV4,
        #[source]
        source: Box<Error>,
    },

    #[error("piece {index} abandoned with {outstanding} requests in flight: {source}")]
    Abandoned {
        index: u32,
        outstanding: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("piece {index} could not be downloaded after {attempts} attempts")]
    PieceFailed { index: u32, attempts: u32 },

    #[error("download stalled with {remaining} pieces remaining")]
    Stalled { remaining: usize },

    #[error("no peers left to download the {remaining} remaining pieces")]
    NoPeers { remaining: usize },
}

impl Error {
    /// Returns `true` when the error leaves the peer connection unusable.
    ///
    /// An attempt abandoned with requests in flight counts as fatal: the
    /// replies to those requests would reach whatever piece comes next.
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Connect { .. } | Error::Abandoned { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
