//! # Piece Download
//!
//! Pieces are the verification units of a torrent. They are downloaded in
//! smaller blocks (at most 16 KiB each) which are requested in a pipeline.
//!
//! ## Download State Tracking
//!
//! `PieceProgress` drives one piece against one session and keeps counters for:
//! - bytes requested (the next offset to ask for)
//! - bytes received and copied into the piece buffer
//! - outstanding requests (the backlog)
//!
//! Requests go out in increasing offset order. Blocks may come back in any
//! order since each one carries its own offset.
//!
//! An attempt that fails while requests are still outstanding is reported as
//! `Error::Abandoned`: the session can no longer be trusted to start a new
//! piece.

use crate::client::Session;
use crate::error::{Error, ProtocolError, Result};
use crate::hash::PieceHash;
use crate::message::{parse_have, parse_piece, Message, MessageId};

/// Maximum number of unfulfilled requests kept in flight per peer.
pub const MAX_BACKLOG: usize = 5;

/// Largest block requested in one message (16 KiB).
pub const MAX_BLOCK_SIZE: u32 = 1 << 14;

/// A piece waiting to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceWork {
    /// Zero-based index of this piece in the torrent
    pub index: u32,
    /// Expected hash of the piece data
    pub hash: PieceHash,
    /// Total length of the piece in bytes
    pub length: u32,
}

impl PieceWork {
    pub fn new(index: u32, hash: PieceHash, length: u32) -> PieceWork {
        PieceWork {
            index,
            hash,
            length,
        }
    }
}

/// A downloaded and verified piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceResult {
    /// Zero-based index of this piece in the torrent
    pub index: u32,
    /// Complete piece data
    pub data: Vec<u8>,
}

impl PieceResult {
    pub fn new(index: u32, data: Vec<u8>) -> PieceResult {
        PieceResult { index, data }
    }
}

/// State of one attempt at downloading a piece from one peer.
struct PieceProgress<'a, S: Session> {
    index: u32,
    num_pieces: u32,
    session: &'a mut S,
    buf: Vec<u8>,
    downloaded: usize,
    requested: u32,
    backlog: usize,
}

impl<'a, S: Session> PieceProgress<'a, S> {
    /// Fill the request pipeline, unless the peer is choking us.
    fn request_blocks(&mut self) -> Result<()> {
        if self.session.is_choked() {
            return Ok(());
        }

        let length = self.buf.len() as u32;
        while self.backlog < MAX_BACKLOG && self.requested < length {
            let block_size = MAX_BLOCK_SIZE.min(length - self.requested);

            self.session
                .send_request(self.index, self.requested, block_size)?;

            self.backlog += 1;
            self.requested += block_size;
        }

        Ok(())
    }

    /// Read one message from the peer and update the progress accordingly.
    fn read_message(&mut self) -> Result<()> {
        let message: Message = self.session.read_message()?;

        match message.id {
            MessageId::Unchoke => self.session.set_choked(false),
            MessageId::Choke => {
                self.session.set_choked(true);
                warn!(
                    "Peer {} choked us, waiting for unchoke...",
                    self.session.peer()
                );
            }
            MessageId::Have => {
                let index = parse_have(&message)?;
                if index >= self.num_pieces {
                    return Err(ProtocolError::PieceIndexOutOfRange {
                        index,
                        num_pieces: self.num_pieces,
                    }
                    .into());
                }
                self.session.bitfield_mut().set_piece(index);
            }
            MessageId::Piece => {
                let n = parse_piece(self.index, &mut self.buf, &message)?;
                self.downloaded += n;
                self.backlog = self.backlog.saturating_sub(1);
            }
            _ => {}
        }

        Ok(())
    }

    /// Tag a failure with the requests left unanswered.
    fn abandon(&self, error: Error) -> Error {
        if self.backlog == 0 {
            return error;
        }

        Error::Abandoned {
            index: self.index,
            outstanding: self.backlog,
            source: Box::new(error),
        }
    }
}

/// Download a whole piece from a peer.
///
/// The returned buffer is exactly `work.length` bytes long. Its integrity is
/// not checked here.
///
/// # Arguments
///
/// * `session` - A session connected to a remote peer.
/// * `work` - The piece to download.
/// * `num_pieces` - Number of pieces in the torrent, bounding HAVE indices.
///
pub fn download_piece<S: Session>(
    session: &mut S,
    work: &PieceWork,
    num_pieces: u32,
) -> Result<Vec<u8>> {
    let mut state = PieceProgress {
        index: work.index,
        num_pieces,
        session,
        buf: vec![0; work.length as usize],
        downloaded: 0,
        requested: 0,
        backlog: 0,
    };

    while state.downloaded < state.buf.len() {
        if let Err(error) = state.request_blocks().and_then(|_| state.read_message()) {
            return Err(state.abandon(error));
        }
    }

    debug!(
        "Downloaded piece {} from peer {}",
        work.index,
        state.session.peer()
    );

    Ok(state.buf)
}
