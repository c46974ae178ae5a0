//! # Peer Wire Messages
//!
//! This module defines the message types and serialization for the peer wire
//! protocol. Once the handshake is done, all communication between peers uses
//! these messages.
//!
//! ## Message Structure
//!
//! ```text
//! <length prefix><message ID><payload>
//! ```
//!
//! - **Length Prefix**: 4 bytes (big-endian u32) - length of message ID + payload
//! - **Message ID**: 1 byte - identifies the message type
//! - **Payload**: variable length - message-specific data
//!
//! ## Message Types
//!
//! | ID | Name | Payload |
//! |----|------|---------|
//! | 0 | CHOKE | none |
//! | 1 | UNCHOKE | none |
//! | 2 | INTERESTED | none |
//! | 3 | NOT INTERESTED | none |
//! | 4 | HAVE | piece index |
//! | 5 | BITFIELD | bitfield |
//! | 6 | REQUEST | index, begin, length |
//! | 7 | PIECE | index, begin, block |
//! | 8 | CANCEL | index, begin, length |
//!
//! A length prefix of 0 is a keep-alive: no ID and no payload.

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{ProtocolError, Result};

/// Largest frame accepted from a peer (a 16 KiB block plus headers fits easily,
/// as does the bitfield of a torrent with several million pieces).
pub const MAX_MESSAGE_LEN: usize = 1 << 20;

/// Size of the `index` + `begin` header of a PIECE payload.
const PIECE_HEADER_LEN: usize = 8;

/// Message type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    /// Zero-length frame, never carries an id on the wire.
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have,
    Bitfield,
    Request,
    Piece,
    Cancel,
    /// Any id this client does not understand.
    Unknown(u8),
}

impl MessageId {
    /// Wire value of the id, `None` for a keep-alive.
    pub fn to_wire(self) -> Option<u8> {
        match self {
            MessageId::KeepAlive => None,
            MessageId::Choke => Some(0),
            MessageId::Unchoke => Some(1),
            MessageId::Interested => Some(2),
            MessageId::NotInterested => Some(3),
            MessageId::Have => Some(4),
            MessageId::Bitfield => Some(5),
            MessageId::Request => Some(6),
            MessageId::Piece => Some(7),
            MessageId::Cancel => Some(8),
            MessageId::Unknown(id) => Some(id),
        }
    }
}

impl From<u8> for MessageId {
    fn from(id: u8) -> Self {
        match id {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            id => MessageId::Unknown(id),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Unknown(id) => write!(f, "Unknown({})", id),
            id => fmt::Debug::fmt(id, f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type identifier
    pub id: MessageId,
    /// Message payload data
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a new message without payload.
    ///
    /// # Arguments
    ///
    /// * `id` - The type of the message.
    ///
    pub fn new(id: MessageId) -> Self {
        Message {
            id,
            payload: vec![],
        }
    }

    /// Build a new message with a payload.
    ///
    /// # Arguments
    ///
    /// * `id` - The type of the message.
    /// * `payload` - The content of the message.
    ///
    pub fn new_with_payload(id: MessageId, payload: Vec<u8>) -> Self {
        Message { id, payload }
    }

    /// Build a keep-alive message.
    pub fn keep_alive() -> Self {
        Message::new(MessageId::KeepAlive)
    }

    pub fn is_keep_alive(&self) -> bool {
        self.id == MessageId::KeepAlive
    }

    /// Serialize message.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let id = match self.id.to_wire() {
            Some(id) => id,
            None => return Ok(vec![0; 4]),
        };

        let mut serialized: Vec<u8> = Vec::with_capacity(5 + self.payload.len());
        serialized.write_u32::<BigEndian>(1 + self.payload.len() as u32)?;
        serialized.push(id);
        serialized.extend_from_slice(&self.payload);

        Ok(serialized)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.payload.len())
    }
}

/// Read one message from a byte stream.
///
/// A zero length prefix yields a keep-alive message. A short read at any
/// stage fails with an I/O error.
///
/// # Arguments
///
/// * `reader` - The stream to read from.
///
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message> {
    let message_len = reader.read_u32::<BigEndian>()? as usize;

    // Length 0 is a keep-alive
    if message_len == 0 {
        return Ok(Message::keep_alive());
    }

    if message_len > MAX_MESSAGE_LEN {
        return Err(ProtocolError::MessageTooLong {
            len: message_len,
            max: MAX_MESSAGE_LEN,
        }
        .into());
    }

    let id = MessageId::from(reader.read_u8()?);

    let mut payload: Vec<u8> = vec![0; message_len - 1];
    reader.read_exact(&mut payload)?;

    Ok(Message::new_with_payload(id, payload))
}

/// Build a REQUEST message for a block of a piece.
///
/// ```text
/// <len=0013><id=6><index: u32><begin: u32><length: u32>
/// ```
pub fn format_request(index: u32, begin: u32, length: u32) -> Message {
    let mut payload: Vec<u8> = Vec::with_capacity(12);
    payload.extend_from_slice(&index.to_be_bytes());
    payload.extend_from_slice(&begin.to_be_bytes());
    payload.extend_from_slice(&length.to_be_bytes());

    Message::new_with_payload(MessageId::Request, payload)
}

/// Build a HAVE message announcing a piece.
///
/// ```text
/// <len=0005><id=4><piece index: u32>
/// ```
pub fn format_have(index: u32) -> Message {
    Message::new_with_payload(MessageId::Have, index.to_be_bytes().to_vec())
}

/// Copy the block carried by a PIECE message into a piece buffer.
///
/// ```text
/// <len><id=7><index: u32><begin: u32><block: [u8]>
/// ```
///
/// # Arguments
///
/// * `index` - The piece index the block must belong to.
/// * `buf` - The piece buffer, written at the block offset.
/// * `message` - The received message.
///
/// # Returns
///
/// The number of bytes copied into `buf`.
pub fn parse_piece(index: u32, buf: &mut [u8], message: &Message) -> Result<usize> {
    if message.id != MessageId::Piece {
        return Err(ProtocolError::WrongMessageId {
            expected: MessageId::Piece,
            actual: message.id,
        }
        .into());
    }

    if message.payload.len() < PIECE_HEADER_LEN {
        return Err(ProtocolError::PayloadTooShort {
            expected: PIECE_HEADER_LEN,
            actual: message.payload.len(),
        }
        .into());
    }

    let mut cursor = Cursor::new(&message.payload[..PIECE_HEADER_LEN]);
    let piece_index = cursor.read_u32::<BigEndian>()?;
    if piece_index != index {
        return Err(ProtocolError::PieceIndexMismatch {
            expected: index,
            actual: piece_index,
        }
        .into());
    }

    let begin = cursor.read_u32::<BigEndian>()? as usize;
    let block = &message.payload[PIECE_HEADER_LEN..];

    // Reject blocks that would not fit in the piece
    if begin > buf.len() || block.len() > buf.len() - begin {
        return Err(ProtocolError::BlockOutOfBounds {
            begin,
            len: block.len(),
            capacity: buf.len(),
        }
        .into());
    }

    buf[begin..begin + block.len()].copy_from_slice(block);

    Ok(block.len())
}

/// Decode the piece index announced by a HAVE message.
pub fn parse_have(message: &Message) -> Result<u32> {
    if message.id != MessageId::Have {
        return Err(ProtocolError::WrongMessageId {
            expected: MessageId::Have,
            actual: message.id,
        }
        .into());
    }

    if message.payload.len() < 4 {
        return Err(ProtocolError::PayloadTooShort {
            expected: 4,
            actual: message.payload.len(),
        }
        .into());
    }

    let mut cursor = Cursor::new(&message.payload[..4]);
    Ok(cursor.read_u32::<BigEndian>()?)
}
