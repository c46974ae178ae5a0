//! # Piece Availability
//!
//! Compact record of the pieces a remote peer has announced, filled from its
//! BITFIELD message and updated by HAVE messages.
//!
//! ```text
//! Byte 0: [piece 0, 1, 2, 3, 4, 5, 6, 7]   (MSB first)
//! Byte 1: [piece 8, 9, 10, 11, 12, 13, 14, 15]
//! ...
//! ```

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Bitfield(Vec<u8>);

impl Bitfield {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Bitfield(bytes)
    }

    /// Returns `true` if no piece has been announced.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }

    /// Checks if the peer has a piece. Out of range indices are absent.
    pub fn has_piece(&self, index: u32) -> bool {
        let byte_index = (index / 8) as usize;
        let offset = index % 8;

        match self.0.get(byte_index) {
            Some(byte) => byte >> (7 - offset) & 1 != 0,
            None => false,
        }
    }

    /// Marks a piece as available, growing the bitfield if needed.
    ///
    /// Callers keep `index` below the torrent's piece count.
    pub fn set_piece(&mut self, index: u32) {
        let byte_index = (index / 8) as usize;
        let offset = index % 8;

        if byte_index >= self.0.len() {
            self.0.resize(byte_index + 1, 0);
        }

        self.0[byte_index] |= 1 << (7 - offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_read_msb_first() {
        let bitfield = Bitfield::from_bytes(vec![0b1000_0001, 0b0100_0000]);
        assert!(bitfield.has_piece(0));
        assert!(!bitfield.has_piece(1));
        assert!(bitfield.has_piece(7));
        assert!(bitfield.has_piece(9));
        assert!(!bitfield.has_piece(16));
    }

    #[test]
    fn set_piece_grows_the_bitfield() {
        let mut bitfield = Bitfield::new();
        assert!(bitfield.is_empty());

        bitfield.set_piece(20);
        assert!(bitfield.has_piece(20));
        assert!(!bitfield.has_piece(19));
        assert!(!bitfield.is_empty());
        assert_eq!(bitfield, Bitfield::from_bytes(vec![0, 0, 0b0000_1000]));
    }
}
