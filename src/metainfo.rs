//! # Torrent Files
//!
//! Parsing of single-file `.torrent` metainfo files.
//!
//! ## Torrent File Format
//!
//! Torrent files contain metadata in bencoded format:
//!
//! - **announce** / **announce-list**: tracker URLs for peer discovery
//! - **info**: dictionary with file information and piece hashes
//!   - **pieces**: concatenated SHA-1 hashes of every piece
//!   - **piece length**: size of each piece
//!   - **length**: total file size
//!   - **name**: suggested filename
//!
//! The info hash is the SHA-1 of the info dictionary exactly as bencoded, so
//! keys this client ignores still count.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_bencode::value::Value;
use serde_bencode::{de, ser};
use serde_bytes::ByteBuf;

use crate::hash::{InfoHash, PieceHash, Sha1Hash, SHA1_LEN};
use crate::peer::{Peer, PeerId};
use crate::torrent::Torrent;

/// Info dictionary fields used by this client.
#[derive(Deserialize, Serialize)]
struct BencodeInfo {
    // Concatenation of all pieces 20-byte SHA-1 hashes
    pieces: ByteBuf,
    // Size of each piece in bytes
    #[serde(rename = "piece length")]
    piece_length: u32,
    // Size of the file in bytes
    length: u64,
    // Suggested filename where to save the file
    name: String,
}

#[derive(Deserialize)]
struct BencodeTorrent {
    // URL of the tracker
    #[serde(default)]
    announce: String,
    // Tiers of tracker URLs
    #[serde(rename = "announce-list", default)]
    announce_list: Vec<Vec<String>>,
    info: Value,
}

/// Metadata of a single-file torrent.
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// Tracker tiers, each shuffled
    pub tiers: Vec<Vec<String>>,
    pub info_hash: InfoHash,
    pub pieces_hashes: Vec<PieceHash>,
    pub piece_length: u32,
    pub length: u64,
    pub name: String,
}

impl Metainfo {
    /// Read and parse a torrent file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Metainfo> {
        let path = path.as_ref();
        let buf = fs::read(path)
            .with_context(|| format!("could not read torrent file {}", path.display()))?;
        Metainfo::from_bytes(&buf)
    }

    /// Parse bencoded torrent metadata.
    pub fn from_bytes(buf: &[u8]) -> Result<Metainfo> {
        let bencode: BencodeTorrent = de::from_bytes(buf).context("could not decode torrent")?;

        let info_bytes = ser::to_bytes(&bencode.info).context("could not encode info")?;
        let info_hash = Sha1Hash::digest(&info_bytes);
        let info: BencodeInfo =
            de::from_bytes(&info_bytes).context("torrent info is not a single-file info")?;

        let tiers = if !bencode.announce_list.is_empty() {
            // Shuffle each tier as per BEP 12
            let mut tiers = bencode.announce_list;
            let mut rng = rand::thread_rng();
            for tier in &mut tiers {
                tier.shuffle(&mut rng);
            }
            tiers
        } else if !bencode.announce.is_empty() {
            vec![vec![bencode.announce]]
        } else {
            vec![]
        };

        let pieces_hashes = split_pieces_hashes(&info.pieces)?;
        check_layout(pieces_hashes.len(), info.piece_length, info.length)?;

        Ok(Metainfo {
            tiers,
            info_hash,
            pieces_hashes,
            piece_length: info.piece_length,
            length: info.length,
            name: info.name,
        })
    }

    /// Combine the metadata with a swarm into a downloadable torrent.
    pub fn into_torrent(self, peer_id: PeerId, peers: Vec<Peer>) -> Torrent {
        Torrent {
            peer_id,
            info_hash: self.info_hash,
            pieces_hashes: self.pieces_hashes,
            piece_length: self.piece_length,
            length: self.length,
            name: self.name,
            peers,
        }
    }
}

/// Split concatenated pieces hashes.
fn split_pieces_hashes(pieces: &[u8]) -> Result<Vec<PieceHash>> {
    if pieces.len() % SHA1_LEN != 0 {
        return Err(anyhow!(
            "torrent pieces field of {} bytes is not a list of hashes",
            pieces.len()
        ));
    }

    Ok(pieces
        .chunks_exact(SHA1_LEN)
        .filter_map(Sha1Hash::from_slice)
        .collect())
}

/// Check the number of hashes matches the content size.
fn check_layout(num_pieces: usize, piece_length: u32, length: u64) -> Result<()> {
    if piece_length == 0 {
        return Err(anyhow!("torrent piece length cannot be 0"));
    }

    let expected = length.div_ceil(piece_length as u64);
    if num_pieces as u64 != expected {
        return Err(anyhow!(
            "torrent has {} piece hashes, {} expected for {} bytes",
            num_pieces,
            expected,
            length
        ));
    }

    Ok(())
}
