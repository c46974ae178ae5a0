//! # Download Coordination
//!
//! A `Torrent` holds everything needed to download the content of a torrent:
//! the info hash, the piece hashes and layout, and the peers to download from.
//!
//! ## Download Process
//!
//! 1. **Split the content** into pieces and queue one work unit per piece
//! 2. **Start one worker thread** per peer, all sharing the work queue
//! 3. **Collect outcomes**: verified pieces are copied into the output buffer,
//!    failed pieces are queued again until their retry budget is spent
//! 4. **Return the buffer** once every piece has been written
//!
//! ## Threading
//!
//! - **Calling thread**: seeds the queue, owns and writes the output buffer
//! - **Worker threads**: one per peer, each owning its own session
//! - **Channels**: crossbeam channels for work distribution and result collection

use std::ops::Range;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::client::Connector;
use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::hash::{InfoHash, PieceHash};
use crate::observer::Observer;
use crate::peer::{Peer, PeerId};
use crate::piece::PieceWork;
use crate::worker::{PieceOutcome, Worker};

/// Content layout and swarm of a torrent.
#[derive(Debug, Clone)]
pub struct Torrent {
    /// Our own peer identifier
    pub peer_id: PeerId,
    /// Hash of the bencoded info dictionary
    pub info_hash: InfoHash,
    /// Expected hash of every piece, by index
    pub pieces_hashes: Vec<PieceHash>,
    /// Size of each piece in bytes (except possibly the last)
    pub piece_length: u32,
    /// Total size of the content in bytes
    pub length: u64,
    /// Suggested filename
    pub name: String,
    /// Peers to download from
    pub peers: Vec<Peer>,
}

impl Torrent {
    pub fn num_pieces(&self) -> usize {
        self.pieces_hashes.len()
    }

    /// Byte range covered by a piece within the content.
    pub fn piece_bounds(&self, index: u32) -> Range<usize> {
        let begin = index as u64 * self.piece_length as u64;
        let end = (begin + self.piece_length as u64).min(self.length);
        begin as usize..end as usize
    }

    pub fn piece_size(&self, index: u32) -> u32 {
        self.piece_bounds(index).len() as u32
    }

    /// Build the work unit of every piece.
    fn pieces_work(&self) -> Vec<PieceWork> {
        self.pieces_hashes
            .iter()
            .enumerate()
            .map(|(index, hash)| {
                PieceWork::new(index as u32, *hash, self.piece_size(index as u32))
            })
            .collect()
    }

    /// Download the whole content from the torrent's peers.
    ///
    /// # Arguments
    ///
    /// * `connector` - Opens a session with each peer.
    /// * `config` - Retry budget and stall deadline.
    /// * `observer` - Receives progress events.
    ///
    /// # Errors
    ///
    /// - `PieceFailed` when a piece failed `max_attempts` times
    /// - `NoPeers` when every worker is gone with pieces still missing
    /// - `Stalled` when no piece completed within the stall timeout
    pub fn download<C: Connector>(
        &self,
        connector: Arc<C>,
        config: &DownloadConfig,
        observer: Arc<dyn Observer>,
    ) -> Result<Vec<u8>> {
        let works = self.pieces_work();
        observer.download_started(&self.name, self.num_pieces(), self.length);

        let (work_tx, work_rx): (Sender<PieceWork>, Receiver<PieceWork>) = unbounded();
        let (result_tx, result_rx): (Sender<PieceOutcome>, Receiver<PieceOutcome>) = bounded(0);

        for work in &works {
            // Cannot fail, the receiving side is still held here
            let _ = work_tx.send(work.clone());
        }

        for peer in &self.peers {
            let worker = Worker::new(
                peer.clone(),
                self.peer_id,
                self.info_hash,
                works.len() as u32,
                connector.clone(),
                observer.clone(),
                work_rx.clone(),
                result_tx.clone(),
            );
            thread::spawn(move || worker.start_download());
        }

        // Only workers may keep the channels alive
        drop(work_rx);
        drop(result_tx);

        let mut data: Vec<u8> = vec![0; self.length as usize];
        let mut received = vec![false; works.len()];
        let mut attempts = vec![0u32; works.len()];
        let mut completed = 0;
        let mut last_progress = Instant::now();

        while completed < works.len() {
            let remaining = works.len() - completed;
            let outcome = match config.stall_timeout {
                Some(timeout) => {
                    let deadline = timeout.saturating_sub(last_progress.elapsed());
                    match result_rx.recv_timeout(deadline) {
                        Ok(outcome) => outcome,
                        Err(RecvTimeoutError::Timeout) => return Err(Error::Stalled { remaining }),
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(Error::NoPeers { remaining })
                        }
                    }
                }
                None => result_rx
                    .recv()
                    .map_err(|_| Error::NoPeers { remaining })?,
            };

            let work = match outcome {
                PieceOutcome::Done(result) => {
                    let index = result.index as usize;
                    let bounds = self.piece_bounds(result.index);
                    if received[index] || result.data.len() != bounds.len() {
                        continue;
                    }

                    data[bounds].copy_from_slice(&result.data);
                    received[index] = true;
                    completed += 1;
                    last_progress = Instant::now();

                    observer.piece_completed(
                        result.index,
                        result.data.len(),
                        completed,
                        works.len(),
                    );
                    continue;
                }
                PieceOutcome::Failed { work, peer, error } => {
                    let index = work.index as usize;
                    attempts[index] += 1;
                    observer.piece_failed(work.index, &peer, &error, attempts[index]);

                    if attempts[index] >= config.max_attempts {
                        return Err(Error::PieceFailed {
                            index: work.index,
                            attempts: attempts[index],
                        });
                    }
                    work
                }
                PieceOutcome::Unavailable(work) => work,
            };

            if work_tx.send(work).is_err() {
                return Err(Error::NoPeers { remaining });
            }
        }

        // Closing the queue lets idle workers exit
        drop(work_tx);
        observer.download_finished();

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitfield::Bitfield;
    use crate::client::TcpConnector;
    use crate::handshake::{read_handshake, Handshake};
    use crate::hash::Sha1Hash;
    use crate::message::{read_message, Message, MessageId};
    use crate::mock::{Behavior, MockConnector, Step};
    use crate::observer::LogObserver;
    use crate::piece::MAX_BLOCK_SIZE;
    use byteorder::{BigEndian, ReadBytesExt};
    use std::io::{Cursor, Write};
    use std::net::{Ipv4Addr, TcpListener};
    use std::time::Duration;

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    fn torrent_for(content: &[u8], piece_length: u32, peers: usize) -> Torrent {
        Torrent {
            peer_id: PeerId([1; 20]),
            info_hash: Sha1Hash([2; 20]),
            pieces_hashes: content
                .chunks(piece_length as usize)
                .map(Sha1Hash::digest)
                .collect(),
            piece_length,
            length: content.len() as u64,
            name: "content.bin".to_string(),
            peers: (0..peers)
                .map(|i| Peer::new(i as u32, Ipv4Addr::LOCALHOST, 6881 + i as u16))
                .collect(),
        }
    }

    fn config() -> DownloadConfig {
        DownloadConfig {
            stall_timeout: Some(Duration::from_secs(10)),
            ..Default::default()
        }
    }

    #[test]
    fn piece_bounds_cover_the_content_exactly() {
        let torrent = torrent_for(&content(10_000), 3000, 0);
        assert_eq!(torrent.num_pieces(), 4);

        let mut covered = 0;
        for index in 0..torrent.num_pieces() as u32 {
            let bounds = torrent.piece_bounds(index);
            assert_eq!(bounds.start, covered);
            assert!(bounds.start < bounds.end);
            assert!(bounds.end as u64 <= torrent.length);
            covered = bounds.end;
        }
        assert_eq!(covered, 10_000);
        assert_eq!(torrent.piece_size(3), 1000);
        assert_eq!(torrent.piece_size(0), 3000);
    }

    #[test]
    fn downloads_from_several_peers() {
        let content = content(10 * 1000 + 123);
        let torrent = torrent_for(&content, 1000, 3);
        let connector = MockConnector::new(content.clone(), 1000);

        let data = torrent
            .download(Arc::new(connector), &config(), Arc::new(LogObserver::new()))
            .unwrap();
        assert_eq!(data, content);
    }

    #[test]
    fn failed_pieces_are_retried_by_other_peers() {
        let content = content(6 * 1000);
        let torrent = torrent_for(&content, 1000, 2);
        let connector = MockConnector::new(content.clone(), 1000).with_behavior(
            0,
            Behavior {
                corrupt: (0..6).collect(),
                ..Default::default()
            },
        );
        let config = DownloadConfig {
            max_attempts: 100,
            ..config()
        };

        let data = torrent
            .download(Arc::new(connector), &config, Arc::new(LogObserver::new()))
            .unwrap();
        assert_eq!(data, content);
    }

    #[test]
    fn dead_peers_end_the_download() {
        let content = content(3 * 1000);
        let torrent = torrent_for(&content, 1000, 2);
        let connector = MockConnector::new(content, 1000)
            .with_behavior(
                0,
                Behavior {
                    refuse: true,
                    ..Default::default()
                },
            )
            .with_behavior(
                1,
                Behavior {
                    script: vec![Step::Fail],
                    ..Default::default()
                },
            );

        let result = torrent.download(
            Arc::new(connector),
            &config(),
            Arc::new(LogObserver::new()),
        );
        assert!(matches!(result, Err(Error::NoPeers { remaining: 3 })));
    }

    #[test]
    fn piece_is_abandoned_after_max_attempts() {
        let content = content(2 * 1000);
        let torrent = torrent_for(&content, 1000, 1);
        let connector = MockConnector::new(content, 1000).with_behavior(
            0,
            Behavior {
                corrupt: vec![1],
                ..Default::default()
            },
        );
        let config = DownloadConfig {
            max_attempts: 3,
            ..config()
        };

        let result =
            torrent.download(Arc::new(connector), &config, Arc::new(LogObserver::new()));
        assert!(matches!(
            result,
            Err(Error::PieceFailed {
                index: 1,
                attempts: 3
            })
        ));
    }

    #[test]
    fn stalled_download_times_out() {
        let content = content(1000);
        let torrent = torrent_for(&content, 1000, 1);
        let connector = MockConnector::new(content, 1000).with_behavior(
            0,
            Behavior {
                script: vec![Step::Hang(Duration::from_secs(2))],
                ..Default::default()
            },
        );
        let config = DownloadConfig {
            stall_timeout: Some(Duration::from_millis(200)),
            ..Default::default()
        };

        let result =
            torrent.download(Arc::new(connector), &config, Arc::new(LogObserver::new()));
        assert!(matches!(result, Err(Error::Stalled { remaining: 1 })));
    }

    #[test]
    fn stray_block_does_not_poison_later_pieces() {
        let content = content(3 * 1000);
        let torrent = torrent_for(&content, 1000, 2);
        let stray_block = Message::new_with_payload(
            MessageId::Piece,
            vec![0, 0, 0, 9, 0, 0, 0, 0, 0xaa, 0xbb],
        );
        let connector = MockConnector::new(content.clone(), 1000).with_behavior(
            0,
            Behavior {
                script: vec![
                    Step::Deliver(Message::new(MessageId::Unchoke)),
                    Step::Deliver(stray_block),
                ],
                ..Default::default()
            },
        );

        let data = torrent
            .download(Arc::new(connector), &config(), Arc::new(LogObserver::new()))
            .unwrap();
        assert_eq!(data, content);
    }

    #[test]
    fn piece_no_peer_has_ends_the_download() {
        let content = content(2 * 1000);
        let torrent = torrent_for(&content, 1000, 1);
        let mut bitfield = Bitfield::new();
        bitfield.set_piece(0);
        let connector = MockConnector::new(content, 1000).with_behavior(
            0,
            Behavior {
                bitfield,
                ..Default::default()
            },
        );
        let config = DownloadConfig {
            stall_timeout: None,
            ..Default::default()
        };

        let started = Instant::now();
        let result =
            torrent.download(Arc::new(connector), &config, Arc::new(LogObserver::new()));
        assert!(matches!(result, Err(Error::NoPeers { remaining: 1 })));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn empty_torrent_needs_no_peers() {
        let torrent = torrent_for(&[], 1000, 0);
        let data = torrent
            .download(
                Arc::new(MockConnector::new(vec![], 1000)),
                &config(),
                Arc::new(LogObserver::new()),
            )
            .unwrap();
        assert!(data.is_empty());
    }

    /// Serve `content` to one leecher over a real socket.
    fn seed(listener: TcpListener, content: Vec<u8>, piece_length: u32, num_pieces: usize) {
        let (mut conn, _) = listener.accept().unwrap();
        let handshake = read_handshake(&mut conn).unwrap();
        let reply = Handshake::new(handshake.info_hash, PeerId([9; 20]));
        conn.write_all(&reply.serialize()).unwrap();

        let bitfield = vec![0xffu8; (num_pieces + 7) / 8];
        conn.write_all(
            &Message::new_with_payload(MessageId::Bitfield, bitfield)
                .serialize()
                .unwrap(),
        )
        .unwrap();
        let unchoke = Message::new(MessageId::Unchoke).serialize().unwrap();
        conn.write_all(&unchoke).unwrap();

        // Exits once the leecher hangs up
        while let Ok(message) = read_message(&mut conn) {
            if message.id != MessageId::Request {
                continue;
            }
            let mut payload = Cursor::new(&message.payload);
            let index = payload.read_u32::<BigEndian>().unwrap();
            let begin = payload.read_u32::<BigEndian>().unwrap();
            let length = payload.read_u32::<BigEndian>().unwrap();
            assert!(length <= MAX_BLOCK_SIZE);

            let start = (index * piece_length + begin) as usize;
            let mut block = index.to_be_bytes().to_vec();
            block.extend_from_slice(&begin.to_be_bytes());
            block.extend_from_slice(&content[start..start + length as usize]);
            conn.write_all(
                &Message::new_with_payload(MessageId::Piece, block)
                    .serialize()
                    .unwrap(),
            )
            .unwrap();
        }
    }

    #[test]
    fn downloads_two_pieces_over_tcp() {
        let content = content(32768);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut torrent = torrent_for(&content, 16384, 0);
        torrent.peers = vec![Peer::new(0, Ipv4Addr::LOCALHOST, port)];

        let served = content.clone();
        let seeder = thread::spawn(move || seed(listener, served, 16384, 2));

        let config = config();
        let data = torrent
            .download(
                Arc::new(TcpConnector::new(&config)),
                &config,
                Arc::new(LogObserver::new()),
            )
            .unwrap();

        assert_eq!(data.len(), 32768);
        assert_eq!(Sha1Hash::digest(&data[..16384]), torrent.pieces_hashes[0]);
        assert_eq!(Sha1Hash::digest(&data[16384..]), torrent.pieces_hashes[1]);
        assert_eq!(data, content);

        seeder.join().unwrap();
    }
}
