//! # Download Worker
//!
//! A worker owns the session with one peer. It pulls pieces from the shared
//! work queue, downloads and verifies them, and reports every attempt back
//! to the orchestrator.
//!
//! ## Attempt Outcomes
//!
//! - **Done**: the piece was downloaded and its hash matches
//! - **Failed**: the attempt hit an I/O, protocol or integrity error
//! - **Unavailable**: the peer announced its pieces and this one is not among them
//!
//! The orchestrator decides what happens to failed and unavailable pieces.
//! The worker retires when the session is unusable: after an I/O error, or
//! when an attempt was abandoned with requests still in flight. A failure
//! that leaves nothing outstanding (a bad hash) keeps the session.
//!
//! A worker whose peer keeps being offered pieces it does not have backs off
//! between hand-backs, then retires.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::client::{Connector, Session};
use crate::error::{Error, Result};
use crate::hash::{check_integrity, InfoHash};
use crate::observer::Observer;
use crate::peer::{Peer, PeerId};
use crate::piece::{download_piece, PieceResult, PieceWork};

/// First pause after handing back a piece already handed back once.
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Repeated hand-backs tolerated before the worker gives up on its peer.
const MAX_IDLE_ROUNDS: u32 = 6;

/// Result of one attempt at a piece.
#[derive(Debug)]
pub enum PieceOutcome {
    Done(PieceResult),
    Failed {
        work: PieceWork,
        peer: Peer,
        error: Error,
    },
    Unavailable(PieceWork),
}

/// Manages downloading from a single peer.
pub struct Worker<C: Connector> {
    /// The remote peer
    peer: Peer,
    /// Our own peer identifier
    peer_id: PeerId,
    /// Hash of the torrent's info dictionary
    info_hash: InfoHash,
    /// Number of pieces in the torrent
    num_pieces: u32,
    connector: Arc<C>,
    observer: Arc<dyn Observer>,
    /// Shared queue of pieces to download
    work_rx: Receiver<PieceWork>,
    /// Shared sink for attempt outcomes
    result_tx: Sender<PieceOutcome>,
}

impl<C: Connector> Worker<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        peer: Peer,
        peer_id: PeerId,
        info_hash: InfoHash,
        num_pieces: u32,
        connector: Arc<C>,
        observer: Arc<dyn Observer>,
        work_rx: Receiver<PieceWork>,
        result_tx: Sender<PieceOutcome>,
    ) -> Worker<C> {
        Worker {
            peer,
            peer_id,
            info_hash,
            num_pieces,
            connector,
            observer,
            work_rx,
            result_tx,
        }
    }

    /// Connect to the peer and download pieces until the work queue closes.
    pub fn start_download(self) {
        let mut session = match self
            .connector
            .connect(&self.peer, self.peer_id, self.info_hash)
        {
            Ok(session) => session,
            Err(error) => {
                self.observer.peer_failed(&self.peer, &error);
                return;
            }
        };

        self.observer.peer_connected(&self.peer);

        let reason = self.download_pieces(&mut session);
        debug!("Worker for peer {} exiting: {}", self.peer, reason);

        self.observer.peer_retired(&self.peer);
    }

    /// Work through the queue and return why the worker stopped.
    fn download_pieces(&self, session: &mut C::Session) -> &'static str {
        let mut handed_back: HashSet<u32> = HashSet::new();
        let mut idle_rounds = 0;

        for work in self.work_rx.iter() {
            let bitfield = session.bitfield();
            if !bitfield.is_empty() && !bitfield.has_piece(work.index) {
                let repeated = !handed_back.insert(work.index);
                if self.result_tx.send(PieceOutcome::Unavailable(work)).is_err() {
                    return "download over";
                }

                if repeated {
                    idle_rounds += 1;
                    if idle_rounds >= MAX_IDLE_ROUNDS {
                        return "peer has none of the remaining pieces";
                    }
                    thread::sleep(IDLE_BACKOFF * (1 << (idle_rounds - 1)));
                }
                continue;
            }

            handed_back.clear();
            idle_rounds = 0;

            let outcome = match try_download_piece(session, &work, self.num_pieces) {
                Ok(data) => {
                    if let Err(error) = session.send_have(work.index) {
                        warn!(
                            "Could not announce piece {} to peer {}: {}",
                            work.index, self.peer, error
                        );
                    }
                    PieceOutcome::Done(PieceResult::new(work.index, data))
                }
                Err(error) => {
                    let retire = error.is_fatal_for_session();
                    let outcome = PieceOutcome::Failed {
                        work,
                        peer: self.peer.clone(),
                        error,
                    };
                    if retire {
                        let _ = self.result_tx.send(outcome);
                        return "session unusable";
                    }
                    outcome
                }
            };

            if self.result_tx.send(outcome).is_err() {
                return "download over";
            }
        }

        "no more work"
    }
}

/// Download a piece and check it against its expected hash.
fn try_download_piece<S: Session>(
    session: &mut S,
    work: &PieceWork,
    num_pieces: u32,
) -> Result<Vec<u8>> {
    let data = download_piece(session, work, num_pieces)?;
    check_integrity(work.index, &work.hash, &data)?;

    debug!("Verified integrity of piece {}", work.index);

    Ok(data)
}
