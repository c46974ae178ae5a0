//! # Download Observers
//!
//! The orchestrator and its workers report what happens through an
//! [`Observer`], leaving presentation to the caller.

use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::Error;
use crate::peer::Peer;

/// Receives download events. Called concurrently from every worker thread.
pub trait Observer: Send + Sync {
    fn download_started(&self, _name: &str, _pieces: usize, _length: u64) {}

    fn peer_connected(&self, _peer: &Peer) {}

    fn peer_failed(&self, _peer: &Peer, _error: &Error) {}

    /// A connected peer's worker exited.
    fn peer_retired(&self, _peer: &Peer) {}

    /// A verified piece was written to the output buffer.
    fn piece_completed(&self, _index: u32, _length: usize, _completed: usize, _total: usize) {}

    /// An attempt failed and the piece went back to the work queue.
    fn piece_failed(&self, _index: u32, _peer: &Peer, _error: &Error, _attempts: u32) {}

    fn download_finished(&self) {}
}

/// Reports events through the `log` facade.
#[derive(Debug, Default)]
pub struct LogObserver {
    /// Workers currently connected
    peers: AtomicUsize,
}

impl LogObserver {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn live_peers(&self) -> usize {
        self.peers.load(Ordering::Relaxed)
    }
}

impl Observer for LogObserver {
    fn download_started(&self, name: &str, pieces: usize, length: u64) {
        info!("Downloading {:?} ({} pieces, {} bytes)", name, pieces, length);
    }

    fn peer_connected(&self, peer: &Peer) {
        self.peers.fetch_add(1, Ordering::Relaxed);
        info!("Connected to peer {}", peer);
    }

    fn peer_failed(&self, peer: &Peer, error: &Error) {
        debug!("Dropping peer {}: {}", peer, error);
    }

    fn peer_retired(&self, peer: &Peer) {
        self.peers.fetch_sub(1, Ordering::Relaxed);
        debug!("Disconnected from peer {}", peer);
    }

    fn piece_completed(&self, index: u32, _length: usize, completed: usize, total: usize) {
        let percent = completed as f64 / total as f64 * 100.0;
        info!(
            "({:.2}%) Downloaded piece #{} from {} peers",
            percent,
            index,
            self.live_peers()
        );
    }

    fn piece_failed(&self, index: u32, peer: &Peer, error: &Error, attempts: u32) {
        warn!(
            "Attempt {} at piece {} from peer {} failed: {}",
            attempts, index, peer, error
        );
    }

    fn download_finished(&self) {
        info!("Download complete");
    }
}

/// Draws a byte-based progress bar on the terminal.
pub struct ProgressObserver {
    pb: ProgressBar,
}

impl ProgressObserver {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} {bytes}/{total_bytes} [{bar:40.cyan/blue}] {percent}%")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        ProgressObserver { pb }
    }
}

impl Observer for ProgressObserver {
    fn download_started(&self, name: &str, pieces: usize, length: u64) {
        self.pb
            .println(format!("Downloading {:?} ({} pieces)", name, pieces));
        self.pb.set_length(length);
    }

    fn peer_connected(&self, peer: &Peer) {
        debug!("Connected to peer {}", peer);
    }

    fn peer_failed(&self, peer: &Peer, error: &Error) {
        debug!("Dropping peer {}: {}", peer, error);
    }

    fn piece_completed(&self, _index: u32, length: usize, _completed: usize, _total: usize) {
        self.pb.inc(length as u64);
    }

    fn piece_failed(&self, index: u32, peer: &Peer, error: &Error, attempts: u32) {
        debug!(
            "Attempt {} at piece {} from peer {} failed: {}",
            attempts, index, peer, error
        );
    }

    fn download_finished(&self) {
        self.pb.finish();
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}
