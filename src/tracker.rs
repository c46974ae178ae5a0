//! # Tracker Announce
//!
//! Asks the HTTP trackers of a torrent for peers. Every tracker of every tier
//! is queried in parallel, and the compact peer lists they return are merged
//! and deduplicated.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_bencode::de;
use serde_bytes::ByteBuf;
use url::Url;

use crate::hash::InfoHash;
use crate::metainfo::Metainfo;
use crate::peer::{parse_peers, Peer, PeerId};

// Port reported to trackers
pub const PORT: u16 = 6881;

const TRACKER_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Deserialize)]
struct BencodeTracker {
    #[serde(rename = "failure reason", default)]
    failure_reason: Option<String>,
    // Peers in compact form
    #[serde(default)]
    peers: ByteBuf,
}

/// Request peers from every tracker of the torrent.
///
/// # Arguments
///
/// * `metainfo` - The torrent metadata.
/// * `peer_id` - Our own peer identifier.
/// * `port` - Port number reported to the trackers.
///
pub fn request_peers(metainfo: &Metainfo, peer_id: PeerId, port: u16) -> Result<Vec<Peer>> {
    // Flatten all tiers into a unique list of tracker URLs
    let tracker_urls: HashSet<String> = metainfo.tiers.iter().flatten().cloned().collect();
    if tracker_urls.is_empty() {
        return Err(anyhow!("torrent has no announce or announce-list"));
    }

    let all_peers: Arc<Mutex<Vec<Peer>>> = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();

    for tracker_url in tracker_urls {
        let info_hash = metainfo.info_hash;
        let length = metainfo.length;
        let all_peers = Arc::clone(&all_peers);

        handles.push(thread::spawn(move || {
            match announce(&tracker_url, &info_hash, &peer_id, port, length) {
                Ok(mut peers) => {
                    debug!("Tracker {} returned {} peers", tracker_url, peers.len());
                    if let Ok(mut guard) = all_peers.lock() {
                        guard.append(&mut peers);
                    }
                }
                Err(e) => warn!("Tracker {} failed: {:#}", tracker_url, e),
            }
        }));
    }

    for handle in handles {
        let _ = handle.join();
    }

    let all_peers = all_peers
        .lock()
        .map(|guard| guard.clone())
        .map_err(|_| anyhow!("tracker thread panicked"))?;
    if all_peers.is_empty() {
        return Err(anyhow!("could not get peers from any tracker"));
    }

    Ok(dedup_peers(all_peers))
}

/// Announce to one tracker.
fn announce(
    tracker_url: &str,
    info_hash: &InfoHash,
    peer_id: &PeerId,
    port: u16,
    length: u64,
) -> Result<Vec<Peer>> {
    let url = build_tracker_url(tracker_url, info_hash, peer_id, port, length)?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(TRACKER_TIMEOUT_SECS))
        .build()?;
    let response = client.get(&url).send()?.error_for_status()?.bytes()?;

    parse_tracker_response(&response)
}

/// Decode a tracker response into peers.
fn parse_tracker_response(response: &[u8]) -> Result<Vec<Peer>> {
    let tracker: BencodeTracker =
        de::from_bytes(response).context("could not decode tracker response")?;

    if let Some(reason) = tracker.failure_reason {
        return Err(anyhow!("tracker refused announce: {}", reason));
    }

    Ok(parse_peers(&tracker.peers)?)
}

/// Remove duplicate addresses and number the remaining peers in order.
fn dedup_peers(peers: Vec<Peer>) -> Vec<Peer> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Peer> = peers
        .into_iter()
        .filter(|peer| seen.insert(peer.addr()))
        .collect();

    for (i, peer) in unique.iter_mut().enumerate() {
        peer.id = i as u32;
    }

    unique
}

/// Each byte is encoded as %XX where XX is its hexadecimal value.
fn percent_encode_binary(data: &[u8]) -> String {
    data.iter().map(|byte| format!("%{:02X}", byte)).collect()
}

/// Build the announce URL for a tracker.
fn build_tracker_url(
    announce: &str,
    info_hash: &InfoHash,
    peer_id: &PeerId,
    port: u16,
    length: u64,
) -> Result<String> {
    let base_url = Url::parse(announce).context("could not parse tracker url")?;

    // Query string built by hand, binary values must not be re-encoded
    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1&event=started",
        percent_encode_binary(info_hash.as_bytes()),
        percent_encode_binary(peer_id.as_bytes()),
        port,
        length
    );

    let mut url = base_url.to_string();
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(&query);

    Ok(url)
}
