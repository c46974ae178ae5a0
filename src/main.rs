//! # swarmget
//!
//! A command-line client downloading the content of a torrent from its swarm
//! over the peer wire protocol.
//!
//! ## Usage
//!
//! ```bash
//! swarmget <torrent_file>
//! swarmget <torrent_file> -o <output_file>
//! ```
//!
//! ## Architecture
//!
//! - **Main thread**: parses arguments, loads the torrent, collects pieces
//! - **Worker threads**: each one handles communication with one peer
//! - **Channels**: coordinate piece work distribution and result collection

#[macro_use]
extern crate log;

mod args;
mod bitfield;
mod client;
mod config;
mod error;
mod handshake;
mod hash;
mod message;
mod metainfo;
#[cfg(test)]
mod mock;
mod observer;
mod peer;
mod piece;
mod torrent;
mod tracker;
mod worker;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use args::Args;
use client::TcpConnector;
use metainfo::Metainfo;
use observer::{LogObserver, Observer, ProgressObserver};
use peer::PeerId;

/// Sanitize a filename to prevent path traversal and basic issues.
fn sanitize_filename(filename: &str) -> String {
    let safe_name = filename.replace(['/', '\\'], "_");

    if safe_name.trim().is_empty() || safe_name == "." || safe_name == ".." {
        "download".to_string()
    } else {
        safe_name
    }
}

/// Ask before overwriting an existing file.
fn confirm_overwrite(path: &Path) -> Result<bool> {
    println!("Output file '{}' already exists.", path.display());
    print!("Do you want to overwrite it? (y/N): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_lowercase();

    Ok(input == "y" || input == "yes")
}

fn run(args: Args) -> Result<()> {
    if !args.torrent.exists() {
        return Err(anyhow!(
            "could not find torrent file: {}",
            args.torrent.display()
        ));
    }

    let metainfo = Metainfo::open(&args.torrent)?;

    let output_filepath = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(sanitize_filename(&metainfo.name)));

    if output_filepath.exists() && !confirm_overwrite(&output_filepath)? {
        println!("Download cancelled.");
        return Ok(());
    }

    // Fail early when the output cannot be written
    let mut output_file = File::create(&output_filepath).with_context(|| {
        format!(
            "could not create output file '{}'",
            output_filepath.display()
        )
    })?;

    let peer_id = PeerId::generate();
    let peers = tracker::request_peers(&metainfo, peer_id, tracker::PORT)?;
    info!("Found {} peers", peers.len());

    let config = args.download_config();
    let observer: Arc<dyn Observer> = if args.quiet {
        Arc::new(LogObserver::new())
    } else {
        Arc::new(ProgressObserver::new())
    };

    let torrent = metainfo.into_torrent(peer_id, peers);
    let data = torrent.download(Arc::new(TcpConnector::new(&config)), &config, observer)?;

    output_file.write_all(&data).with_context(|| {
        format!(
            "could not write data to file '{}'",
            output_filepath.display()
        )
    })?;

    println!("Saved in \"{}\".", output_filepath.display());

    Ok(())
}

fn main() {
    pretty_env_logger::init_timed();

    let args = Args::parse();

    if let Err(error) = run(args) {
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}
