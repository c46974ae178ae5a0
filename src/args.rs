//! # Command-Line Arguments
//!
//! ```bash
//! swarmget debian.iso.torrent
//! swarmget debian.iso.torrent -o debian.iso --max-attempts 10
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{
    DownloadConfig, CONNECT_TIMEOUT_SECS, MAX_ATTEMPTS, READ_TIMEOUT_SECS, STALL_TIMEOUT_SECS,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Download the content of a torrent from its swarm."
)]
pub struct Args {
    /// Path to the .torrent file
    pub torrent: PathBuf,

    /// Output filename (defaults to name from torrent)
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Seconds to wait for a peer to accept a connection
    #[arg(long, default_value_t = CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,

    /// Seconds to wait on a silent peer before dropping it
    #[arg(long, default_value_t = READ_TIMEOUT_SECS)]
    pub read_timeout: u64,

    /// Failed attempts after which a piece is given up
    #[arg(long, default_value_t = MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// Seconds without progress before giving up (0 waits forever)
    #[arg(long, default_value_t = STALL_TIMEOUT_SECS)]
    pub stall_timeout: u64,

    /// Log progress instead of drawing a progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            read_timeout: Duration::from_secs(self.read_timeout),
            max_attempts: self.max_attempts,
            stall_timeout: match self.stall_timeout {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}
