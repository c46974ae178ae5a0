//! # Configuration
//!
//! Tunables of a download run. Defaults are used unless overridden on the
//! command line (see [`crate::args`]).

use std::time::Duration;

pub const CONNECT_TIMEOUT_SECS: u64 = 15;
pub const READ_TIMEOUT_SECS: u64 = 30;
pub const MAX_ATTEMPTS: u32 = 5;
pub const STALL_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Deadline for establishing a TCP connection with a peer
    pub connect_timeout: Duration,
    /// Deadline for every read and write on an established session
    pub read_timeout: Duration,
    /// Failed attempts after which a piece is declared undownloadable
    pub max_attempts: u32,
    /// Longest time without a completed piece before giving up, `None` waits forever
    pub stall_timeout: Option<Duration>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            max_attempts: MAX_ATTEMPTS,
            stall_timeout: Some(Duration::from_secs(STALL_TIMEOUT_SECS)),
        }
    }
}
