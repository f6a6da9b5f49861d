//! REACT: decentralized airtime fairness for contention-based wireless links.
//!
//! Each station runs the same loop. Its responsibilities are to:
//! 1. broadcast its fairness state (claim, offer) to neighbors and collect theirs
//! 2. run progressive filling over the neighbor table to find its own fair share
//! 3. read MAC counters and retune the contention window to hit that share

extern crate crossbeam;
extern crate failure;
extern crate minion;
extern crate slog;

use failure::Fail;
use slog::Drain;

pub mod controller;
pub mod datapath;
pub mod neighbors;
pub mod phy;
pub mod readers;
pub mod runtime;
pub mod serialize;
pub mod solver;
pub mod udp;

pub use self::runtime::{ReactConfig, Runtime};

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "transport error: {}", _0)]
    Transport(#[cause] std::io::Error),
    #[fail(display = "counters unavailable: {}", _0)]
    CounterUnavailable(String),
    #[fail(display = "malformed control message: {}", _0)]
    MalformedMessage(String),
    #[fail(display = "actuator write failed: {}", _0)]
    Actuator(#[cause] std::io::Error),
    #[fail(display = "setup failed: {}", _0)]
    Setup(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Identity of a station on the control channel.
///
/// For the UDP transport this is the sender's IPv4 address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationId(pub String);

impl StationId {
    pub fn new<S: Into<String>>(s: S) -> Self {
        StationId(s.into())
    }
}

impl std::fmt::Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn make_logger(verbose: bool) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let level = if verbose {
        slog::Level::Debug
    } else {
        slog::Level::Info
    };
    let drain = slog::LevelFilter::new(drain, level).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!())
}

/// Monotonic clock in nanoseconds, used for neighbor liveness.
pub fn now_ns() -> u64 {
    time::precise_time_ns()
}

#[cfg(test)]
pub(crate) fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}
