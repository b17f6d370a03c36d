//! lanperf - LAN throughput benchmarking over TCP and UDP
//!
//! A server broadcasts its availability on a well-known discovery port;
//! clients pick up the offer, then run any number of concurrent TCP and UDP
//! transfer sessions against it and report throughput and (for UDP)
//! segment-loss statistics.
//!
//! # Features
//!
//! - UDP broadcast discovery with a bounded listen timeout
//! - Concurrent TCP and UDP transfer sessions, one isolated worker each
//! - Sequenced UDP segmentation with duplicate-tolerant loss accounting
//! - Cancellation-aware server and session loops
//! - Asynchronous I/O using tokio

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod measurements;
pub mod protocol;
pub mod server;
pub mod session;

pub use client::TransferClient;
pub use config::{Config, Mode, Protocol};
pub use discovery::{DiscoveryListener, OfferBroadcaster, ServerLocation};
pub use error::{Error, Result};
pub use measurements::{SessionSummary, TransferReport};
pub use server::Server;
pub use session::{Session, SessionCallback, SessionEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
