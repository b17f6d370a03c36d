use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Transport used by one transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// Transmission Control Protocol - reliable byte stream
    Tcp,
    /// User Datagram Protocol - best-effort sequenced segments
    Udp,
}

/// Test role: server or client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Server mode - broadcasts offers and serves transfer requests
    Server,
    /// Client mode - discovers a server and runs transfer sessions
    Client,
}

/// Configuration for lanperf servers, clients and sessions.
///
/// Every port number, size and timeout the protocol engine uses lives here and
/// is passed into components at construction, so deployments (and tests) can
/// vary them independently. Use the builder-style `with_*` methods to
/// customize.
///
/// # Defaults
///
/// | field | default |
/// |---|---|
/// | `discovery_port` | 13117 |
/// | `tcp_port` | 4000 |
/// | `udp_port` | 3000 |
/// | `transfer_size` | 1 GiB |
/// | `tcp_streams` / `udp_streams` | 1 / 1 |
/// | `segment_size` | 1024 bytes |
/// | `chunk_size` | 64 KiB |
/// | `offer_interval` | 1 s |
/// | `udp_idle_timeout` | 1 s |
/// | `discovery_timeout` | 10 s |
/// | `max_concurrent_transfers` | 256 |
///
/// # Examples
///
/// ```
/// use lanperf::Config;
/// use std::time::Duration;
///
/// let config = Config::server(4000, 3000)
///     .with_discovery_port(13117)
///     .with_offer_interval(Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server mode or client mode
    pub mode: Mode,

    /// Port offers are broadcast to and listened for on
    pub discovery_port: u16,

    /// Server TCP transfer port
    pub tcp_port: u16,

    /// Server UDP transfer port
    pub udp_port: u16,

    /// Bind address (for server mode); `0.0.0.0` when unset
    pub bind_addr: Option<IpAddr>,

    /// Bytes requested per transfer session
    pub transfer_size: u64,

    /// Number of concurrent TCP sessions a client runs
    pub tcp_streams: usize,

    /// Number of concurrent UDP sessions a client runs
    pub udp_streams: usize,

    /// Payload bytes per UDP segment
    pub segment_size: usize,

    /// Write granularity for the TCP fill stream
    pub chunk_size: usize,

    /// Byte value the server fills payloads with
    pub fill_byte: u8,

    /// Delay between consecutive offer broadcasts
    pub offer_interval: Duration,

    /// A UDP session completes when no segment arrives for this long
    pub udp_idle_timeout: Duration,

    /// How long a client waits for an offer before giving up
    pub discovery_timeout: Duration,

    /// Upper bound on concurrently serviced transfers (server side)
    pub max_concurrent_transfers: usize,

    /// Output the session result as JSON
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Client,
            discovery_port: 13117,
            tcp_port: 4000,
            udp_port: 3000,
            bind_addr: None,
            transfer_size: 1024 * 1024 * 1024, // 1 GiB
            tcp_streams: 1,
            udp_streams: 1,
            segment_size: 1024,
            chunk_size: 64 * 1024,
            fill_byte: b'A',
            offer_interval: Duration::from_secs(1),
            udp_idle_timeout: Duration::from_secs(1),
            discovery_timeout: Duration::from_secs(10),
            max_concurrent_transfers: 256,
            json: false,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a server configuration listening on the given transfer ports.
    ///
    /// Port 0 requests an ephemeral port; the bound server reports the actual
    /// ports and advertises those in its offers.
    ///
    /// # Examples
    ///
    /// ```
    /// use lanperf::Config;
    ///
    /// let config = Config::server(4000, 3000);
    /// assert_eq!(config.tcp_port, 4000);
    /// assert_eq!(config.udp_port, 3000);
    /// ```
    pub fn server(tcp_port: u16, udp_port: u16) -> Self {
        Self {
            mode: Mode::Server,
            tcp_port,
            udp_port,
            ..Default::default()
        }
    }

    /// Creates a client configuration for the given transfer size and
    /// session counts.
    ///
    /// # Examples
    ///
    /// ```
    /// use lanperf::Config;
    ///
    /// let config = Config::client(1_048_576, 2, 3);
    /// assert_eq!(config.tcp_streams, 2);
    /// assert_eq!(config.udp_streams, 3);
    /// ```
    pub fn client(transfer_size: u64, tcp_streams: usize, udp_streams: usize) -> Self {
        Self {
            mode: Mode::Client,
            transfer_size,
            tcp_streams,
            udp_streams,
            ..Default::default()
        }
    }

    /// Sets the discovery broadcast port.
    pub fn with_discovery_port(mut self, port: u16) -> Self {
        self.discovery_port = port;
        self
    }

    /// Sets the requested transfer size in bytes.
    pub fn with_transfer_size(mut self, size: u64) -> Self {
        self.transfer_size = size;
        self
    }

    /// Sets the UDP segment payload size.
    pub fn with_segment_size(mut self, size: usize) -> Self {
        self.segment_size = size;
        self
    }

    /// Sets the TCP write chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the interval between offer broadcasts.
    pub fn with_offer_interval(mut self, interval: Duration) -> Self {
        self.offer_interval = interval;
        self
    }

    /// Sets the UDP receive idle timeout.
    pub fn with_udp_idle_timeout(mut self, timeout: Duration) -> Self {
        self.udp_idle_timeout = timeout;
        self
    }

    /// Sets how long discovery waits for an offer.
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Sets the bound on concurrently serviced transfers.
    pub fn with_max_concurrent_transfers(mut self, limit: usize) -> Self {
        self.max_concurrent_transfers = limit;
        self
    }

    /// Enables or disables JSON output.
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Checks the configuration for values the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] when a size field is zero or the
    /// segment size exceeds what fits in a datagram alongside its header.
    pub fn validate(&self) -> crate::Result<()> {
        if self.segment_size == 0 {
            return Err(crate::Error::Config(
                "segment size must be at least 1 byte".to_string(),
            ));
        }
        if self.segment_size > 65_507 - crate::protocol::SegmentHeader::SIZE {
            return Err(crate::Error::Config(format!(
                "segment size {} does not fit in a UDP datagram",
                self.segment_size
            )));
        }
        if self.chunk_size == 0 {
            return Err(crate::Error::Config(
                "chunk size must be at least 1 byte".to_string(),
            ));
        }
        if self.max_concurrent_transfers == 0 {
            return Err(crate::Error::Config(
                "at least one concurrent transfer must be allowed".to_string(),
            ));
        }
        Ok(())
    }
}
