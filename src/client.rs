//! Transfer client: one TCP or UDP test session against a discovered server.

use crate::config::{Config, Protocol};
use crate::discovery::ServerLocation;
use crate::measurements::TransferReport;
use crate::protocol::{parse_segment, Request, SegmentHeader};
use crate::{Error, Result};
use log::debug;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time;
use tokio_util::sync::CancellationToken;

/// One transfer test session.
///
/// A client owns its socket exclusively for its lifetime and shares no state
/// with concurrently running sessions; the session orchestrator spawns one
/// client per requested stream.
///
/// # Examples
///
/// ```no_run
/// use lanperf::{Config, Protocol, TransferClient};
/// use lanperf::discovery::ServerLocation;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let server = ServerLocation {
///     addr: "192.168.1.10".parse()?,
///     udp_port: 3000,
///     tcp_port: 4000,
/// };
/// let config = Config::client(1_048_576, 1, 0);
/// let client = TransferClient::new(1, server, config);
/// let report = client.run(Protocol::Tcp).await?;
/// println!("{:.2} bits/second", report.bits_per_second);
/// # Ok(())
/// # }
/// ```
pub struct TransferClient {
    id: usize,
    server: ServerLocation,
    config: Config,
    cancel: CancellationToken,
}

impl TransferClient {
    /// Creates a session client with its own (uncancelled) token.
    pub fn new(id: usize, server: ServerLocation, config: Config) -> Self {
        Self {
            id,
            server,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation token, usually with one shared by the
    /// orchestrator so a user interrupt stops every session.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs the session over the given transport and reports its statistics.
    pub async fn run(&self, protocol: Protocol) -> Result<TransferReport> {
        match protocol {
            Protocol::Tcp => self.run_tcp().await,
            Protocol::Udp => self.run_udp().await,
        }
    }

    /// TCP session: send one request frame, then read until every requested
    /// byte arrived or the server closed the stream.
    async fn run_tcp(&self) -> Result<TransferReport> {
        let transfer_size = self.config.transfer_size;
        let start = Instant::now();

        let mut stream = TcpStream::connect(self.server.tcp_addr())
            .await
            .map_err(|e| {
                Error::Connection(format!("connect to {} failed: {}", self.server.tcp_addr(), e))
            })?;
        debug!(
            "TCP session #{} connected to {}",
            self.id,
            self.server.tcp_addr()
        );

        let request = Request { transfer_size };
        stream.write_all(&request.to_bytes()).await?;
        stream.flush().await?;

        let mut buf = vec![0u8; self.config.chunk_size];
        let mut received = 0u64;
        while received < transfer_size {
            let n = tokio::select! {
                result = stream.read(&mut buf) => result?,
                _ = self.cancel.cancelled() => {
                    debug!("TCP session #{} cancelled", self.id);
                    break;
                }
            };
            if n == 0 {
                debug!(
                    "TCP session #{}: server closed after {} of {} bytes",
                    self.id, received, transfer_size
                );
                break;
            }
            received += n as u64;
        }

        let elapsed = start.elapsed();
        debug!(
            "TCP session #{} received {} bytes in {:.2} seconds",
            self.id,
            received,
            elapsed.as_secs_f64()
        );
        Ok(TransferReport::tcp(
            self.id,
            transfer_size,
            received,
            elapsed,
        ))
    }

    /// UDP session: send one request datagram, then collect segments until
    /// all expected indices arrived or the idle timeout expired.
    ///
    /// Duplicate indices are counted once; datagrams that do not decode as
    /// payload segments are ignored. Finishing on the idle timeout is normal
    /// completion, not an error.
    async fn run_udp(&self) -> Result<TransferReport> {
        let transfer_size = self.config.transfer_size;
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;

        let start = Instant::now();
        let request = Request { transfer_size };
        socket
            .send_to(&request.to_bytes(), self.server.udp_addr())
            .await?;
        debug!(
            "UDP session #{} requested {} bytes from {}",
            self.id,
            transfer_size,
            self.server.udp_addr()
        );

        let mut buf = vec![0u8; SegmentHeader::SIZE + self.config.segment_size];
        let mut seen: HashSet<u64> = HashSet::new();
        let mut total_segments: Option<u64> = None;
        let mut bytes_received = 0u64;

        loop {
            let received = tokio::select! {
                result = time::timeout(self.config.udp_idle_timeout, socket.recv_from(&mut buf)) => result,
                _ = self.cancel.cancelled() => {
                    debug!("UDP session #{} cancelled", self.id);
                    break;
                }
            };

            match received {
                Ok(Ok((len, from))) => {
                    let Some((header, payload)) = parse_segment(&buf[..len]) else {
                        debug!("Ignoring {} non-segment bytes from {}", len, from);
                        continue;
                    };
                    // The first valid segment fixes the expected count.
                    let expected = *total_segments.get_or_insert(header.total_segments);
                    if seen.insert(header.segment_index) {
                        bytes_received += payload.len() as u64;
                    }
                    if seen.len() as u64 >= expected {
                        break;
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    debug!(
                        "UDP session #{} idle for {:.1} seconds, finishing",
                        self.id,
                        self.config.udp_idle_timeout.as_secs_f64()
                    );
                    break;
                }
            }
        }

        let elapsed = start.elapsed();
        let distinct = seen.len() as u64;
        debug!(
            "UDP session #{} received {}/{} segments in {:.2} seconds",
            self.id,
            distinct,
            total_segments.unwrap_or(0),
            elapsed.as_secs_f64()
        );
        Ok(TransferReport::udp(
            self.id,
            transfer_size,
            bytes_received,
            elapsed,
            distinct,
            total_segments.unwrap_or(0),
        ))
    }
}
