//! Transfer server: answers TCP and UDP requests with fill data while
//! broadcasting offers.

use crate::config::Config;
use crate::discovery::OfferBroadcaster;
use crate::protocol::{encode_segment, segment_count, Offer, Request, SegmentHeader};
use crate::Result;
use log::{debug, error, info};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Network throughput test server.
///
/// Binds three sockets up front (the TCP transfer listener, the UDP transfer
/// socket, and the offer broadcast socket), then drives three loops
/// concurrently: offer broadcasting, TCP accept, and UDP request receive.
/// Each accepted connection and each decoded UDP request is serviced on its
/// own spawned worker, so a slow transfer never blocks the next request.
/// Worker fan-out is bounded by a semaphore sized from
/// [`Config::max_concurrent_transfers`]; requests beyond the bound wait for a
/// permit rather than being dropped.
///
/// # Examples
///
/// ```no_run
/// use lanperf::{Config, Server};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::server(4000, 3000);
/// let server = Server::bind(config).await?;
/// println!("Serving on tcp {} / udp {}", server.tcp_port(), server.udp_port());
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    config: Config,
    tcp_listener: TcpListener,
    udp_socket: Arc<UdpSocket>,
    broadcaster: OfferBroadcaster,
    shutdown: CancellationToken,
}

impl Server {
    /// Binds all listening sockets.
    ///
    /// Configured ports of 0 request ephemeral ports; the offer frame always
    /// advertises the ports actually bound. Any bind failure here is a fatal
    /// startup error.
    pub async fn bind(config: Config) -> Result<Self> {
        config.validate()?;

        let bind_ip = config
            .bind_addr
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let tcp_listener = TcpListener::bind((bind_ip, config.tcp_port)).await?;
        let udp_socket = UdpSocket::bind((bind_ip, config.udp_port)).await?;

        let offer = Offer {
            udp_port: udp_socket.local_addr()?.port(),
            tcp_port: tcp_listener.local_addr()?.port(),
        };
        let broadcaster =
            OfferBroadcaster::bind(offer, config.discovery_port, config.offer_interval).await?;

        info!(
            "Server bound: tcp {}, udp {}, discovery port {}",
            tcp_listener.local_addr()?,
            udp_socket.local_addr()?,
            config.discovery_port
        );

        Ok(Self {
            config,
            tcp_listener,
            udp_socket: Arc::new(udp_socket),
            broadcaster,
            shutdown: CancellationToken::new(),
        })
    }

    /// The TCP port actually bound.
    pub fn tcp_port(&self) -> u16 {
        self.tcp_listener
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(self.config.tcp_port)
    }

    /// The UDP port actually bound.
    pub fn udp_port(&self) -> u16 {
        self.udp_socket
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(self.config.udp_port)
    }

    /// Token that stops all server loops when cancelled.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Runs the broadcaster and both transfer loops until shutdown.
    ///
    /// In-flight transfer workers are dropped mid-send on cancellation;
    /// clients see an early close or segment loss, which they already
    /// tolerate.
    pub async fn run(&self) -> Result<()> {
        let limiter = Arc::new(Semaphore::new(self.config.max_concurrent_transfers));

        tokio::select! {
            result = self.broadcaster.run(self.shutdown.clone()) => result,
            result = self.run_tcp(&limiter) => result,
            result = self.run_udp(&limiter) => result,
            _ = self.shutdown.cancelled() => {
                info!("Server shutting down");
                Ok(())
            }
        }
    }

    async fn run_tcp(&self, limiter: &Arc<Semaphore>) -> Result<()> {
        info!(
            "TCP transfer server listening on {}",
            self.tcp_listener.local_addr()?
        );

        loop {
            match self.tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    let Ok(permit) = limiter.clone().acquire_owned().await else {
                        return Ok(());
                    };
                    let chunk_size = self.config.chunk_size;
                    let fill_byte = self.config.fill_byte;

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_tcp_request(stream, addr, chunk_size, fill_byte).await
                        {
                            error!("Error serving TCP client {}: {}", addr, e);
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }

    async fn run_udp(&self, limiter: &Arc<Semaphore>) -> Result<()> {
        info!(
            "UDP transfer server listening on {}",
            self.udp_socket.local_addr()?
        );

        let mut buf = [0u8; 2048];
        loop {
            match self.udp_socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    let Some(request) = Request::from_bytes(&buf[..len]) else {
                        debug!("Ignoring {} non-request bytes from {}", len, addr);
                        continue;
                    };
                    debug!(
                        "UDP request from {} for {} bytes",
                        addr, request.transfer_size
                    );

                    let Ok(permit) = limiter.clone().acquire_owned().await else {
                        return Ok(());
                    };
                    let socket = self.udp_socket.clone();
                    let segment_size = self.config.segment_size;
                    let fill_byte = self.config.fill_byte;

                    tokio::spawn(async move {
                        if let Err(e) =
                            send_segments(socket, addr, request.transfer_size, segment_size, fill_byte)
                                .await
                        {
                            error!("Error sending segments to {}: {}", addr, e);
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Error receiving UDP request: {}", e);
                }
            }
        }
    }
}

/// Services one TCP connection: one request frame in, `transfer_size` fill
/// bytes out, then close.
async fn handle_tcp_request(
    mut stream: TcpStream,
    addr: SocketAddr,
    chunk_size: usize,
    fill_byte: u8,
) -> Result<()> {
    let mut header = [0u8; Request::SIZE];
    if let Err(e) = stream.read_exact(&mut header).await {
        debug!("Connection from {} ended before a full request: {}", addr, e);
        return Ok(());
    }
    let Some(request) = Request::from_bytes(&header) else {
        debug!("Ignoring malformed request from {}", addr);
        return Ok(());
    };

    let chunk = vec![fill_byte; chunk_size];
    let mut remaining = request.transfer_size;
    while remaining > 0 {
        let n = remaining.min(chunk_size as u64) as usize;
        stream.write_all(&chunk[..n]).await?;
        remaining -= n as u64;
    }
    stream.flush().await?;

    info!("Sent {} bytes to {} over TCP", request.transfer_size, addr);
    Ok(())
}

/// Services one UDP request: `ceil(size / segment_size)` sequenced segments,
/// sent back-to-back with no pacing or retransmission.
async fn send_segments(
    socket: Arc<UdpSocket>,
    dest: SocketAddr,
    transfer_size: u64,
    segment_size: usize,
    fill_byte: u8,
) -> Result<()> {
    let total_segments = segment_count(transfer_size, segment_size);
    let fill = vec![fill_byte; segment_size];
    let mut remaining = transfer_size;

    for segment_index in 0..total_segments {
        let payload_len = remaining.min(segment_size as u64) as usize;
        let frame = encode_segment(
            SegmentHeader {
                total_segments,
                segment_index,
            },
            &fill[..payload_len],
        );
        socket.send_to(&frame, dest).await?;
        remaining -= payload_len as u64;
    }

    info!(
        "Sent {} segments ({} bytes) to {} over UDP",
        total_segments, transfer_size, dest
    );
    Ok(())
}
