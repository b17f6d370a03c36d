//! Server discovery over UDP broadcast.
//!
//! The server side broadcasts one [`Offer`](crate::protocol::Offer) frame per
//! interval on the discovery port; the client side binds that port and waits
//! for the first datagram that decodes as an offer. Anything else arriving on
//! the port is discarded without effect.

use crate::protocol::Offer;
use crate::{Error, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// A discovered server: where it is and which ports it serves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerLocation {
    /// Address the offer came from
    pub addr: IpAddr,
    /// Server UDP transfer port
    pub udp_port: u16,
    /// Server TCP transfer port
    pub tcp_port: u16,
}

impl ServerLocation {
    /// Socket address of the server's TCP transfer service.
    pub fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.tcp_port)
    }

    /// Socket address of the server's UDP transfer service.
    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.udp_port)
    }
}

/// Periodically announces a server's transfer ports to the local segment.
///
/// Runs for the lifetime of the server process; the only way out is the
/// cancellation token. Send failures are logged and the loop keeps going;
/// a transient network error must not take the announcement down.
pub struct OfferBroadcaster {
    socket: UdpSocket,
    frame: [u8; Offer::SIZE],
    dest: SocketAddr,
    interval: Duration,
}

impl OfferBroadcaster {
    /// Binds the broadcast socket and prepares the offer frame.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be created or broadcast cannot be enabled;
    /// both are fatal startup conditions.
    pub async fn bind(offer: Offer, discovery_port: u16, interval: Duration) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        let dest = SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), discovery_port);
        Ok(Self {
            socket,
            frame: offer.to_bytes(),
            dest,
            interval,
        })
    }

    /// Broadcasts the offer once per interval until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("Broadcasting offers to {}", self.dest);
        loop {
            if let Err(e) = self.socket.send_to(&self.frame, self.dest).await {
                warn!("Failed to broadcast offer: {}", e);
            } else {
                debug!("Offer broadcast to {}", self.dest);
            }

            tokio::select! {
                _ = time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => {
                    debug!("Offer broadcaster stopping");
                    return Ok(());
                }
            }
        }
    }
}

/// Waits on the discovery port for a server to announce itself.
///
/// # Examples
///
/// ```no_run
/// use lanperf::discovery::DiscoveryListener;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let listener = DiscoveryListener::bind(13117).await?;
/// let server = listener.wait_for_offer(Duration::from_secs(10)).await?;
/// println!("Server at {} (tcp {}, udp {})", server.addr, server.tcp_port, server.udp_port);
/// # Ok(())
/// # }
/// ```
pub struct DiscoveryListener {
    socket: UdpSocket,
}

impl DiscoveryListener {
    /// Binds the discovery port. Port 0 picks an ephemeral port.
    pub async fn bind(discovery_port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, discovery_port)).await?;
        socket.set_broadcast(true)?;
        Ok(Self { socket })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Returns the first valid offer to arrive, or an error after `timeout`.
    ///
    /// Datagrams that fail validation (wrong cookie, wrong type, truncated)
    /// are discarded and the wait continues; only the deadline ends it.
    ///
    /// # Errors
    ///
    /// [`Error::Discovery`] when no valid offer arrives within `timeout`.
    pub async fn wait_for_offer(&self, timeout: Duration) -> Result<ServerLocation> {
        info!("Listening for server offers on {}", self.socket.local_addr()?);
        match time::timeout(timeout, self.next_offer()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Discovery(format!(
                "no server found within {:.1} seconds",
                timeout.as_secs_f64()
            ))),
        }
    }

    async fn next_offer(&self) -> Result<ServerLocation> {
        let mut buf = [0u8; 1024];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            match Offer::from_bytes(&buf[..len]) {
                Some(offer) => {
                    info!(
                        "Received offer from {}: udp port {}, tcp port {}",
                        from.ip(),
                        offer.udp_port,
                        offer.tcp_port
                    );
                    return Ok(ServerLocation {
                        addr: from.ip(),
                        udp_port: offer.udp_port,
                        tcp_port: offer.tcp_port,
                    });
                }
                None => {
                    debug!("Ignoring {} non-offer bytes from {}", len, from);
                }
            }
        }
    }
}
