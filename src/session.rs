//! Session orchestration: run many transfer sessions concurrently and
//! aggregate their reports.

use crate::client::TransferClient;
use crate::config::{Config, Protocol};
use crate::discovery::ServerLocation;
use crate::measurements::{ReportCollector, SessionSummary, TransferReport};
use crate::Result;
use log::{error, info};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Events emitted as individual transfer sessions progress.
///
/// Sessions complete independently and in no particular order; events arrive
/// in whatever order the transfers finish.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A transfer session started.
    TransferStarted { id: usize, protocol: Protocol },
    /// A transfer session completed (fully or partially) with its report.
    TransferCompleted(TransferReport),
    /// A transfer session failed before producing a report.
    TransferFailed {
        id: usize,
        protocol: Protocol,
        error: String,
    },
}

/// Callback receiving [`SessionEvent`]s during a run.
///
/// Automatically implemented for any `Fn(SessionEvent) + Send + Sync`
/// closure.
pub trait SessionCallback: Send + Sync {
    fn on_event(&self, event: SessionEvent);
}

impl<F> SessionCallback for F
where
    F: Fn(SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: SessionEvent) {
        self(event)
    }
}

type CallbackRef = Arc<dyn SessionCallback>;

/// Orchestrates one benchmarking run against a discovered server.
///
/// Starts the configured number of TCP and UDP transfer sessions
/// concurrently, each as an isolated worker with its own socket, waits for
/// all of them, and returns the aggregated summary. A failing session is
/// reported and counted; it never aborts the others.
///
/// # Examples
///
/// ```no_run
/// use lanperf::{Config, Session};
/// use lanperf::discovery::DiscoveryListener;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::client(1_048_576, 2, 3);
/// let listener = DiscoveryListener::bind(config.discovery_port).await?;
/// let server = listener.wait_for_offer(config.discovery_timeout).await?;
///
/// let session = Session::new(config, server);
/// let summary = session.run().await?;
/// println!("{} transfers completed", summary.completed);
/// # Ok(())
/// # }
/// ```
pub struct Session {
    config: Config,
    server: ServerLocation,
    callback: Option<CallbackRef>,
    cancel: CancellationToken,
}

impl Session {
    /// Creates an orchestrator for the given configuration and server.
    pub fn new(config: Config, server: ServerLocation) -> Self {
        Self {
            config,
            server,
            callback: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attaches an event callback.
    pub fn with_callback<C: SessionCallback + 'static>(mut self, callback: C) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Token that stops every running session when cancelled.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs all configured sessions to completion.
    pub async fn run(&self) -> Result<SessionSummary> {
        self.config.validate()?;

        let collector = ReportCollector::new();
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        let mut next_id = 0;

        info!(
            "Starting {} TCP and {} UDP transfers of {} bytes against {}",
            self.config.tcp_streams,
            self.config.udp_streams,
            self.config.transfer_size,
            self.server.addr
        );

        for _ in 0..self.config.tcp_streams {
            next_id += 1;
            workers.push(self.spawn_worker(next_id, Protocol::Tcp, &collector));
        }
        for _ in 0..self.config.udp_streams {
            next_id += 1;
            workers.push(self.spawn_worker(next_id, Protocol::Udp, &collector));
        }

        for worker in workers {
            if let Err(e) = worker.await {
                // A panicking worker counts as failed; the rest keep running.
                error!("Transfer worker aborted: {}", e);
                collector.record_failure();
            }
        }

        Ok(collector.summary())
    }

    fn spawn_worker(
        &self,
        id: usize,
        protocol: Protocol,
        collector: &ReportCollector,
    ) -> JoinHandle<()> {
        let client = TransferClient::new(id, self.server, self.config.clone())
            .with_cancellation(self.cancel.clone());
        let collector = collector.clone();
        let callback = self.callback.clone();

        tokio::spawn(async move {
            notify(&callback, SessionEvent::TransferStarted { id, protocol });

            match client.run(protocol).await {
                Ok(report) => {
                    match protocol {
                        Protocol::Tcp => info!(
                            "TCP transfer #{} finished, total time: {:.2} seconds, total speed: {:.2} bits/second",
                            id, report.seconds, report.bits_per_second
                        ),
                        Protocol::Udp => info!(
                            "UDP transfer #{} finished, total time: {:.2} seconds, total speed: {:.2} bits/second, success rate: {:.2}%",
                            id,
                            report.seconds,
                            report.bits_per_second,
                            report.success_rate.unwrap_or(0.0)
                        ),
                    }
                    collector.record(report.clone());
                    notify(&callback, SessionEvent::TransferCompleted(report));
                }
                Err(e) => {
                    error!("{:?} transfer #{} failed: {}", protocol, id, e);
                    collector.record_failure();
                    notify(
                        &callback,
                        SessionEvent::TransferFailed {
                            id,
                            protocol,
                            error: e.to_string(),
                        },
                    );
                }
            }
        })
    }
}

fn notify(callback: &Option<CallbackRef>, event: SessionEvent) {
    if let Some(callback) = callback {
        callback.on_event(event);
    }
}
