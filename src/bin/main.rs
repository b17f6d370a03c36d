use clap::{Parser, Subcommand};
use lanperf::{Config, DiscoveryListener, Server, Session};
use log::info;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "lanperf")]
#[command(about = "LAN throughput tester - UDP discovery plus concurrent TCP/UDP transfers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run in server mode
    Server {
        /// TCP transfer port
        #[arg(long, default_value = "4000")]
        tcp_port: u16,

        /// UDP transfer port
        #[arg(long, default_value = "3000")]
        udp_port: u16,

        /// Discovery broadcast port
        #[arg(short, long, default_value = "13117")]
        discovery_port: u16,

        /// Bind to a specific address
        #[arg(short, long)]
        bind: Option<String>,

        /// Maximum transfers serviced concurrently
        #[arg(long, default_value = "256")]
        max_transfers: usize,
    },

    /// Run in client mode
    Client {
        /// Bytes to request per transfer
        #[arg(short, long, default_value = "1073741824")]
        file_size: u64,

        /// Number of concurrent TCP connections
        #[arg(short, long, default_value = "1")]
        tcp_connections: usize,

        /// Number of concurrent UDP connections
        #[arg(short, long, default_value = "1")]
        udp_connections: usize,

        /// Discovery broadcast port
        #[arg(short, long, default_value = "13117")]
        discovery_port: u16,

        /// Seconds to wait for a server offer
        #[arg(long, default_value = "10")]
        discovery_timeout: u64,

        /// Seconds of UDP silence that end a session
        #[arg(long, default_value = "1")]
        udp_timeout: u64,

        /// Output the session result as JSON
        #[arg(short = 'J', long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            tcp_port,
            udp_port,
            discovery_port,
            bind,
            max_transfers,
        } => {
            let mut config = Config::server(tcp_port, udp_port)
                .with_discovery_port(discovery_port)
                .with_max_concurrent_transfers(max_transfers);
            if let Some(bind_addr) = bind {
                config.bind_addr = Some(bind_addr.parse()?);
            }

            let server = Server::bind(config).await?;
            info!(
                "lanperf {} server started: tcp {}, udp {}",
                lanperf::VERSION,
                server.tcp_port(),
                server.udp_port()
            );

            let shutdown = server.shutdown_token().clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, shutting down");
                    shutdown.cancel();
                }
            });

            server.run().await?;
        }

        Commands::Client {
            file_size,
            tcp_connections,
            udp_connections,
            discovery_port,
            discovery_timeout,
            udp_timeout,
            json,
        } => {
            let config = Config::client(file_size, tcp_connections, udp_connections)
                .with_discovery_port(discovery_port)
                .with_discovery_timeout(Duration::from_secs(discovery_timeout))
                .with_udp_idle_timeout(Duration::from_secs(udp_timeout))
                .with_json(json);

            let listener = DiscoveryListener::bind(config.discovery_port).await?;
            let server = listener.wait_for_offer(config.discovery_timeout).await?;

            let session = Session::new(config.clone(), server);
            let shutdown = session.cancellation_token().clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, stopping transfers");
                    shutdown.cancel();
                }
            });

            let summary = session.run().await?;
            if config.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                info!(
                    "All transfers done: {} complete, {} partial, {} failed, {} bytes received",
                    summary.completed, summary.partial, summary.failed, summary.total_bytes
                );
            }
        }
    }

    Ok(())
}
