// UDP client behavior against a scripted peer: partial delivery, duplicates,
// foreign traffic. The "server" here is a plain socket driven by the test so
// loss and duplication are deterministic instead of depending on the network.

use lanperf::discovery::ServerLocation;
use lanperf::protocol::{encode_segment, Request, SegmentHeader};
use lanperf::{Config, Protocol, TransferClient};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

/// Binds a scripted UDP peer; on receiving a request it sends the frames
/// produced by `frames` to the requester.
async fn scripted_udp_server<F>(frames: F) -> SocketAddr
where
    F: FnOnce(u64) -> Vec<Vec<u8>> + Send + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        let (len, requester) = socket.recv_from(&mut buf).await.unwrap();
        let request = Request::from_bytes(&buf[..len]).expect("not a request frame");
        for frame in frames(request.transfer_size) {
            socket.send_to(&frame, requester).await.unwrap();
        }
    });

    addr
}

fn location_of(udp: SocketAddr) -> ServerLocation {
    ServerLocation {
        addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        udp_port: udp.port(),
        tcp_port: 1,
    }
}

fn segment(total: u64, index: u64, payload_len: usize) -> Vec<u8> {
    encode_segment(
        SegmentHeader {
            total_segments: total,
            segment_index: index,
        },
        &vec![b'A'; payload_len],
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn test_partial_delivery_reports_loss_and_completes() {
    // 7 of 10 segments arrive, then silence until the idle timeout.
    let addr = scripted_udp_server(|_| (0..7).map(|i| segment(10, i, 1024)).collect()).await;

    let config = Config::client(10_240, 0, 1).with_udp_idle_timeout(Duration::from_millis(300));
    let client = TransferClient::new(1, location_of(addr), config);
    let report = client.run(Protocol::Udp).await.expect("Session errored");

    assert_eq!(report.total_segments, Some(10));
    assert_eq!(report.segments_received, Some(7));
    assert_eq!(report.success_rate, Some(70.0));
    assert_eq!(report.bytes_received, 7 * 1024);
    assert!(!report.is_complete());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_duplicate_segments_counted_once() {
    // Segment 0 arrives three times; totals must not inflate.
    let addr = scripted_udp_server(|_| {
        let mut frames = vec![segment(5, 0, 1024), segment(5, 0, 1024)];
        frames.extend((0..5).map(|i| segment(5, i, 1024)));
        frames
    })
    .await;

    let config = Config::client(5 * 1024, 0, 1).with_udp_idle_timeout(Duration::from_millis(300));
    let client = TransferClient::new(1, location_of(addr), config);
    let report = client.run(Protocol::Udp).await.expect("Session errored");

    assert_eq!(report.segments_received, Some(5));
    assert_eq!(report.bytes_received, 5 * 1024);
    assert_eq!(report.success_rate, Some(100.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_foreign_datagrams_ignored() {
    // Noise and wrong-type frames interleaved with the real segments.
    let addr = scripted_udp_server(|size| {
        vec![
            b"noise noise noise".to_vec(),
            Request {
                transfer_size: size,
            }
            .to_bytes()
            .to_vec(),
            segment(2, 0, 1024),
            vec![0u8; 21],
            segment(2, 1, 1024),
        ]
    })
    .await;

    let config = Config::client(2048, 0, 1).with_udp_idle_timeout(Duration::from_millis(300));
    let client = TransferClient::new(1, location_of(addr), config);
    let report = client.run(Protocol::Udp).await.expect("Session errored");

    assert_eq!(report.segments_received, Some(2));
    assert_eq!(report.success_rate, Some(100.0));
    assert_eq!(report.bytes_received, 2048);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_silent_server_times_out_cleanly() {
    // The peer never answers; the session must finish via the idle timeout
    // and report no data rather than hang or error.
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    // Keep the socket alive so the request datagram has somewhere to land.
    let _keep = tokio::spawn(async move {
        let mut buf = [0u8; 64];
        let _ = socket.recv_from(&mut buf).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let config = Config::client(10_000, 0, 1).with_udp_idle_timeout(Duration::from_millis(200));
    let client = TransferClient::new(1, location_of(addr), config);
    let report = client.run(Protocol::Udp).await.expect("Session errored");

    assert_eq!(report.segments_received, Some(0));
    assert_eq!(report.total_segments, Some(0));
    assert_eq!(report.bytes_received, 0);
    assert_eq!(report.success_rate, Some(0.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancellation_stops_session() {
    use tokio_util::sync::CancellationToken;

    // A peer that sends one segment of many and then stalls for longer than
    // the test is willing to wait.
    let addr = scripted_udp_server(|_| vec![segment(1000, 0, 1024)]).await;

    let token = CancellationToken::new();
    let config = Config::client(1000 * 1024, 0, 1).with_udp_idle_timeout(Duration::from_secs(30));
    let client =
        TransferClient::new(1, location_of(addr), config).with_cancellation(token.clone());

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(5), client.run(Protocol::Udp))
        .await
        .expect("Cancellation did not stop the session")
        .expect("Session errored");
    assert_eq!(report.segments_received, Some(1));
    assert!(!report.is_complete());
}
