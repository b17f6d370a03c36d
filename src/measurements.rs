//! Per-session transfer statistics and session-wide aggregation.

use crate::config::Protocol;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Success rate of a UDP transfer as a percentage.
///
/// `(received / total) * 100`, clamped to `[0, 100]`. A transfer with zero
/// expected segments is vacuously complete and reports `100.0`.
pub fn success_rate(received_segments: u64, total_segments: u64) -> f64 {
    if total_segments == 0 {
        return 100.0;
    }
    ((received_segments as f64 / total_segments as f64) * 100.0).clamp(0.0, 100.0)
}

/// Completion statistics for one transfer session.
///
/// Produced once per session when it completes or times out. TCP sessions
/// leave the segment fields `None`; UDP sessions fill them in.
///
/// # Examples
///
/// ```
/// use lanperf::measurements::TransferReport;
/// use std::time::Duration;
///
/// let report = TransferReport::udp(1, 10_000, 7_168, Duration::from_secs(2), 7, 10);
/// assert_eq!(report.success_rate, Some(70.0));
/// assert_eq!(report.bits_per_second, 7_168.0 * 8.0 / 2.0);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    /// Session number within the run, 1-based
    pub id: usize,
    /// Transport the session used
    pub protocol: Protocol,
    /// Bytes the client asked for
    pub requested_bytes: u64,
    /// Payload bytes actually received (distinct segments only for UDP)
    pub bytes_received: u64,
    /// Wall-clock duration of the transfer in seconds
    pub seconds: f64,
    /// Effective throughput in bits per second
    pub bits_per_second: f64,
    /// Distinct segments received (UDP only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments_received: Option<u64>,
    /// Expected segment count learned from the stream (UDP only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_segments: Option<u64>,
    /// Percentage of expected segments received (UDP only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
}

impl TransferReport {
    /// Builds the report for a completed TCP session.
    pub fn tcp(id: usize, requested_bytes: u64, bytes_received: u64, elapsed: Duration) -> Self {
        let seconds = elapsed.as_secs_f64();
        Self {
            id,
            protocol: Protocol::Tcp,
            requested_bytes,
            bytes_received,
            seconds,
            bits_per_second: throughput(bytes_received, seconds),
            segments_received: None,
            total_segments: None,
            success_rate: None,
        }
    }

    /// Builds the report for a completed UDP session.
    ///
    /// `total_segments` is the count learned from the first valid segment; a
    /// session that never saw a segment passes 0 received out of 0 expected
    /// and reports a 0.0 success rate with no data.
    pub fn udp(
        id: usize,
        requested_bytes: u64,
        bytes_received: u64,
        elapsed: Duration,
        segments_received: u64,
        total_segments: u64,
    ) -> Self {
        let seconds = elapsed.as_secs_f64();
        let rate = if segments_received == 0 && total_segments == 0 {
            // No data ever arrived; nothing was achieved.
            0.0
        } else {
            success_rate(segments_received, total_segments)
        };
        Self {
            id,
            protocol: Protocol::Udp,
            requested_bytes,
            bytes_received,
            seconds,
            bits_per_second: throughput(bytes_received, seconds),
            segments_received: Some(segments_received),
            total_segments: Some(total_segments),
            success_rate: Some(rate),
        }
    }

    /// True when a TCP session received every requested byte, or a UDP
    /// session received every expected segment.
    pub fn is_complete(&self) -> bool {
        match self.protocol {
            Protocol::Tcp => self.bytes_received == self.requested_bytes,
            Protocol::Udp => self.success_rate == Some(100.0),
        }
    }
}

fn throughput(bytes: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        (bytes as f64 * 8.0) / seconds
    } else {
        0.0
    }
}

/// Aggregate view over every report a session produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Reports in completion order
    pub reports: Vec<TransferReport>,
    /// Sessions that completed in full
    pub completed: usize,
    /// Sessions that ran but fell short (early EOF, lost segments)
    pub partial: usize,
    /// Sessions that failed outright and produced no report
    pub failed: usize,
    /// Payload bytes received across all sessions
    pub total_bytes: u64,
}

/// Collects reports from concurrently running transfer sessions.
///
/// The only state shared between session workers; each worker pushes its own
/// report exactly once, so contention is negligible.
#[derive(Clone)]
pub struct ReportCollector {
    inner: Arc<Mutex<CollectorState>>,
}

struct CollectorState {
    reports: Vec<TransferReport>,
    failed: usize,
}

impl ReportCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CollectorState {
                reports: Vec::new(),
                failed: 0,
            })),
        }
    }

    /// Records one session's completion report.
    pub fn record(&self, report: TransferReport) {
        self.inner.lock().reports.push(report);
    }

    /// Records a session that failed before producing a report.
    pub fn record_failure(&self) {
        self.inner.lock().failed += 1;
    }

    /// Snapshot of the aggregate state.
    pub fn summary(&self) -> SessionSummary {
        let state = self.inner.lock();
        let completed = state.reports.iter().filter(|r| r.is_complete()).count();
        let total_bytes = state.reports.iter().map(|r| r.bytes_received).sum();
        SessionSummary {
            completed,
            partial: state.reports.len() - completed,
            failed: state.failed,
            total_bytes,
            reports: state.reports.clone(),
        }
    }
}

impl Default for ReportCollector {
    fn default() -> Self {
        Self::new()
    }
}
