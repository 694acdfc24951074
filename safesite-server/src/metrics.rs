use metrics::{counter, gauge};
use safesite_eye::MonitorStats;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Server-side counters; pipeline counters live in `MonitorState`
#[derive(Default)]
pub struct Metrics {
    pub stream_connections_total: AtomicU64,
    pub active_streams: AtomicU64,
    pub snapshots_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_opened(&self) {
        self.stream_connections_total.fetch_add(1, Ordering::Relaxed);
        let active = self.active_streams.fetch_add(1, Ordering::Relaxed) + 1;
        counter!("safesite_stream_connections_total").increment(1);
        gauge!("safesite_active_streams").set(active as f64);
    }

    pub fn stream_closed(&self) {
        let previous = self
            .active_streams
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        gauge!("safesite_active_streams").set(previous.saturating_sub(1) as f64);
    }

    pub fn snapshot_saved(&self) {
        self.snapshots_total.fetch_add(1, Ordering::Relaxed);
        counter!("safesite_snapshots_total").increment(1);
    }

    pub fn active_streams(&self) -> u64 {
        self.active_streams.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition of server and pipeline counters
    pub fn render_prometheus(&self, stats: &MonitorStats) -> String {
        let rows: [(&str, &str, &str, u64); 7] = [
            (
                "safesite_frames_processed_total",
                "counter",
                "Frames published to viewers",
                stats.frames_processed,
            ),
            (
                "safesite_detection_failures_total",
                "counter",
                "Detector calls that failed and were treated as empty",
                stats.detection_failures,
            ),
            (
                "safesite_alerts_logged_total",
                "counter",
                "Audit entries written for alert transitions",
                stats.alerts_logged,
            ),
            (
                "safesite_audit_log_failures_total",
                "counter",
                "Audit entries that could not be persisted",
                stats.log_failures,
            ),
            (
                "safesite_stream_connections_total",
                "counter",
                "Video stream connections accepted",
                self.stream_connections_total.load(Ordering::Relaxed),
            ),
            (
                "safesite_active_streams",
                "gauge",
                "Video streams currently open",
                self.active_streams(),
            ),
            (
                "safesite_snapshots_total",
                "counter",
                "Snapshots written",
                self.snapshots_total.load(Ordering::Relaxed),
            ),
        ];

        let mut out = String::new();
        for (name, kind, help, value) in rows {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} {}", name, kind);
            let _ = writeln!(out, "{} {}", name, value);
        }
        out
    }
}
