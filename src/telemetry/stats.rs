//! Session counters and latency statistics.
//!
//! Counters are atomics so a display thread can read them while the
//! pipeline keeps running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution, Max, OrderStatistics};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Live counters for one pipeline session.
#[derive(Debug)]
pub struct SessionStats {
    /// Lines received from the transport
    lines_read: AtomicU64,
    /// Lines rejected by the frame parser
    frames_skipped: AtomicU64,
    /// Successful inferences
    inferences: AtomicU64,
    /// Scorer failures
    classifier_failures: AtomicU64,
    /// Engage/disengage commands that reached the actuator
    actuations: AtomicU64,
    /// Actuator backend failures
    actuator_errors: AtomicU64,
    /// Telemetry write failures
    telemetry_errors: AtomicU64,
    /// Session start, microseconds since the Unix epoch
    session_start_us: AtomicI64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            lines_read: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            inferences: AtomicU64::new(0),
            classifier_failures: AtomicU64::new(0),
            actuations: AtomicU64::new(0),
            actuator_errors: AtomicU64::new(0),
            telemetry_errors: AtomicU64::new(0),
            session_start_us: AtomicI64::new(Utc::now().timestamp_micros()),
        }
    }

    /// Restart the session clock. Called when acquisition begins, so setup
    /// time is not counted in relative times.
    pub fn mark_started(&self) {
        self.session_start_us
            .store(Utc::now().timestamp_micros(), Ordering::Relaxed);
    }

    pub fn record_line(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_frame(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference(&self) {
        self.inferences.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classifier_failure(&self) {
        self.classifier_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actuation(&self) {
        self.actuations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actuator_error(&self) {
        self.actuator_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a telemetry failure and return the running total.
    pub fn record_telemetry_error(&self) -> u64 {
        self.telemetry_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.session_start_us.load(Ordering::Relaxed))
            .unwrap_or_default()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let session_start = self.session_start();
        StatsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            inferences: self.inferences.load(Ordering::Relaxed),
            classifier_failures: self.classifier_failures.load(Ordering::Relaxed),
            actuations: self.actuations.load(Ordering::Relaxed),
            actuator_errors: self.actuator_errors.load(Ordering::Relaxed),
            telemetry_errors: self.telemetry_errors.load(Ordering::Relaxed),
            session_start,
            session_duration_secs: (Utc::now() - session_start).num_milliseconds() as f64
                / 1000.0,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        self.stats().summary()
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub frames_skipped: u64,
    pub inferences: u64,
    pub classifier_failures: u64,
    pub actuations: u64,
    pub actuator_errors: u64,
    pub telemetry_errors: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: f64,
}

impl StatsSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "Session Statistics:\n\
             - Lines read: {}\n\
             - Malformed frames skipped: {}\n\
             - Inferences: {}\n\
             - Classifier failures: {}\n\
             - Actuations: {}\n\
             - Actuator errors: {}\n\
             - Telemetry errors: {}\n\
             - Session duration: {:.1} seconds",
            self.lines_read,
            self.frames_skipped,
            self.inferences,
            self.classifier_failures,
            self.actuations,
            self.actuator_errors,
            self.telemetry_errors,
            self.session_duration_secs
        )
    }
}

/// Thread-safe shared session counters.
pub type SharedSessionStats = Arc<SessionStats>;

/// Create a new shared counter set.
pub fn create_shared_stats() -> SharedSessionStats {
    Arc::new(SessionStats::new())
}

/// Distribution of scorer latencies over a session, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    /// Summarize latencies; `None` for an empty session.
    pub fn from_latencies(latencies_ms: Vec<f64>) -> Option<Self> {
        if latencies_ms.is_empty() {
            return None;
        }
        let count = latencies_ms.len();
        let mut data = Data::new(latencies_ms);

        Some(Self {
            count,
            mean_ms: data.mean().unwrap_or(0.0),
            std_dev_ms: data.std_dev().unwrap_or(0.0),
            p50_ms: data.percentile(50),
            p95_ms: data.percentile(95),
            max_ms: data.max(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stats_counting() {
        let stats = SessionStats::new();

        stats.record_line();
        stats.record_line();
        stats.record_skipped_frame();
        stats.record_inference();
        stats.record_actuation();

        let snapshot = stats.stats();
        assert_eq!(snapshot.lines_read, 2);
        assert_eq!(snapshot.frames_skipped, 1);
        assert_eq!(snapshot.inferences, 1);
        assert_eq!(snapshot.actuations, 1);
        assert_eq!(snapshot.classifier_failures, 0);
    }

    #[test]
    fn test_telemetry_error_running_total() {
        let stats = SessionStats::new();
        assert_eq!(stats.record_telemetry_error(), 1);
        assert_eq!(stats.record_telemetry_error(), 2);
        assert_eq!(stats.stats().telemetry_errors, 2);
    }

    #[test]
    fn test_mark_started_moves_session_start() {
        let stats = SessionStats::new();
        let created = stats.session_start();
        std::thread::sleep(std::time::Duration::from_millis(5));

        stats.mark_started();
        assert!(stats.session_start() > created);
        assert!(stats.stats().session_duration_secs < 1.0);
    }

    #[test]
    fn test_summary_format() {
        let summary = SessionStats::new().summary();

        assert!(summary.contains("Lines read"));
        assert!(summary.contains("Malformed frames skipped"));
        assert!(summary.contains("Actuations"));
    }

    #[test]
    fn test_latency_summary() {
        assert!(LatencySummary::from_latencies(Vec::new()).is_none());

        let summary = LatencySummary::from_latencies(vec![1.0, 2.0, 3.0, 4.0, 10.0]).unwrap();
        assert_eq!(summary.count, 5);
        assert!((summary.mean_ms - 4.0).abs() < 1e-9);
        assert!((summary.p50_ms - 3.0).abs() < 1e-9);
        assert_eq!(summary.max_ms, 10.0);
        assert!(summary.std_dev_ms > 0.0);
    }
}
