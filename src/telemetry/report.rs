//! End-of-session report.

use crate::telemetry::stats::{LatencySummary, StatsSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// What a finished session did and why it stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Human-readable stop reason
    pub stop_reason: String,
    /// Actuator backend name
    pub actuator: String,
    pub threshold: f64,
    pub stats: StatsSnapshot,
    /// `None` when no inference completed
    pub latency: Option<LatencySummary>,
    pub mean_stress_pct: Option<f64>,
    pub telemetry_path: Option<PathBuf>,
}

impl SessionReport {
    /// Write the report as pretty JSON into `dir`, returning the file path.
    pub fn save(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "session_{}.json",
            self.ended_at.format("%Y%m%d_%H%M%S")
        ));
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Session {} ended: {}\n\
             - Actuator: {} (threshold {:.2})\n\
             - Duration: {:.1} seconds\n\
             - Inferences: {} ({} frames skipped, {} classifier failures)\n\
             - Actuations: {}",
            self.session_id,
            self.stop_reason,
            self.actuator,
            self.threshold,
            (self.ended_at - self.started_at).num_milliseconds() as f64 / 1000.0,
            self.stats.inferences,
            self.stats.frames_skipped,
            self.stats.classifier_failures,
            self.stats.actuations,
        );
        if let Some(mean) = self.mean_stress_pct {
            out.push_str(&format!("\n- Avg Stress: {mean:.2}%"));
        }
        if let Some(latency) = &self.latency {
            out.push_str(&format!(
                "\n- Latency: avg {:.2} ms, p95 {:.2} ms, max {:.2} ms",
                latency.mean_ms, latency.p95_ms, latency.max_ms
            ));
        }
        if let Some(path) = &self.telemetry_path {
            out.push_str(&format!("\n- Telemetry: {}", path.display()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::stats::SessionStats;

    fn report() -> SessionReport {
        let stats = SessionStats::new();
        stats.record_inference();
        SessionReport {
            session_id: Uuid::new_v4(),
            started_at: stats.session_start(),
            ended_at: Utc::now(),
            stop_reason: "end of stream".to_string(),
            actuator: "digital".to_string(),
            threshold: 0.5,
            stats: stats.stats(),
            latency: LatencySummary::from_latencies(vec![1.0, 3.0]),
            mean_stress_pct: Some(42.0),
            telemetry_path: None,
        }
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let report = report();

        let path = report.save(dir.path()).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("session_"));

        let loaded: SessionReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.session_id, report.session_id);
        assert_eq!(loaded.stats.inferences, 1);
    }

    #[test]
    fn test_summary_mentions_stop_reason() {
        let summary = report().summary();
        assert!(summary.contains("end of stream"));
        assert!(summary.contains("Avg Stress: 42.00%"));
        assert!(summary.contains("Actuator: digital"));
    }
}
