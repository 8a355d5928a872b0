//! Session telemetry: the CSV record, the summary chart, counters and the
//! end-of-session report.

pub mod chart;
pub mod recorder;
pub mod report;
pub mod stats;

pub use chart::{render_svg, ChartOptions};
pub use recorder::{
    TelemetryError, TelemetryLayout, TelemetryMode, TelemetryRecord, TelemetryRecorder,
};
pub use report::SessionReport;
pub use stats::{
    create_shared_stats, LatencySummary, SessionStats, SharedSessionStats, StatsSnapshot,
};
