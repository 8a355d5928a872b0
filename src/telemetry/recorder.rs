//! Append-only CSV record of every inference in a session.
//!
//! Rows are kept in arrival order in memory for the whole session. In
//! incremental mode each row is written and flushed as it arrives; in batch
//! mode rows reach the sink only on [`TelemetryRecorder::flush`] or
//! [`TelemetryRecorder::finalize`].

use crate::actuator::{ActuatorCommand, ActuatorState};
use crate::core::Inference;
use crate::telemetry::chart::{self, ChartOptions};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// When rows reach durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryMode {
    /// One write and flush per row; nothing is lost on abrupt exit
    #[default]
    Incremental,
    /// Rows are written at flush/finalize only
    Batch,
}

/// Column layout of the telemetry file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryLayout {
    /// timestamp, stress %, latency, actuator state
    #[default]
    Control,
    /// timestamp, relative time, stress %, latency
    Live,
}

impl TelemetryLayout {
    pub fn header(&self) -> [&'static str; 4] {
        match self {
            TelemetryLayout::Control => [
                "timestamp",
                "stress_probability_pct",
                "latency_ms",
                "actuator_state",
            ],
            TelemetryLayout::Live => [
                "timestamp",
                "relative_time_s",
                "stress_probability_pct",
                "latency_ms",
            ],
        }
    }

    pub fn row(&self, record: &TelemetryRecord) -> [String; 4] {
        match self {
            TelemetryLayout::Control => [
                record
                    .wall_clock_time
                    .format("%d:%m:%Y:%H:%M:%S")
                    .to_string(),
                format!("{:.2}%", record.probability_pct),
                format!("{:.3}", record.latency_ms),
                record.actuator_label.clone(),
            ],
            TelemetryLayout::Live => [
                record
                    .wall_clock_time
                    .format("%Y-%m-%d %H:%M:%S%.3f")
                    .to_string(),
                format!("{:.3}", record.relative_time_secs),
                format!("{:.2}", record.probability_pct),
                format!("{:.2}", record.latency_ms),
            ],
        }
    }
}

/// One telemetry row.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Local time the inference completed
    pub wall_clock_time: DateTime<Local>,
    /// Seconds since the session started
    pub relative_time_secs: f64,
    pub probability_pct: f64,
    pub latency_ms: f64,
    /// Controller state after this inference
    pub actuator_state: ActuatorState,
    pub actuator_label: String,
    pub command: ActuatorCommand,
}

impl TelemetryRecord {
    pub fn new(
        inference: &Inference,
        command: ActuatorCommand,
        actuator_state: ActuatorState,
        actuator_label: &str,
        session_start: DateTime<Utc>,
    ) -> Self {
        let latency =
            chrono::Duration::from_std(inference.latency).unwrap_or_else(|_| chrono::Duration::zero());
        let completed = inference.sample.arrival_time + latency;
        let relative_us = (completed - session_start)
            .num_microseconds()
            .unwrap_or(0)
            .max(0);

        Self {
            wall_clock_time: completed.with_timezone(&Local),
            relative_time_secs: relative_us as f64 / 1_000_000.0,
            probability_pct: inference.probability_pct(),
            latency_ms: inference.latency_ms(),
            actuator_state,
            actuator_label: actuator_label.to_string(),
            command,
        }
    }
}

/// Errors writing telemetry. These never stop acquisition.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("telemetry CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("could not render summary chart {path}: {source}")]
    Chart {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("telemetry sink already closed")]
    Closed,
}

struct ChartTarget {
    path: PathBuf,
    options: ChartOptions,
}

/// Owns the telemetry sink for one session.
pub struct TelemetryRecorder {
    writer: Option<csv::Writer<Box<dyn Write + Send>>>,
    layout: TelemetryLayout,
    mode: TelemetryMode,
    records: Vec<TelemetryRecord>,
    /// Rows handed to the CSV writer
    queued: usize,
    /// Rows confirmed by a successful flush
    persisted: usize,
    header_written: bool,
    path: Option<PathBuf>,
    chart: Option<ChartTarget>,
}

impl TelemetryRecorder {
    /// Create (truncate) a telemetry file.
    pub fn create(
        path: impl AsRef<Path>,
        layout: TelemetryLayout,
        mode: TelemetryMode,
    ) -> Result<Self, TelemetryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = BufWriter::new(File::create(path)?);
        let mut recorder = Self::from_writer(file, layout, mode)?;
        recorder.path = Some(path.to_path_buf());
        info!(path = %path.display(), ?mode, "telemetry logging started");
        Ok(recorder)
    }

    /// Record into any writer.
    pub fn from_writer(
        writer: impl Write + Send + 'static,
        layout: TelemetryLayout,
        mode: TelemetryMode,
    ) -> Result<Self, TelemetryError> {
        let mut recorder = Self {
            writer: Some(csv::Writer::from_writer(Box::new(writer) as Box<dyn Write + Send>)),
            layout,
            mode,
            records: Vec::new(),
            queued: 0,
            persisted: 0,
            header_written: false,
            path: None,
            chart: None,
        };
        if mode == TelemetryMode::Incremental {
            recorder.flush()?;
        }
        Ok(recorder)
    }

    /// Render a summary chart next to the data at finalize.
    pub fn with_chart(mut self, path: impl Into<PathBuf>, options: ChartOptions) -> Self {
        self.chart = Some(ChartTarget {
            path: path.into(),
            options,
        });
        self
    }

    /// Append one row. The row is kept even if writing it fails.
    pub fn record(&mut self, record: TelemetryRecord) -> Result<(), TelemetryError> {
        if self.writer.is_none() {
            return Err(TelemetryError::Closed);
        }
        self.records.push(record);
        match self.mode {
            TelemetryMode::Incremental => self.flush(),
            TelemetryMode::Batch => Ok(()),
        }
    }

    /// Write the header and every row not yet persisted, then flush the sink.
    pub fn flush(&mut self) -> Result<(), TelemetryError> {
        let writer = self.writer.as_mut().ok_or(TelemetryError::Closed)?;

        if !self.header_written {
            writer.write_record(self.layout.header())?;
            self.header_written = true;
        }
        for record in &self.records[self.queued..] {
            writer.write_record(self.layout.row(record))?;
            self.queued += 1;
        }
        writer.flush()?;
        self.persisted = self.queued;
        Ok(())
    }

    /// Flush, close the sink and render the chart if one was requested.
    ///
    /// Only the first call does anything; later calls return
    /// [`TelemetryError::Closed`].
    pub fn finalize(&mut self) -> Result<(), TelemetryError> {
        if self.writer.is_none() {
            return Err(TelemetryError::Closed);
        }
        let flushed = self.flush();
        self.writer = None;
        debug!(rows = self.persisted, "telemetry sink closed");

        let charted = match &self.chart {
            Some(target) if !self.records.is_empty() => {
                chart::write_svg(&target.path, &self.records, &target.options)
                    .map(|_| info!(path = %target.path.display(), "summary chart saved"))
                    .map_err(|source| TelemetryError::Chart {
                        path: target.path.display().to_string(),
                        source,
                    })
            }
            _ => Ok(()),
        };

        flushed.and(charted)
    }

    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    /// Number of rows the sink accepted on a successful flush.
    pub fn persisted(&self) -> usize {
        self.persisted
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn mode(&self) -> TelemetryMode {
        self.mode
    }

    pub fn layout(&self) -> TelemetryLayout {
        self.layout
    }
}
