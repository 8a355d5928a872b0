//! Raw frame capture for building training sets.
//!
//! Appends every valid frame to a CSV exactly as received, without running
//! the classifier. Repeated captures into the same file extend it.

use crate::core::split_fields;
use crate::pipeline::StopHandle;
use crate::transport::{ReadOutcome, Transport, TransportError};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, trace};

const HEADER: [&str; 3] = ["timestamp", "fp1", "fp2"];

/// Errors during raw capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("capture CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Appending CSV writer for raw frames.
pub struct CaptureWriter<W: Write> {
    writer: csv::Writer<W>,
    rows: u64,
}

impl CaptureWriter<File> {
    /// Open `path` for appending; the header is written only to an empty file.
    pub fn append(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;
        Self::new(file, is_empty)
    }
}

impl<W: Write> CaptureWriter<W> {
    pub fn new(writer: W, write_header: bool) -> Result<Self, CaptureError> {
        let mut writer = csv::Writer::from_writer(writer);
        if write_header {
            writer.write_record(HEADER)?;
            writer.flush()?;
        }
        Ok(Self { writer, rows: 0 })
    }

    /// Append one frame stamped with the local time.
    pub fn write(&mut self, fp1: &str, fp2: &str) -> Result<(), CaptureError> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string();
        self.writer.write_record([timestamp.as_str(), fp1, fp2])?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> Result<W, CaptureError> {
        self.writer
            .into_inner()
            .map_err(|e| CaptureError::Io(e.into_error()))
    }
}

/// Result of a capture run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub rows_written: u64,
    pub lines_skipped: u64,
}

/// Copy valid frames from `transport` into `writer` until the duration
/// elapses, the source ends or `stop` fires.
///
/// Device silence is not an error here; the capture simply waits.
pub fn run_capture<T: Transport, W: Write>(
    transport: &mut T,
    writer: &mut CaptureWriter<W>,
    max_duration: Option<Duration>,
    stop: &StopHandle,
) -> Result<CaptureSummary, CaptureError> {
    let deadline = max_duration.map(|d| Instant::now() + d);
    let mut skipped = 0u64;

    while !stop.is_stopped() && !deadline.is_some_and(|d| Instant::now() >= d) {
        match transport.read_line()? {
            ReadOutcome::Line(line) => match split_fields(&line) {
                Ok((fp1, fp2)) => writer.write(&fp1, &fp2)?,
                Err(e) => {
                    skipped += 1;
                    trace!("{e}");
                }
            },
            ReadOutcome::Idle => {}
            ReadOutcome::Eof => break,
        }
    }

    info!(rows = writer.rows(), skipped, "capture finished");
    Ok(CaptureSummary {
        rows_written: writer.rows(),
        lines_skipped: skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ReplayTransport;

    #[test]
    fn test_capture_keeps_raw_digits() {
        let mut transport = ReplayTransport::from_lines(["0012,34", "x,1", "5,6,7"]);
        let mut writer = CaptureWriter::new(Vec::new(), true).unwrap();

        let summary = run_capture(&mut transport, &mut writer, None, &StopHandle::new()).unwrap();
        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.lines_skipped, 1);

        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,fp1,fp2");
        assert!(lines[1].ends_with(",0012,34"));
        assert!(lines[2].ends_with(",5,6"));
    }

    #[test]
    fn test_header_only_once_across_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");

        for _ in 0..2 {
            let mut writer = CaptureWriter::append(&path).unwrap();
            writer.write("1", "2").unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("timestamp,fp1,fp2").count(), 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_stopped_capture_reads_nothing() {
        let mut transport = ReplayTransport::from_lines(["1,2"]);
        let mut writer = CaptureWriter::new(Vec::new(), false).unwrap();
        let stop = StopHandle::new();
        stop.stop();

        let summary = run_capture(&mut transport, &mut writer, None, &stop).unwrap();
        assert_eq!(summary.rows_written, 0);
    }
}
