//! The acquisition loop.
//!
//! [`PipelineDriver`] owns the transport and the classifier and runs one
//! [`Session`] to completion: read a line, parse it, classify it, let the
//! session switch the actuator and record the result, sleep, repeat. Every
//! exit path finalizes the session, so the actuator is released and the
//! telemetry sink closed before [`PipelineDriver::run`] returns.

use crate::actuator::{ActuatorCommand, ActuatorController};
use crate::core::{frame, ClassifierAdapter, ClassifierError, Inference, Scorer, SharedAggregator};
use crate::telemetry::{
    create_shared_stats, LatencySummary, SessionReport, SessionStats, SharedSessionStats,
    TelemetryError, TelemetryRecord, TelemetryRecorder,
};
use crate::transport::{ReadOutcome, Transport, TransportError};
use chrono::Utc;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Loop timing and failure limits.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sleep after each iteration; zero disables it
    pub poll_interval: Duration,
    /// Stop after this long
    pub max_duration: Option<Duration>,
    /// Consecutive scorer failures tolerated before the session is aborted
    pub max_consecutive_failures: u32,
    /// Line silence after which the device is considered gone
    pub transport_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            max_duration: None,
            max_consecutive_failures: 3,
            transport_timeout: Duration::from_secs(5),
        }
    }
}

/// Cloneable cancellation flag, checked once per iteration.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    DurationElapsed,
    EndOfStream,
    TransportFault(String),
    ClassifierFault(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::DurationElapsed => write!(f, "duration elapsed"),
            StopReason::EndOfStream => write!(f, "end of stream"),
            StopReason::TransportFault(msg) => write!(f, "transport fault: {msg}"),
            StopReason::ClassifierFault(msg) => write!(f, "classifier fault: {msg}"),
        }
    }
}

/// A session that ended on a fault. The session was still finalized.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transport failed: {source}")]
    Transport {
        #[source]
        source: TransportError,
        report: Box<SessionReport>,
    },

    #[error("classifier failed {failures} times in a row: {last}")]
    ClassifierEscalated {
        failures: u32,
        #[source]
        last: ClassifierError,
        report: Box<SessionReport>,
    },
}

impl PipelineError {
    /// Report of the finalized session.
    pub fn report(&self) -> &SessionReport {
        match self {
            PipelineError::Transport { report, .. } => report,
            PipelineError::ClassifierEscalated { report, .. } => report,
        }
    }
}

/// Everything one pipeline run owns besides the transport and scorer.
pub struct Session {
    id: Uuid,
    controller: ActuatorController,
    telemetry: Option<TelemetryRecorder>,
    aggregator: Option<SharedAggregator>,
    stats: SharedSessionStats,
    latencies_ms: Vec<f64>,
    probability_sum_pct: f64,
    report_dir: Option<PathBuf>,
    report: Option<SessionReport>,
}

impl Session {
    pub fn new(controller: ActuatorController) -> Self {
        Self {
            id: Uuid::new_v4(),
            controller,
            telemetry: None,
            aggregator: None,
            stats: create_shared_stats(),
            latencies_ms: Vec::new(),
            probability_sum_pct: 0.0,
            report_dir: None,
            report: None,
        }
    }

    pub fn with_telemetry(mut self, recorder: TelemetryRecorder) -> Self {
        self.telemetry = Some(recorder);
        self
    }

    pub fn with_aggregator(mut self, aggregator: SharedAggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// Share counters with a display.
    pub fn with_stats(mut self, stats: SharedSessionStats) -> Self {
        self.stats = stats;
        self
    }

    /// Save the JSON report into `dir` at finalize.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stats(&self) -> &SharedSessionStats {
        &self.stats
    }

    pub fn controller(&self) -> &ActuatorController {
        &self.controller
    }

    pub fn telemetry(&self) -> Option<&TelemetryRecorder> {
        self.telemetry.as_ref()
    }

    pub fn is_finalized(&self) -> bool {
        self.report.is_some()
    }

    /// Apply one inference: actuator, telemetry, live window.
    ///
    /// Actuator and telemetry failures are counted and logged, never
    /// returned.
    pub fn observe(&mut self, inference: &Inference) -> ActuatorCommand {
        self.stats.record_inference();
        self.latencies_ms.push(inference.latency_ms());
        self.probability_sum_pct += inference.probability_pct();

        let command = match self.controller.update(inference) {
            Ok(command) => {
                if command.is_actuation() {
                    self.stats.record_actuation();
                }
                command
            }
            Err(e) => {
                self.stats.record_actuator_error();
                warn!(actuator = self.controller.actuator_name(), "actuator error: {e}");
                ActuatorCommand::NoChange
            }
        };

        info!(
            stress_pct = inference.probability_pct(),
            state = self.controller.label(),
            latency_ms = inference.latency_ms(),
            "inference"
        );

        let record = TelemetryRecord::new(
            inference,
            command,
            self.controller.state(),
            self.controller.label(),
            self.stats.session_start(),
        );

        if let Some(aggregator) = &self.aggregator {
            aggregator.push_with_latency(
                record.relative_time_secs,
                record.probability_pct,
                record.latency_ms,
            );
        }

        if let Some(recorder) = self.telemetry.as_mut() {
            if let Err(e) = recorder.record(record) {
                Self::telemetry_failed(&self.stats, &e);
            }
        }

        command
    }

    fn telemetry_failed(stats: &SessionStats, e: &TelemetryError) {
        if stats.record_telemetry_error() == 1 {
            warn!("telemetry write failed, continuing without persistence: {e}");
        } else {
            debug!("telemetry write failed: {e}");
        }
    }

    /// Release the actuator, close telemetry and build the report.
    ///
    /// Only the first call does work; later calls return the same report.
    pub fn finalize(&mut self, reason: &StopReason) -> SessionReport {
        if let Some(report) = &self.report {
            return report.clone();
        }

        if let Err(e) = self.controller.release() {
            error!("could not release actuator: {e}");
        }

        let telemetry_path = match self.telemetry.as_mut() {
            Some(recorder) => {
                if let Err(e) = recorder.finalize() {
                    Self::telemetry_failed(&self.stats, &e);
                }
                recorder.path().map(|p| p.to_path_buf())
            }
            None => None,
        };

        let stats = self.stats.stats();
        let report = SessionReport {
            session_id: self.id,
            started_at: stats.session_start,
            ended_at: Utc::now(),
            stop_reason: reason.to_string(),
            actuator: self.controller.actuator_name().to_string(),
            threshold: self.controller.threshold(),
            latency: LatencySummary::from_latencies(std::mem::take(&mut self.latencies_ms)),
            mean_stress_pct: (stats.inferences > 0)
                .then(|| self.probability_sum_pct / stats.inferences as f64),
            stats,
            telemetry_path,
        };

        if let Some(dir) = &self.report_dir {
            match report.save(dir) {
                Ok(path) => info!(path = %path.display(), "session report saved"),
                Err(e) => warn!("could not save session report: {e}"),
            }
        }

        info!(session = %self.id, reason = %reason, "session finalized");
        self.report = Some(report.clone());
        report
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.report.is_none() {
            self.finalize(&StopReason::Cancelled);
        }
    }
}

enum Fault {
    Transport(TransportError),
    Classifier { failures: u32, last: ClassifierError },
}

/// Runs sessions against a transport and a scorer.
pub struct PipelineDriver<T, S> {
    transport: T,
    classifier: ClassifierAdapter<S>,
    config: PipelineConfig,
    stop: StopHandle,
}

impl<T: Transport, S: Scorer> PipelineDriver<T, S> {
    pub fn new(transport: T, scorer: S, config: PipelineConfig) -> Self {
        Self {
            transport,
            classifier: ClassifierAdapter::new(scorer),
            config,
            stop: StopHandle::new(),
        }
    }

    /// Use an externally owned stop flag (e.g. one set from Ctrl+C).
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run `session` until a stop condition fires, then finalize it.
    pub fn run(&mut self, mut session: Session) -> Result<SessionReport, PipelineError> {
        let started = Instant::now();
        let deadline = self.config.max_duration.map(|d| started + d);
        let max_failures = self.config.max_consecutive_failures.max(1);
        let mut last_data = started;
        let mut consecutive_failures = 0u32;
        session.stats().mark_started();

        info!(session = %session.id(), actuator = session.controller().actuator_name(), "pipeline started");

        let outcome = loop {
            if self.stop.is_stopped() {
                break Ok(StopReason::Cancelled);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break Ok(StopReason::DurationElapsed);
            }

            match self.transport.read_line() {
                Ok(ReadOutcome::Line(line)) => {
                    last_data = Instant::now();
                    session.stats().record_line();

                    match frame::parse(&line) {
                        Err(e) => {
                            session.stats().record_skipped_frame();
                            trace!("{e}");
                        }
                        Ok(sample) => match self.classifier.infer(sample) {
                            Ok(inference) => {
                                consecutive_failures = 0;
                                session.observe(&inference);
                            }
                            Err(e) => {
                                consecutive_failures += 1;
                                session.stats().record_classifier_failure();
                                warn!(consecutive = consecutive_failures, "inference failed: {e}");
                                if consecutive_failures >= max_failures {
                                    break Err(Fault::Classifier {
                                        failures: consecutive_failures,
                                        last: e,
                                    });
                                }
                            }
                        },
                    }
                }
                Ok(ReadOutcome::Idle) => {
                    if last_data.elapsed() >= self.config.transport_timeout {
                        break Err(Fault::Transport(TransportError::Timeout(
                            self.config.transport_timeout,
                        )));
                    }
                }
                Ok(ReadOutcome::Eof) => break Ok(StopReason::EndOfStream),
                Err(e) => break Err(Fault::Transport(e)),
            }

            if !self.config.poll_interval.is_zero() {
                thread::sleep(self.config.poll_interval);
            }
        };

        match outcome {
            Ok(reason) => Ok(session.finalize(&reason)),
            Err(Fault::Transport(source)) => {
                error!("transport failed: {source}");
                let report = session.finalize(&StopReason::TransportFault(source.to_string()));
                Err(PipelineError::Transport {
                    source,
                    report: Box::new(report),
                })
            }
            Err(Fault::Classifier { failures, last }) => {
                error!(failures, "classifier failures exceeded limit: {last}");
                let report = session.finalize(&StopReason::ClassifierFault(last.to_string()));
                Err(PipelineError::ClassifierEscalated {
                    failures,
                    last,
                    report: Box::new(report),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{ActuatorState, DigitalActuator, NullActuator};
    use crate::core::{scorer_fn, LiveAggregator, SeverityBands};
    use crate::transport::ReplayTransport;
    use std::io::Write;
    use std::sync::Mutex;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            poll_interval: Duration::ZERO,
            ..PipelineConfig::default()
        }
    }

    fn session() -> Session {
        Session::new(ActuatorController::new(Box::new(NullActuator), 0.5))
    }

    /// Transport that is always idle.
    struct Silent;

    impl Transport for Silent {
        fn read_line(&mut self) -> Result<ReadOutcome, TransportError> {
            thread::sleep(Duration::from_millis(1));
            Ok(ReadOutcome::Idle)
        }
    }

    /// One frame, then silence.
    struct SingleFrame {
        sent: bool,
    }

    impl Transport for SingleFrame {
        fn read_line(&mut self) -> Result<ReadOutcome, TransportError> {
            if std::mem::replace(&mut self.sent, true) {
                thread::sleep(Duration::from_millis(1));
                return Ok(ReadOutcome::Idle);
            }
            Ok(ReadOutcome::Line(b"512,512\n".to_vec()))
        }
    }

    /// Digital output bytes, readable after the session owns the writer.
    #[derive(Clone, Default)]
    struct PinOutput(Arc<Mutex<Vec<u8>>>);

    impl PinOutput {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for PinOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn digital_session(output: &PinOutput) -> Session {
        let actuator = DigitalActuator::new(output.clone());
        Session::new(ActuatorController::new(Box::new(actuator), 0.5))
    }

    #[test]
    fn test_stop_handle_shared_between_clones() {
        let handle = StopHandle::new();
        let other = handle.clone();
        assert!(!other.is_stopped());
        handle.stop();
        assert!(other.is_stopped());
    }

    #[test]
    fn test_end_of_stream_finalizes() {
        let transport = ReplayTransport::from_lines(["1,2", "junk", "3,4"]);
        let mut driver = PipelineDriver::new(
            transport,
            scorer_fn(|_| Ok([0.4, 0.6])),
            fast_config(),
        );

        let report = driver.run(session()).unwrap();
        assert_eq!(report.stop_reason, "end of stream");
        assert_eq!(report.stats.lines_read, 3);
        assert_eq!(report.stats.frames_skipped, 1);
        assert_eq!(report.stats.inferences, 2);
        assert_eq!(report.stats.actuations, 1);
        assert_eq!(report.latency.as_ref().map(|l| l.count), Some(2));
        assert!((report.mean_stress_pct.unwrap() - 60.0).abs() < 1e-3);
    }

    #[test]
    fn test_cancel_before_first_read() {
        let mut driver = PipelineDriver::new(Silent, scorer_fn(|_| Ok([1.0, 0.0])), fast_config());
        driver.stop_handle().stop();

        let report = driver.run(session()).unwrap();
        assert_eq!(report.stop_reason, "cancelled");
        assert_eq!(report.stats.lines_read, 0);
        assert!(report.mean_stress_pct.is_none());
    }

    #[test]
    fn test_duration_cap() {
        let config = PipelineConfig {
            max_duration: Some(Duration::from_millis(20)),
            transport_timeout: Duration::from_secs(60),
            ..fast_config()
        };
        let mut driver = PipelineDriver::new(Silent, scorer_fn(|_| Ok([1.0, 0.0])), config);

        let report = driver.run(session()).unwrap();
        assert_eq!(report.stop_reason, "duration elapsed");
    }

    #[test]
    fn test_cancel_while_engaged_drives_output_low() {
        let output = PinOutput::default();
        let stop = StopHandle::new();
        let stop_after_first = stop.clone();
        let scorer = scorer_fn(move |_| {
            stop_after_first.stop();
            Ok([0.1, 0.9])
        });

        let report = PipelineDriver::new(SingleFrame { sent: false }, scorer, fast_config())
            .with_stop_handle(stop)
            .run(digital_session(&output))
            .unwrap();

        assert_eq!(report.stop_reason, "cancelled");
        assert_eq!(report.stats.inferences, 1);
        assert_eq!(output.text(), "10");
    }

    #[test]
    fn test_duration_cap_while_engaged_drives_output_low() {
        let output = PinOutput::default();
        let config = PipelineConfig {
            max_duration: Some(Duration::from_millis(20)),
            transport_timeout: Duration::from_secs(60),
            ..fast_config()
        };

        let report = PipelineDriver::new(
            SingleFrame { sent: false },
            scorer_fn(|_| Ok([0.0, 1.0])),
            config,
        )
        .run(digital_session(&output))
        .unwrap();

        assert_eq!(report.stop_reason, "duration elapsed");
        assert_eq!(report.stats.actuations, 1);
        assert_eq!(output.text(), "10");
    }

    #[test]
    fn test_silence_timeout_while_engaged_drives_output_low() {
        let output = PinOutput::default();
        let config = PipelineConfig {
            transport_timeout: Duration::from_millis(10),
            ..fast_config()
        };

        let err = PipelineDriver::new(
            SingleFrame { sent: false },
            scorer_fn(|_| Ok([0.0, 1.0])),
            config,
        )
        .run(digital_session(&output))
        .unwrap_err();

        assert!(err.report().stop_reason.starts_with("transport fault"));
        assert_eq!(output.text(), "10");
    }

    #[test]
    fn test_relative_time_starts_when_run_begins() {
        let aggregator =
            SharedAggregator::new(LiveAggregator::new(Duration::from_secs(60), SeverityBands::default()));
        let session = session().with_aggregator(aggregator.clone());
        thread::sleep(Duration::from_millis(200));

        PipelineDriver::new(
            ReplayTransport::from_lines(["1,2"]),
            scorer_fn(|_| Ok([0.5, 0.5])),
            fast_config(),
        )
        .run(session)
        .unwrap();

        let first = aggregator.snapshot().points[0].time_secs;
        assert!(first < 0.15, "first point at {first}s includes setup time");
    }

    #[test]
    fn test_silence_becomes_transport_timeout() {
        let config = PipelineConfig {
            transport_timeout: Duration::from_millis(10),
            ..fast_config()
        };
        let mut driver = PipelineDriver::new(Silent, scorer_fn(|_| Ok([1.0, 0.0])), config);

        let err = driver.run(session()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Transport {
                source: TransportError::Timeout(_),
                ..
            }
        ));
        assert!(err.report().stop_reason.starts_with("transport fault"));
    }

    #[test]
    fn test_aggregator_receives_every_inference() {
        let aggregator =
            SharedAggregator::new(LiveAggregator::new(Duration::from_secs(60), SeverityBands::default()));
        let transport = ReplayTransport::from_lines(["1,2", "3,4", "5,6"]);
        let mut driver =
            PipelineDriver::new(transport, scorer_fn(|_| Ok([0.8, 0.2])), fast_config());

        driver
            .run(session().with_aggregator(aggregator.clone()))
            .unwrap();

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.total_samples, 3);
        assert!((snapshot.mean_pct - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut session = session();
        let first = session.finalize(&StopReason::EndOfStream);
        let second = session.finalize(&StopReason::Cancelled);

        assert!(session.is_finalized());
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(second.stop_reason, "end of stream");
        assert_eq!(session.controller().state(), ActuatorState::Disengaged);
    }
}
