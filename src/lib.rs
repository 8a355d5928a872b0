//! EEG Stress Agent - real-time stress detection from a two-channel EEG
//! headset, driving an actuator from the decision.
//!
//! The acquisition board streams `"<fp1>,<fp2>"` lines over a serial link.
//! Each valid line is scored by a binary classifier; the stress probability
//! switches an actuator (a digital output on the board or a held key) and is
//! recorded to a CSV log and an optional live window.
//!
//! # Guarantees
//!
//! - **Debounced actuation**: the actuator is touched only when the decision flips
//! - **Strict ordering**: one inference per valid line, recorded in arrival order
//! - **Safe shutdown**: every session ends with the actuator released and the log closed
//! - **Non-blocking logging**: telemetry failures never stop actuation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        EEG Stress Agent                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────┐   ┌────────────┐   ┌───────────┐  │
//! │  │ Transport │──▶│   Frame   │──▶│ Classifier │──▶│ Actuator  │  │
//! │  │ (serial)  │   │  Parser   │   │  Adapter   │   │Controller │  │
//! │  └───────────┘   └───────────┘   └────────────┘   └───────────┘  │
//! │                                        │                         │
//! │                          ┌─────────────┴─────────────┐           │
//! │                          ▼                           ▼           │
//! │                   ┌─────────────┐             ┌─────────────┐    │
//! │                   │  Telemetry  │             │    Live     │    │
//! │                   │  Recorder   │             │ Aggregator  │    │
//! │                   └─────────────┘             └─────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use eeg_stress_agent::{
//!     actuator::{ActuatorController, NullActuator},
//!     core::SoftmaxScorer,
//!     pipeline::{PipelineConfig, PipelineDriver, Session},
//!     transport::SerialTransport,
//! };
//! use std::time::Duration;
//!
//! let transport = SerialTransport::open("/dev/ttyACM0", 115_200, Duration::from_secs(1))?;
//! let scorer = SoftmaxScorer::load("model.json")?;
//! let session = Session::new(ActuatorController::new(Box::new(NullActuator), 0.5));
//!
//! let mut driver = PipelineDriver::new(transport, scorer, PipelineConfig::default());
//! let report = driver.run(session)?;
//! println!("{}", report.summary());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod actuator;
pub mod capture;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod telemetry;
pub mod transport;

// Re-export key types at crate root for convenience
pub use actuator::{
    Actuator, ActuatorCommand, ActuatorController, ActuatorError, ActuatorState, DigitalActuator,
    KeyPressActuator, NullActuator,
};
pub use capture::{run_capture, CaptureError, CaptureSummary, CaptureWriter};
pub use config::{ActuatorKind, Config, ConfigError};
pub use core::{
    ClassifierAdapter, ClassifierError, Inference, LiveAggregator, ParseError, Sample, Scorer,
    SeverityBand, SharedAggregator, SlidingWindow, SoftmaxScorer,
};
pub use pipeline::{PipelineConfig, PipelineDriver, PipelineError, Session, StopHandle, StopReason};
pub use telemetry::{SessionReport, TelemetryError, TelemetryRecord, TelemetryRecorder};
pub use transport::{ReadOutcome, ReplayTransport, SerialTransport, Transport, TransportError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
