//! Line-oriented byte sources for the acquisition loop.
//!
//! The acquisition board prints one `"<fp1>,<fp2>\n"` frame per sample over a
//! serial link. This module hides the physical link behind the [`Transport`]
//! trait so the pipeline can run against a live device or a recorded session.

pub mod replay;
pub mod serial;

use std::time::Duration;
use thiserror::Error;

pub use replay::ReplayTransport;
pub use serial::{list_ports, SerialTransport};

/// Result of a single blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line, newline included if the source sent one.
    Line(Vec<u8>),
    /// The device read timeout elapsed before a full line arrived.
    Idle,
    /// A finite source has no more data.
    Eof,
}

/// A blocking, line-oriented byte source.
pub trait Transport {
    /// Block until the next line is available or the device timeout elapses.
    fn read_line(&mut self) -> Result<ReadOutcome, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_line(&mut self) -> Result<ReadOutcome, TransportError> {
        (**self).read_line()
    }
}

/// Errors raised by a transport. All of them end the session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no data received for {0:?}")]
    Timeout(Duration),

    #[error("device disconnected")]
    Disconnected,
}
