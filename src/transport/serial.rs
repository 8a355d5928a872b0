//! Serial-port transport for the acquisition board.

use super::{ReadOutcome, Transport, TransportError};
use serialport::{SerialPort, SerialPortInfo};
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound on a line with no terminator before it is discarded as noise.
const MAX_PARTIAL_LINE: usize = 4096;

/// A serial link that yields newline-terminated frames.
///
/// Bytes received before a read timeout are kept and completed by later
/// reads, so a frame split across timeouts is not lost.
pub struct SerialTransport {
    port_name: String,
    reader: BufReader<Box<dyn SerialPort>>,
    partial: Vec<u8>,
}

impl SerialTransport {
    /// Open the named port (e.g. `/dev/ttyACM0` or `COM7`).
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: port_name.to_string(),
                source,
            })?;

        info!(port = port_name, baud_rate, "serial connection established");

        Ok(Self {
            port_name: port_name.to_string(),
            reader: BufReader::new(port),
            partial: Vec::with_capacity(64),
        })
    }

    /// Name of the underlying port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Clone the port handle for writing back to the device.
    ///
    /// The digital actuator owns this handle; the transport keeps reading.
    pub fn writer(&self) -> Result<Box<dyn SerialPort>, TransportError> {
        Ok(self.reader.get_ref().try_clone()?)
    }

    fn take_line(&mut self) -> ReadOutcome {
        ReadOutcome::Line(std::mem::take(&mut self.partial))
    }
}

/// Move at most one buffered chunk from `reader` into `partial`.
///
/// Returns `true` once `partial` holds a full line. Never blocks for more
/// than one read, so a stream without terminators still returns control to
/// the caller between chunks.
fn read_chunk<R: BufRead>(reader: &mut R, partial: &mut Vec<u8>) -> io::Result<bool> {
    let (complete, used) = {
        let available = reader.fill_buf()?;
        match available.iter().position(|&b| b == b'\n') {
            Some(end) => {
                partial.extend_from_slice(&available[..=end]);
                (true, end + 1)
            }
            None => {
                partial.extend_from_slice(available);
                (false, available.len())
            }
        }
    };
    reader.consume(used);

    if !complete && partial.len() > MAX_PARTIAL_LINE {
        debug!(bytes = partial.len(), "discarding unterminated input");
        partial.clear();
    }
    Ok(complete)
}

impl Transport for SerialTransport {
    fn read_line(&mut self) -> Result<ReadOutcome, TransportError> {
        match read_chunk(&mut self.reader, &mut self.partial) {
            Ok(true) => Ok(self.take_line()),
            Ok(false) => Ok(ReadOutcome::Idle),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(ReadOutcome::Idle),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(ReadOutcome::Idle),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof
                ) =>
            {
                Err(TransportError::Disconnected)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// List serial ports visible to the host.
pub fn list_ports() -> Result<Vec<SerialPortInfo>, TransportError> {
    Ok(serialport::available_ports()?)
}
