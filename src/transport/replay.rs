//! Replays recorded frames from a file or an in-memory buffer.

use super::{ReadOutcome, Transport, TransportError};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

/// A finite transport backed by any buffered reader.
///
/// Yields one line per read and [`ReadOutcome::Eof`] once the reader is
/// exhausted, which ends a session normally.
pub struct ReplayTransport<R> {
    reader: R,
}

impl<R: BufRead> ReplayTransport<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl ReplayTransport<BufReader<File>> {
    /// Replay a text file with one frame per line.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl ReplayTransport<Cursor<Vec<u8>>> {
    /// Replay the given lines, each terminated with `\n`.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut buffer = Vec::new();
        for line in lines {
            buffer.extend_from_slice(line.as_ref().as_bytes());
            buffer.push(b'\n');
        }
        Self::new(Cursor::new(buffer))
    }
}

impl<R: BufRead> Transport for ReplayTransport<R> {
    fn read_line(&mut self) -> Result<ReadOutcome, TransportError> {
        let mut line = Vec::new();
        match self.reader.read_until(b'\n', &mut line)? {
            0 => Ok(ReadOutcome::Eof),
            _ => Ok(ReadOutcome::Line(line)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_yields_lines_then_eof() {
        let mut transport = ReplayTransport::from_lines(["100,120", "garbage"]);

        assert_eq!(
            transport.read_line().unwrap(),
            ReadOutcome::Line(b"100,120\n".to_vec())
        );
        assert_eq!(
            transport.read_line().unwrap(),
            ReadOutcome::Line(b"garbage\n".to_vec())
        );
        assert_eq!(transport.read_line().unwrap(), ReadOutcome::Eof);
        assert_eq!(transport.read_line().unwrap(), ReadOutcome::Eof);
    }

    #[test]
    fn test_replay_last_line_without_newline() {
        let mut transport = ReplayTransport::new(Cursor::new(b"1,2\n3,4".to_vec()));

        assert_eq!(
            transport.read_line().unwrap(),
            ReadOutcome::Line(b"1,2\n".to_vec())
        );
        assert_eq!(
            transport.read_line().unwrap(),
            ReadOutcome::Line(b"3,4".to_vec())
        );
        assert_eq!(transport.read_line().unwrap(), ReadOutcome::Eof);
    }
}
