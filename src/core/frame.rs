//! Frame parsing for the two-channel serial stream.
//!
//! The board prints `"<fp1>,<fp2>"` per line. Anything else, including lines
//! with signs, spaces inside a field or a single field, is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One parsed two-channel reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// First channel (Fp1)
    pub channel_a: f64,
    /// Second channel (Fp2)
    pub channel_b: f64,
    /// Wall-clock time the line was parsed
    pub arrival_time: DateTime<Utc>,
}

/// Rejection of a single line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed frame: {0:?}")]
    MalformedFrame(String),
}

/// Parse a raw line, stamping it with the current time.
pub fn parse(line: &[u8]) -> Result<Sample, ParseError> {
    parse_at(line, Utc::now())
}

/// Parse a raw line with an explicit arrival time.
pub fn parse_at(line: &[u8], arrival_time: DateTime<Utc>) -> Result<Sample, ParseError> {
    let (a, b) = split_fields(line)?;
    Ok(Sample {
        channel_a: to_channel(&a, line)?,
        channel_b: to_channel(&b, line)?,
        arrival_time,
    })
}

/// Validate a line and return its two leading fields as text.
///
/// Shared with raw capture, which stores the digits exactly as received.
pub fn split_fields(line: &[u8]) -> Result<(String, String), ParseError> {
    // Single byte per character; never fails on arbitrary input.
    let text: String = line.iter().map(|&b| b as char).collect();
    let mut fields = text.trim().split(',');

    match (fields.next(), fields.next()) {
        (Some(a), Some(b)) if is_digits(a) && is_digits(b) => Ok((a.to_string(), b.to_string())),
        _ => Err(ParseError::MalformedFrame(text)),
    }
}

fn is_digits(field: &str) -> bool {
    !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit())
}

fn to_channel(field: &str, line: &[u8]) -> Result<f64, ParseError> {
    field
        .parse::<f64>()
        .map_err(|_| ParseError::MalformedFrame(String::from_utf8_lossy(line).into_owned()))
}
