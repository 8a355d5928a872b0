//! Digital output over the serial link.
//!
//! The board firmware drives its indicator pin high on `'1'` and low on `'0'`.

use super::{Actuator, ActuatorError, ActuatorState};
use std::io::Write;
use tracing::debug;

const ENGAGE_BYTE: u8 = b'1';
const DISENGAGE_BYTE: u8 = b'0';

/// Writes a single command byte per transition.
pub struct DigitalActuator<W> {
    writer: W,
}

impl<W: Write> DigitalActuator<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    fn send(&mut self, byte: u8) -> Result<(), ActuatorError> {
        self.writer.write_all(&[byte])?;
        self.writer.flush()?;
        debug!(byte = %(byte as char), "sent digital command");
        Ok(())
    }
}

impl<W: Write> Actuator for DigitalActuator<W> {
    fn name(&self) -> &'static str {
        "digital"
    }

    fn engage(&mut self) -> Result<(), ActuatorError> {
        self.send(ENGAGE_BYTE)
    }

    fn disengage(&mut self) -> Result<(), ActuatorError> {
        self.send(DISENGAGE_BYTE)
    }

    fn label(&self, state: ActuatorState) -> &str {
        match state {
            ActuatorState::Engaged => "ON",
            ActuatorState::Disengaged => "OFF",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_bytes() {
        let mut actuator = DigitalActuator::new(Vec::new());
        actuator.engage().unwrap();
        actuator.disengage().unwrap();
        actuator.engage().unwrap();
        actuator.release().unwrap();

        assert_eq!(actuator.get_ref().as_slice(), b"1010");
    }

    #[test]
    fn test_digital_labels() {
        let actuator = DigitalActuator::new(Vec::new());
        assert_eq!(actuator.label(ActuatorState::Engaged), "ON");
        assert_eq!(actuator.label(ActuatorState::Disengaged), "OFF");
    }
}
