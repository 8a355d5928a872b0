//! Debounced actuation driven by the stress decision.
//!
//! [`ActuatorController`] is a two-state machine. Every inference is checked
//! against the threshold, but the physical actuator is only touched when the
//! binary decision flips. Backends implement [`Actuator`]:
//!
//! - [`DigitalActuator`]: writes `'1'`/`'0'` back over the serial link
//! - [`KeyPressActuator`]: holds a key on a virtual keyboard
//! - [`NullActuator`]: monitor-only sessions

pub mod digital;
pub mod keypress;

use crate::core::Inference;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub use digital::DigitalActuator;
pub use keypress::{Key, KeyBindings, KeyPressActuator, Keyboard, NoopKeyboard};

/// Default stress decision threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Controller state. Sessions start `Disengaged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorState {
    Engaged,
    #[default]
    Disengaged,
}

/// What the controller did with one inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorCommand {
    Engage,
    Disengage,
    NoChange,
}

impl ActuatorCommand {
    pub fn is_actuation(&self) -> bool {
        !matches!(self, ActuatorCommand::NoChange)
    }
}

/// Errors from an actuator backend.
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("actuator write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("keyboard backend failed: {0}")]
    Keyboard(String),
}

/// A physical (or simulated) output the controller can switch.
pub trait Actuator {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    fn engage(&mut self) -> Result<(), ActuatorError>;

    fn disengage(&mut self) -> Result<(), ActuatorError>;

    /// Leave the output in its safe state at shutdown.
    fn release(&mut self) -> Result<(), ActuatorError> {
        self.disengage()
    }

    /// Label written to telemetry for a state.
    fn label(&self, state: ActuatorState) -> &str {
        match state {
            ActuatorState::Engaged => "ENGAGED",
            ActuatorState::Disengaged => "DISENGAGED",
        }
    }
}

/// Actuator for sessions that only classify and record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullActuator;

impl Actuator for NullActuator {
    fn name(&self) -> &'static str {
        "none"
    }

    fn engage(&mut self) -> Result<(), ActuatorError> {
        Ok(())
    }

    fn disengage(&mut self) -> Result<(), ActuatorError> {
        Ok(())
    }

    fn label(&self, state: ActuatorState) -> &str {
        match state {
            ActuatorState::Engaged => "STRESS",
            ActuatorState::Disengaged => "RELAX",
        }
    }
}

/// Two-state debounced controller owning the actuator handle.
pub struct ActuatorController {
    actuator: Box<dyn Actuator + Send>,
    state: ActuatorState,
    threshold: f64,
    transitions: u64,
    /// Set after a backend failure: the physical output may not match `state`
    resync: bool,
}

impl ActuatorController {
    pub fn new(actuator: Box<dyn Actuator + Send>, threshold: f64) -> Self {
        Self {
            actuator,
            state: ActuatorState::Disengaged,
            threshold,
            transitions: 0,
            resync: false,
        }
    }

    /// Target state for a stress probability.
    pub fn decide(&self, probability: f64) -> ActuatorState {
        if probability >= self.threshold {
            ActuatorState::Engaged
        } else {
            ActuatorState::Disengaged
        }
    }

    /// Evaluate one inference and switch the actuator if the decision flipped.
    ///
    /// If the backend fails the state is left unchanged and the next
    /// inference drives the backend toward its decision even when that
    /// decision matches the stored state. A failed switch may have left the
    /// output in neither position.
    pub fn update(&mut self, inference: &Inference) -> Result<ActuatorCommand, ActuatorError> {
        let target = self.decide(inference.probability);
        if target == self.state && !self.resync {
            return Ok(ActuatorCommand::NoChange);
        }

        let (result, command) = match target {
            ActuatorState::Engaged => (self.actuator.engage(), ActuatorCommand::Engage),
            ActuatorState::Disengaged => (self.actuator.disengage(), ActuatorCommand::Disengage),
        };
        if let Err(e) = result {
            self.resync = true;
            return Err(e);
        }

        if self.resync {
            self.resync = false;
            debug!(actuator = self.actuator.name(), ?command, "actuator resynchronized");
        }
        if target != self.state {
            self.state = target;
            self.transitions += 1;
            debug!(actuator = self.actuator.name(), ?command, "actuator switched");
        }
        Ok(command)
    }

    /// Put the actuator in its safe state regardless of the last decision.
    pub fn release(&mut self) -> Result<(), ActuatorError> {
        self.state = ActuatorState::Disengaged;
        let result = self.actuator.release();
        self.resync = result.is_err();
        info!(actuator = self.actuator.name(), ok = result.is_ok(), "actuator released");
        result
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    /// Telemetry label for the current state.
    pub fn label(&self) -> &str {
        self.actuator.label(self.state)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn actuator_name(&self) -> &'static str {
        self.actuator.name()
    }
}
