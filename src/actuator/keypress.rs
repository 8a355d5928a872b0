//! Key-press actuation against a virtual keyboard.
//!
//! Exactly one bound key is held at a time: the engage key while stressed,
//! the disengage key while relaxed. Switching releases the held key first.

use super::{Actuator, ActuatorError, ActuatorState};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A key the actuator can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Char(char),
    Space,
}

impl Key {
    pub fn label(&self) -> String {
        match self {
            Key::Char(c) => c.to_uppercase().collect(),
            Key::Space => "SPACE".to_string(),
        }
    }
}

/// Which key each state holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBindings {
    pub engage: Key,
    pub disengage: Key,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            engage: Key::Char('w'),
            disengage: Key::Space,
        }
    }
}

/// Virtual keyboard backend.
pub trait Keyboard {
    fn press(&mut self, key: Key) -> Result<(), ActuatorError>;
    fn release(&mut self, key: Key) -> Result<(), ActuatorError>;
}

/// A keyboard that only logs key transitions.
///
/// Stands in where no HID backend is available on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopKeyboard;

impl Keyboard for NoopKeyboard {
    fn press(&mut self, key: Key) -> Result<(), ActuatorError> {
        info!(key = %key.label(), "key press");
        Ok(())
    }

    fn release(&mut self, key: Key) -> Result<(), ActuatorError> {
        info!(key = %key.label(), "key release");
        Ok(())
    }
}

/// Holds the engage or disengage key on a [`Keyboard`].
pub struct KeyPressActuator<K> {
    keyboard: K,
    bindings: KeyBindings,
    held: Option<Key>,
    engage_label: String,
    disengage_label: String,
}

impl<K: Keyboard> KeyPressActuator<K> {
    pub fn new(keyboard: K, bindings: KeyBindings) -> Self {
        Self {
            keyboard,
            engage_label: bindings.engage.label(),
            disengage_label: bindings.disengage.label(),
            bindings,
            held: None,
        }
    }

    /// Key currently held down, if any.
    pub fn held(&self) -> Option<Key> {
        self.held
    }

    pub fn keyboard(&self) -> &K {
        &self.keyboard
    }

    fn hold(&mut self, key: Key) -> Result<(), ActuatorError> {
        if self.held == Some(key) {
            return Ok(());
        }
        if let Some(previous) = self.held {
            self.keyboard.release(previous)?;
            self.held = None;
        }
        self.keyboard.press(key)?;
        self.held = Some(key);
        Ok(())
    }
}

impl<K: Keyboard> Actuator for KeyPressActuator<K> {
    fn name(&self) -> &'static str {
        "keys"
    }

    fn engage(&mut self) -> Result<(), ActuatorError> {
        self.hold(self.bindings.engage)
    }

    fn disengage(&mut self) -> Result<(), ActuatorError> {
        self.hold(self.bindings.disengage)
    }

    /// Release both bound keys, whichever is believed to be held.
    fn release(&mut self) -> Result<(), ActuatorError> {
        let engage = self.keyboard.release(self.bindings.engage);
        let disengage = self.keyboard.release(self.bindings.disengage);
        self.held = None;
        engage.and(disengage)
    }

    fn label(&self, state: ActuatorState) -> &str {
        match state {
            ActuatorState::Engaged => &self.engage_label,
            ActuatorState::Disengaged => &self.disengage_label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct ScriptedKeyboard {
        events: Vec<(bool, Key)>,
    }

    impl Keyboard for ScriptedKeyboard {
        fn press(&mut self, key: Key) -> Result<(), ActuatorError> {
            self.events.push((true, key));
            Ok(())
        }

        fn release(&mut self, key: Key) -> Result<(), ActuatorError> {
            self.events.push((false, key));
            Ok(())
        }
    }

    const W: Key = Key::Char('w');

    #[test]
    fn test_engage_then_disengage_swaps_keys() {
        let mut actuator = KeyPressActuator::new(ScriptedKeyboard::default(), KeyBindings::default());

        actuator.engage().unwrap();
        assert_eq!(actuator.held(), Some(W));
        actuator.disengage().unwrap();
        assert_eq!(actuator.held(), Some(Key::Space));

        assert_eq!(
            actuator.keyboard().events,
            vec![(true, W), (false, W), (true, Key::Space)]
        );
    }

    #[test]
    fn test_first_disengage_presses_without_release() {
        let mut actuator = KeyPressActuator::new(ScriptedKeyboard::default(), KeyBindings::default());
        actuator.disengage().unwrap();
        actuator.engage().unwrap();

        assert_eq!(
            actuator.keyboard().events,
            vec![(true, Key::Space), (false, Key::Space), (true, W)]
        );
    }

    #[test]
    fn test_release_lets_go_of_both_keys() {
        let mut actuator = KeyPressActuator::new(ScriptedKeyboard::default(), KeyBindings::default());
        actuator.engage().unwrap();
        actuator.release().unwrap();

        assert_eq!(actuator.held(), None);
        assert_eq!(
            actuator.keyboard().events,
            vec![(true, W), (false, W), (false, Key::Space)]
        );
    }

    #[test]
    fn test_labels_follow_bindings() {
        let actuator = KeyPressActuator::new(
            NoopKeyboard,
            KeyBindings {
                engage: Key::Char('e'),
                disengage: Key::Char('q'),
            },
        );
        assert_eq!(actuator.label(ActuatorState::Engaged), "E");
        assert_eq!(actuator.label(ActuatorState::Disengaged), "Q");
    }
}
