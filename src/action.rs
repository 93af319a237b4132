//! Key actions
//!
//! Every entry in a layer is one of these.  The small `const fn` builders at
//! the bottom are what the keymap tables are written in, so a table row reads
//! close to the way the keyboard is drawn.

use usbd_human_interface_device::page::Keyboard;

use crate::layer::LayerId;
use crate::Mods;

/// A code to send to the host: a key, and the modifiers that need to be held
/// while it is down.  Shifted symbols (`$`, `{`, ...) are a single code this
/// way.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct KeyCode {
    pub key: Keyboard,
    pub mods: Mods,
}

impl KeyCode {
    pub const fn new(key: Keyboard) -> Self {
        KeyCode { key, mods: Mods::empty() }
    }

    pub const fn with_mods(key: Keyboard, mods: Mods) -> Self {
        KeyCode { key, mods }
    }

    /// This code with left Alt and left GUI exchanged, both as the key itself
    /// and in the modifiers.
    pub fn swap_alt_gui(self) -> Self {
        let key = match self.key {
            Keyboard::LeftAlt => Keyboard::LeftGUI,
            Keyboard::LeftGUI => Keyboard::LeftAlt,
            Keyboard::RightAlt => Keyboard::RightGUI,
            Keyboard::RightGUI => Keyboard::RightAlt,
            other => other,
        };
        KeyCode { key, mods: self.mods.swap_alt_gui() }
    }
}

/// How a layer toggle behaves.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ToggleMode {
    /// The layer is on while the key is held.
    Momentary,
    /// Pressing the key makes the layer the new default, and saves it.
    SetPersistentDefault,
}

/// What a dual-role key does once it is decided that it is being held.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum HoldAction {
    Modifier(Mods),
    Layer(LayerId),
}

/// A custom event, passed through to the keymap's own handler.  The ids mean
/// whatever the keymap defines them to mean.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CustomEvent(pub u16);

/// The action bound to a key on a single layer.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum KeyAction {
    /// Look at the next active layer down.
    PassThrough,
    /// Do nothing, and don't look any further.
    NoOp,
    SimpleCode(KeyCode),
    LayerToggle(LayerId, ToggleMode),
    /// A tap sends `tap`, holding (or pressing another key while this one is
    /// down) does `hold` instead.
    DualRole { tap: KeyCode, hold: HoldAction },
    Custom(CustomEvent),
}

impl KeyAction {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, KeyAction::PassThrough)
    }

    /// The layer this action refers to, if any.
    pub fn layer(&self) -> Option<LayerId> {
        match *self {
            KeyAction::LayerToggle(layer, _) => Some(layer),
            KeyAction::DualRole { hold: HoldAction::Layer(layer), .. } => Some(layer),
            _ => None,
        }
    }
}

/// Fall through to the layer below.
pub const TRNS: KeyAction = KeyAction::PassThrough;

/// A dead key.
pub const NO: KeyAction = KeyAction::NoOp;

/// A plain key.
pub const fn k(key: Keyboard) -> KeyAction {
    KeyAction::SimpleCode(KeyCode::new(key))
}

/// A key sent with shift held.
pub const fn s(key: Keyboard) -> KeyAction {
    KeyAction::SimpleCode(KeyCode::with_mods(key, Mods::SHIFT))
}

/// Momentary layer.
pub const fn mo(layer: LayerId) -> KeyAction {
    KeyAction::LayerToggle(layer, ToggleMode::Momentary)
}

/// Set the persistent default layer.
pub const fn df(layer: LayerId) -> KeyAction {
    KeyAction::LayerToggle(layer, ToggleMode::SetPersistentDefault)
}

/// Tap for `key`, hold for `layer`.
pub const fn lt(layer: LayerId, key: Keyboard) -> KeyAction {
    KeyAction::DualRole { tap: KeyCode::new(key), hold: HoldAction::Layer(layer) }
}

/// Tap for `key`, hold for `mods`.
pub const fn mt(mods: Mods, key: Keyboard) -> KeyAction {
    KeyAction::DualRole { tap: KeyCode::new(key), hold: HoldAction::Modifier(mods) }
}

/// Hand the event to the keymap's custom handler.
pub const fn cu(event: CustomEvent) -> KeyAction {
    KeyAction::Custom(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_alt_gui() {
        let code = KeyCode::with_mods(Keyboard::LeftAlt, Mods::ALT | Mods::SHIFT);
        let swapped = code.swap_alt_gui();
        assert_eq!(swapped.key, Keyboard::LeftGUI);
        assert_eq!(swapped.mods, Mods::GUI | Mods::SHIFT);
        assert_eq!(swapped.swap_alt_gui(), code);

        let plain = KeyCode::new(Keyboard::Q);
        assert_eq!(plain.swap_alt_gui(), plain);
    }

    #[test]
    fn layer_refs() {
        assert_eq!(mo(LayerId(4)).layer(), Some(LayerId(4)));
        assert_eq!(lt(LayerId(6), Keyboard::S).layer(), Some(LayerId(6)));
        assert_eq!(mt(Mods::ALT, Keyboard::Space).layer(), None);
        assert_eq!(k(Keyboard::A).layer(), None);
        assert!(TRNS.is_pass_through());
        assert!(!NO.is_pass_through());
    }
}
