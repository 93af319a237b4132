//! BBQ layers
//!
//! Layer-stack key resolution for small keyboards.  A keymap is a set of
//! layers, each a full table of actions for every key on the board.  Some of
//! those actions turn other layers on and off, so what a key does depends on
//! which layers are active when it goes down.
//!
//! The hard parts of a keyboard (scanning, debounce, USB reports, flash) live
//! in the host firmware.  This crate takes key events in and hands back what
//! should be sent, through the [`layout::LayoutActions`] trait.

#![cfg_attr(not(any(feature = "std", test)), no_std)]
// #![deny(missing_docs)]

#[cfg(not(any(feature = "std", test)))]
extern crate core as std;

extern crate alloc;

use bitflags::bitflags;

pub use usbd_human_interface_device::page::Keyboard;

pub use action::{CustomEvent, HoldAction, KeyAction, KeyCode, ToggleMode};
pub use effect::{Command, Effect};
pub use keys::KeyPosition;
pub use layer::{ConfigError, Keymap, Layer, LayerId, TriLayer};
pub use layout::{LayoutActions, LayoutManager, Settings};
pub use resolver::{resolve, DualRoleState, Resolver};
pub use stack::{LayerStack, LayerState};
pub use store::{ConfigStore, KeymapConfig, MemStore, StoreError};

pub mod action;
pub mod effect;
pub mod keys;
pub mod layer;
pub mod layout;
pub mod resolver;
pub mod stack;
pub mod store;

#[cfg(test)]
mod testlog;

cfg_if::cfg_if! {
    if #[cfg(any(test, feature = "log"))] {
        mod log {
            pub use log::{debug, info, warn};
        }
    } else if #[cfg(feature = "defmt")] {
        mod log {
            pub use defmt::{debug, info, warn};
        }
    } else {
        mod log {
            macro_rules! discard {
                ($($arg:tt)*) => {{}};
            }
            pub(crate) use discard as debug;
            pub(crate) use discard as info;
            pub(crate) use discard as warn;
        }
    }
}

/// Key events indicate a key on the matrix going up or down.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct KeyEvent {
    /// Which switch changed.
    pub position: KeyPosition,
    /// True for a press, false for a release.
    pub pressed: bool,
    /// When the scan saw the change, in ticks.
    pub timestamp: u64,
}

impl KeyEvent {
    pub fn press(position: KeyPosition, timestamp: u64) -> Self {
        KeyEvent { position, pressed: true, timestamp }
    }

    pub fn release(position: KeyPosition, timestamp: u64) -> Self {
        KeyEvent { position, pressed: false, timestamp }
    }

    pub fn key(&self) -> KeyPosition {
        self.position
    }

    pub fn is_press(&self) -> bool {
        self.pressed
    }

    pub fn is_release(&self) -> bool {
        !self.pressed
    }
}

bitflags! {
    /// A modifier map. This indicates what modifiers should be held down when
    /// this keypress is sent.
    #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
    pub struct Mods: u8 {
        const SHIFT = 0b0000_0001;
        const CONTROL = 0b0000_0010;
        const ALT = 0b0000_0100;
        const GUI = 0b0000_1000;
    }
}

impl Mods {
    /// Exchange the Alt and GUI bits, leaving the others alone.
    pub fn swap_alt_gui(self) -> Mods {
        let mut result = self & !(Mods::ALT | Mods::GUI);
        if self.contains(Mods::ALT) {
            result |= Mods::GUI;
        }
        if self.contains(Mods::GUI) {
            result |= Mods::ALT;
        }
        result
    }
}
