//! The result of handling one event.

use arrayvec::ArrayVec;

use crate::action::{CustomEvent, KeyCode};
use crate::layer::LayerId;
use crate::log::warn;
use crate::stack::LayerState;
use crate::Mods;

/// Room for the commands a single event can produce: a pending dual-role
/// resolving, plus the down and up of a tap, with some to spare.
pub const MAX_COMMANDS: usize = 8;

/// Something for the host to do.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Command {
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    ModsSet(Mods),
    ModsClear(Mods),
    /// Pass to the keymap's custom handler.
    Custom { event: CustomEvent, pressed: bool },
    /// The default layer changed, and should be saved.
    PersistDefault(LayerId),
}

/// What came out of a single dispatch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Effect {
    commands: ArrayVec<Command, MAX_COMMANDS>,
    /// The layer stack after the event, if the event changed it.
    pub layers: Option<LayerState>,
}

impl Effect {
    pub fn new() -> Self {
        Effect::default()
    }

    /// Add a command.  Commands are discarded if there is no more room.
    pub fn push(&mut self, command: Command) {
        if self.commands.try_push(command).is_err() {
            warn!("Effect full, dropping command");
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Nothing to send, and no change to the layers.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.layers.is_none()
    }
}

impl IntoIterator for Effect {
    type Item = Command;
    type IntoIter = arrayvec::IntoIter<Command, MAX_COMMANDS>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}
