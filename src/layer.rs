//! Layers and keymaps.
//!
//! A layer is a complete table of actions, one per key.  A keymap is the
//! ordered set of layers, plus the tri-layer rules and the layer the board
//! boots into when nothing has been saved.  All of the checking of a keymap
//! happens once, in [`Keymap::new`], so nothing at key time has to handle a
//! reference to a layer that doesn't exist.

use core::fmt;

use arrayvec::ArrayVec;

use crate::action::{KeyAction, ToggleMode};
use crate::keys::{KeyPosition, COLS, ROWS};

/// The layer state is a 32-bit mask, which bounds the number of layers.
pub const MAX_LAYERS: usize = 32;

/// Maximum number of tri-layer rules in a keymap.
pub const MAX_TRI_LAYERS: usize = 4;

/// Layers are identified by their index in the keymap.  Higher ids take
/// precedence over lower ones.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LayerId(pub u8);

impl LayerId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn bit(self) -> u32 {
        1 << self.0
    }
}

/// A single layer.
pub type Layer = [[KeyAction; COLS]; ROWS];

/// When both `lower` and `raise` are active, `adjust` becomes active as well.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct TriLayer {
    pub lower: LayerId,
    pub raise: LayerId,
    pub adjust: LayerId,
}

/// Problems with a keymap, found when it is loaded.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ConfigError {
    /// A keymap needs at least its default layer.
    NoLayers,
    /// More layers than the layer mask can hold.
    TooManyLayers(usize),
    /// More tri-layer rules than we have room for.
    TooManyTriLayers(usize),
    /// Something refers to a layer the keymap doesn't have.
    InvalidLayerId(LayerId),
    /// A layer that can become the default has a key that falls through.
    NotTotal { layer: LayerId, position: KeyPosition },
    /// The combined layer of a tri-layer rule must outrank both of its parts.
    TriLayerOrder(TriLayer),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoLayers => write!(f, "keymap has no layers"),
            ConfigError::TooManyLayers(n) => {
                write!(f, "keymap has {} layers, at most {} supported", n, MAX_LAYERS)
            }
            ConfigError::TooManyTriLayers(n) => {
                write!(f, "keymap has {} tri-layers, at most {} supported", n, MAX_TRI_LAYERS)
            }
            ConfigError::InvalidLayerId(id) => write!(f, "reference to unknown layer {}", id.0),
            ConfigError::NotTotal { layer, position } => write!(
                f,
                "default layer {} passes through at row {} col {}",
                layer.0, position.row, position.col
            ),
            ConfigError::TriLayerOrder(tri) => write!(
                f,
                "tri-layer {} must be above layers {} and {}",
                tri.adjust.0, tri.lower.0, tri.raise.0
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

/// A checked set of layers.
///
/// This only borrows the static tables, so it is cheap to copy around.
#[derive(Clone, Copy, Debug)]
pub struct Keymap {
    layers: &'static [Layer],
    tri_layers: &'static [TriLayer],
    default: LayerId,
}

impl Keymap {
    /// Check a set of layers and build the keymap.
    ///
    /// Every layer id mentioned by an action or a tri-layer must exist, and
    /// any layer that can end up as the default (the initial one, and the
    /// targets of every `SetPersistentDefault`) must define something other
    /// than `PassThrough` at every position.
    pub fn new(
        layers: &'static [Layer],
        tri_layers: &'static [TriLayer],
        default: LayerId,
    ) -> Result<Keymap, ConfigError> {
        if layers.is_empty() {
            return Err(ConfigError::NoLayers);
        }
        if layers.len() > MAX_LAYERS {
            return Err(ConfigError::TooManyLayers(layers.len()));
        }
        if tri_layers.len() > MAX_TRI_LAYERS {
            return Err(ConfigError::TooManyTriLayers(tri_layers.len()));
        }

        let keymap = Keymap { layers, tri_layers, default };
        keymap.check_id(default)?;

        for tri in tri_layers {
            keymap.check_id(tri.lower)?;
            keymap.check_id(tri.raise)?;
            keymap.check_id(tri.adjust)?;
            if tri.adjust <= tri.lower || tri.adjust <= tri.raise {
                return Err(ConfigError::TriLayerOrder(*tri));
            }
        }

        let mut defaults: ArrayVec<LayerId, MAX_LAYERS> = ArrayVec::new();
        defaults.push(default);
        for layer in layers {
            for action in layer.iter().flatten() {
                if let Some(id) = action.layer() {
                    keymap.check_id(id)?;
                }
                if let KeyAction::LayerToggle(id, ToggleMode::SetPersistentDefault) = action {
                    if !defaults.contains(id) {
                        defaults.push(*id);
                    }
                }
            }
        }

        for id in defaults {
            keymap.check_total(id)?;
        }

        Ok(keymap)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The layer used when nothing has been persisted.
    pub fn default_layer(&self) -> LayerId {
        self.default
    }

    pub fn tri_layers(&self) -> &'static [TriLayer] {
        self.tri_layers
    }

    /// Does this layer exist.
    pub fn contains(&self, id: LayerId) -> bool {
        id.index() < self.layers.len()
    }

    /// Look up a single entry.  Missing layers or positions read as
    /// `PassThrough`.
    pub fn action_at(&self, id: LayerId, position: KeyPosition) -> KeyAction {
        self.layers
            .get(id.index())
            .and_then(|layer| layer.get(position.row as usize))
            .and_then(|row| row.get(position.col as usize))
            .copied()
            .unwrap_or(KeyAction::PassThrough)
    }

    /// Check that a layer exists and can serve as the default.
    pub fn check_default(&self, id: LayerId) -> Result<(), ConfigError> {
        self.check_id(id)?;
        self.check_total(id)
    }

    fn check_id(&self, id: LayerId) -> Result<(), ConfigError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(ConfigError::InvalidLayerId(id))
        }
    }

    fn check_total(&self, id: LayerId) -> Result<(), ConfigError> {
        match KeyPosition::all().find(|pos| self.action_at(id, *pos).is_pass_through()) {
            Some(position) => Err(ConfigError::NotTotal { layer: id, position }),
            None => Ok(()),
        }
    }
}
