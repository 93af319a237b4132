//! The layer stack.
//!
//! There is always a default layer, and it is always at the bottom.  Above it,
//! layers can be active for three reasons:
//!
//! - Momentary.  Something is holding the layer on.  These are counted, so two
//!   keys holding the same layer nest properly, and releasing a key that has
//!   nothing to release never takes the count below zero.
//! - Latched.  Turned on until something explicitly turns it off.
//! - Derived.  A tri-layer whose two parts are both on.
//!
//! Among the active layers, the higher id wins.  This makes the result depend
//! only on which layers are on, never on the order they were turned on.

use arrayvec::ArrayVec;

use crate::layer::{Keymap, LayerId, TriLayer, MAX_LAYERS, MAX_TRI_LAYERS};
use crate::log::info;

/// A snapshot of the stack, for reporting to the host.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LayerState {
    /// Mask of the active layers above the default.
    pub active: u32,
    pub default: LayerId,
}

impl LayerState {
    pub fn is_active(&self, id: LayerId) -> bool {
        id == self.default || (id.index() < MAX_LAYERS && self.active & id.bit() != 0)
    }
}

pub struct LayerStack {
    default: LayerId,
    counts: [u8; MAX_LAYERS],
    latched: u32,
    derived: u32,
    tri_layers: ArrayVec<TriLayer, MAX_TRI_LAYERS>,
}

impl LayerStack {
    /// A stack with only the default layer active.
    pub fn new(default: LayerId) -> Self {
        LayerStack {
            default,
            counts: [0; MAX_LAYERS],
            latched: 0,
            derived: 0,
            tri_layers: ArrayVec::new(),
        }
    }

    /// A stack using the tri-layer rules of the given keymap.
    pub fn for_keymap(keymap: &Keymap, default: LayerId) -> Self {
        let mut stack = LayerStack::new(default);
        stack.tri_layers.extend(keymap.tri_layers().iter().copied());
        stack
    }

    pub fn default_layer(&self) -> LayerId {
        self.default
    }

    pub fn state(&self) -> LayerState {
        LayerState {
            active: self.held() | self.derived,
            default: self.default,
        }
    }

    pub fn is_active(&self, id: LayerId) -> bool {
        self.state().is_active(id)
    }

    /// Active layers, highest priority first.  The default layer is always
    /// last.
    pub fn iter(&self) -> impl Iterator<Item = LayerId> {
        let active = self.held() | self.derived;
        let default = self.default;
        (0..MAX_LAYERS as u8)
            .rev()
            .map(LayerId)
            .filter(move |id| active & id.bit() != 0 && *id != default)
            .chain(core::iter::once(default))
    }

    /// Momentarily turn a layer on.
    pub fn activate(&mut self, id: LayerId) {
        let Some(count) = self.counts.get_mut(id.index()) else {
            return;
        };
        *count = count.saturating_add(1);
        if *count == 1 {
            info!("layer on: {}", id.0);
        }
        self.update_tri_layers();
    }

    /// Drop one momentary hold on a layer.  Does nothing if nothing is holding
    /// it.
    pub fn deactivate(&mut self, id: LayerId) {
        let Some(count) = self.counts.get_mut(id.index()) else {
            return;
        };
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            info!("layer off: {}", id.0);
        }
        self.update_tri_layers();
    }

    /// Turn a layer on until it is explicitly turned off.
    pub fn latch(&mut self, id: LayerId) {
        if id.index() < MAX_LAYERS {
            self.latched |= id.bit();
            info!("layer latched: {}", id.0);
            self.update_tri_layers();
        }
    }

    pub fn unlatch(&mut self, id: LayerId) {
        if id.index() < MAX_LAYERS {
            self.latched &= !id.bit();
            info!("layer unlatched: {}", id.0);
            self.update_tri_layers();
        }
    }

    /// Turn a layer fully off, however it was turned on.  Keys still holding
    /// it will find nothing to release.
    pub fn force_off(&mut self, id: LayerId) {
        if id.index() < MAX_LAYERS {
            self.counts[id.index()] = 0;
            self.latched &= !id.bit();
            self.update_tri_layers();
        }
    }

    /// Make `id` the new default, and turn everything else off.
    pub fn set_default(&mut self, id: LayerId) {
        info!("default layer: {}", id.0);
        self.default = id;
        self.clear();
    }

    /// Drop back to only the default layer.
    pub fn clear(&mut self) {
        self.counts = [0; MAX_LAYERS];
        self.latched = 0;
        self.derived = 0;
    }

    /// Mask of layers turned on directly, momentary or latched.
    fn held(&self) -> u32 {
        let momentary = self
            .counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .fold(0u32, |mask, (i, _)| mask | (1 << i));
        momentary | self.latched
    }

    fn update_tri_layers(&mut self) {
        let held = self.held();
        self.derived = self
            .tri_layers
            .iter()
            .filter(|tri| held & tri.lower.bit() != 0 && held & tri.raise.bit() != 0)
            .fold(0, |mask, tri| mask | tri.adjust.bit());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    const LOWER: LayerId = LayerId(5);
    const RAISE: LayerId = LayerId(4);
    const ADJUST: LayerId = LayerId(9);

    fn tri_stack() -> LayerStack {
        let mut stack = LayerStack::new(LayerId(0));
        stack.tri_layers.push(TriLayer { lower: LOWER, raise: RAISE, adjust: ADJUST });
        stack
    }

    fn order(stack: &LayerStack) -> Vec<u8> {
        stack.iter().map(|id| id.0).collect()
    }

    #[test]
    fn default_only() {
        let stack = LayerStack::new(LayerId(2));
        assert_eq!(order(&stack), [2]);
        assert!(stack.is_active(LayerId(2)));
        assert!(!stack.is_active(LayerId(0)));
    }

    #[test]
    fn momentary_order_does_not_matter() {
        let mut ab = LayerStack::new(LayerId(0));
        ab.activate(LayerId(3));
        ab.activate(LayerId(6));
        let mut ba = LayerStack::new(LayerId(0));
        ba.activate(LayerId(6));
        ba.activate(LayerId(3));
        assert_eq!(ab.state(), ba.state());
        assert_eq!(order(&ab), [6, 3, 0]);
    }

    #[test]
    fn default_is_always_last() {
        // A default with a high id still sits below everything else.
        let mut stack = LayerStack::new(LayerId(10));
        stack.activate(LayerId(4));
        assert_eq!(order(&stack), [4, 10]);
    }

    #[test]
    fn counted_holds() {
        let mut stack = LayerStack::new(LayerId(0));
        stack.activate(LOWER);
        stack.activate(LOWER);
        stack.deactivate(LOWER);
        assert!(stack.is_active(LOWER));
        stack.deactivate(LOWER);
        assert!(!stack.is_active(LOWER));

        // Extra releases don't underflow.
        stack.deactivate(LOWER);
        stack.activate(LOWER);
        assert!(stack.is_active(LOWER));
    }

    #[test]
    fn tri_layer() {
        for first_lower in [true, false] {
            let mut stack = tri_stack();
            if first_lower {
                stack.activate(LOWER);
                stack.activate(RAISE);
            } else {
                stack.activate(RAISE);
                stack.activate(LOWER);
            }
            assert_eq!(order(&stack), [9, 5, 4, 0]);

            stack.deactivate(RAISE);
            assert_eq!(order(&stack), [5, 0]);
            stack.activate(RAISE);
            stack.deactivate(LOWER);
            assert_eq!(order(&stack), [4, 0]);
        }
    }

    #[test]
    fn latch_and_force_off() {
        let mut stack = tri_stack();
        stack.activate(LOWER);
        stack.activate(RAISE);
        stack.force_off(LOWER);
        stack.force_off(RAISE);
        stack.latch(LayerId(8));
        assert_eq!(order(&stack), [8, 0]);

        // The keys that were holding the layers let go later.
        stack.deactivate(LOWER);
        stack.deactivate(RAISE);
        assert_eq!(order(&stack), [8, 0]);

        stack.unlatch(LayerId(8));
        assert_eq!(order(&stack), [0]);
    }

    #[test]
    fn set_default_collapses() {
        let mut stack = tri_stack();
        stack.activate(LOWER);
        stack.activate(RAISE);
        stack.latch(LayerId(8));
        stack.set_default(LayerId(1));
        assert_eq!(order(&stack), [1]);
        assert_eq!(stack.state(), LayerState { active: 0, default: LayerId(1) });
    }

    #[test]
    fn out_of_range_ids_are_ignored() {
        let mut stack = LayerStack::new(LayerId(0));
        stack.activate(LayerId(40));
        stack.latch(LayerId(40));
        stack.force_off(LayerId(40));
        assert_eq!(order(&stack), [0]);
    }
}
