//! Key resolution.
//!
//! [`resolve`] answers "what does this key do right now": walk the active
//! layers from the top, and take the first entry that isn't `PassThrough`.
//!
//! [`Resolver`] is the stateful part.  It remembers what each key resolved to
//! when it went down, so the release undoes the right thing even if the layers
//! have changed in between, and it runs the tap/hold decision for dual-role
//! keys:
//!
//! - A dual-role key going down is pending.  Nothing is sent yet.
//! - If it comes back up before the tapping term, it was a tap: the tap code
//!   is sent down and then up.
//! - If the tapping term passes, or any other key goes down while it is
//!   pending, it is a hold: the hold action starts, and ends when the key is
//!   released.
//!
//! Time only moves forward through the timestamps of events and through
//! [`Resolver::tick`].  Before an event is handled, anything whose tapping
//! term has run out by the event's timestamp is resolved as a hold first.  So
//! a key released at exactly the tapping term is a hold, and when a timeout
//! and another key press land together the hold is started before the new key
//! is looked up, which is the same result the interrupting press alone would
//! give.

use crate::action::{HoldAction, KeyAction, KeyCode, ToggleMode};
use crate::effect::{Command, Effect};
use crate::keys::{KeyPosition, NKEYS};
use crate::layer::Keymap;
use crate::log::{debug, info, warn};
use crate::stack::LayerStack;
use crate::{KeyEvent, Mods};

/// Find the action for a key, given the layers that are active.
///
/// Returns `PassThrough` only if every active layer passes through, which
/// can't happen with a checked keymap, since the default layer has an entry
/// for every key.
pub fn resolve(position: KeyPosition, keymap: &Keymap, stack: &LayerStack) -> KeyAction {
    stack
        .iter()
        .map(|id| keymap.action_at(id, position))
        .find(|action| !action.is_pass_through())
        .unwrap_or(KeyAction::PassThrough)
}

/// Where a dual-role key is in deciding between tap and hold.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DualRoleState {
    Idle,
    Pending,
    /// Decided as a tap.  The tap is sent down and up in the same dispatch,
    /// so the key is back to `Idle` by the time anyone can look.
    ResolvedTap,
    ResolvedHold,
}

/// What a single key is doing.
#[derive(Clone, Copy, Debug)]
enum KeyState {
    Idle,
    /// Down, with the action it resolved to when pressed.
    Held(KeyAction),
    /// A dual-role key that hasn't been decided yet.
    Pending { since: u64, tap: KeyCode, hold: HoldAction },
    /// A dual-role key being held.
    Hold(HoldAction),
}

pub struct Resolver {
    keymap: Keymap,
    tapping_term: u64,
    keys: [KeyState; NKEYS],
    verbose: bool,
    swap_alt_gui: bool,
}

impl Resolver {
    pub fn new(keymap: Keymap, tapping_term: u64) -> Self {
        Resolver {
            keymap,
            tapping_term,
            keys: [KeyState::Idle; NKEYS],
            verbose: false,
            swap_alt_gui: false,
        }
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn tapping_term(&self) -> u64 {
        self.tapping_term
    }

    /// Log every key as it resolves.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Send GUI for Alt and Alt for GUI.  Only affects keys pressed from now
    /// on; keys already down release what they sent.
    pub fn set_swap_alt_gui(&mut self, swap: bool) {
        self.swap_alt_gui = swap;
    }

    pub fn swaps_alt_gui(&self) -> bool {
        self.swap_alt_gui
    }

    /// Look up a key without changing anything.
    pub fn resolve(&self, position: KeyPosition, stack: &LayerStack) -> KeyAction {
        resolve(position, &self.keymap, stack)
    }

    /// The tap/hold state of the key at this position.
    pub fn dual_role_state(&self, position: KeyPosition) -> DualRoleState {
        if !position.is_valid() {
            return DualRoleState::Idle;
        }
        match self.keys[position.index()] {
            KeyState::Pending { .. } => DualRoleState::Pending,
            KeyState::Hold(_) => DualRoleState::ResolvedHold,
            _ => DualRoleState::Idle,
        }
    }

    /// Handle a single key event.
    pub fn dispatch(&mut self, event: KeyEvent, stack: &mut LayerStack) -> Effect {
        let before = stack.state();
        let mut effect = Effect::new();

        self.expire(event.timestamp, stack, &mut effect);

        if !event.position.is_valid() {
            warn!("Event for key off the board: {} {}", event.position.row, event.position.col);
        } else if event.pressed {
            self.press(event, stack, &mut effect);
        } else {
            self.release(event, stack, &mut effect);
        }

        let after = stack.state();
        if after != before {
            effect.layers = Some(after);
        }
        effect
    }

    /// Let time pass.  Resolves any dual-role key whose tapping term has run
    /// out as a hold.
    pub fn tick(&mut self, now: u64, stack: &mut LayerStack) -> Effect {
        let before = stack.state();
        let mut effect = Effect::new();
        self.expire(now, stack, &mut effect);
        let after = stack.state();
        if after != before {
            effect.layers = Some(after);
        }
        effect
    }

    fn expire(&mut self, now: u64, stack: &mut LayerStack, effect: &mut Effect) {
        for index in 0..NKEYS {
            if let KeyState::Pending { since, hold, .. } = self.keys[index] {
                if now.saturating_sub(since) >= self.tapping_term {
                    debug!("dual-role {} held past tapping term", index);
                    self.start_hold(index, hold, stack, effect);
                }
            }
        }
    }

    /// Another key went down, so anything pending is a hold.
    fn interrupt(&mut self, except: usize, stack: &mut LayerStack, effect: &mut Effect) {
        for index in 0..NKEYS {
            if index == except {
                continue;
            }
            if let KeyState::Pending { hold, .. } = self.keys[index] {
                debug!("dual-role {} interrupted", index);
                self.start_hold(index, hold, stack, effect);
            }
        }
    }

    fn start_hold(
        &mut self,
        index: usize,
        hold: HoldAction,
        stack: &mut LayerStack,
        effect: &mut Effect,
    ) {
        let hold = match hold {
            HoldAction::Modifier(mods) => {
                let mods = self.output_mods(mods);
                effect.push(Command::ModsSet(mods));
                HoldAction::Modifier(mods)
            }
            HoldAction::Layer(id) => {
                stack.activate(id);
                hold
            }
        };
        self.keys[index] = KeyState::Hold(hold);
    }

    fn press(&mut self, event: KeyEvent, stack: &mut LayerStack, effect: &mut Effect) {
        let index = event.position.index();
        if !matches!(self.keys[index], KeyState::Idle) {
            warn!("Press of key {} that is already down", index);
            return;
        }

        self.interrupt(index, stack, effect);

        let action = resolve(event.position, &self.keymap, stack);
        if self.verbose {
            info!(
                "key {} {}: {}",
                event.position.row,
                event.position.col,
                describe(&action)
            );
        }

        self.keys[index] = match action {
            KeyAction::PassThrough | KeyAction::NoOp => KeyState::Idle,
            KeyAction::SimpleCode(code) => {
                let code = self.output_code(code);
                effect.push(Command::KeyDown(code));
                KeyState::Held(KeyAction::SimpleCode(code))
            }
            KeyAction::LayerToggle(id, ToggleMode::Momentary) => {
                stack.activate(id);
                KeyState::Held(action)
            }
            KeyAction::LayerToggle(id, ToggleMode::SetPersistentDefault) => {
                stack.set_default(id);
                effect.push(Command::PersistDefault(id));
                KeyState::Held(action)
            }
            KeyAction::DualRole { tap, hold } => KeyState::Pending {
                since: event.timestamp,
                tap,
                hold,
            },
            KeyAction::Custom(custom) => {
                effect.push(Command::Custom { event: custom, pressed: true });
                KeyState::Held(action)
            }
        };
    }

    fn release(&mut self, event: KeyEvent, stack: &mut LayerStack, effect: &mut Effect) {
        let index = event.position.index();
        let state = core::mem::replace(&mut self.keys[index], KeyState::Idle);
        match state {
            KeyState::Idle => {
                debug!("Release of key {} with nothing down", index);
            }
            KeyState::Held(KeyAction::SimpleCode(code)) => {
                effect.push(Command::KeyUp(code));
            }
            KeyState::Held(KeyAction::LayerToggle(id, ToggleMode::Momentary)) => {
                stack.deactivate(id);
            }
            KeyState::Held(KeyAction::Custom(custom)) => {
                effect.push(Command::Custom { event: custom, pressed: false });
            }
            KeyState::Held(_) => (),
            KeyState::Pending { tap, .. } => {
                // Expiry has already run for this timestamp, so still pending
                // means still under the tapping term.
                debug!("dual-role {} tapped", index);
                let tap = self.output_code(tap);
                effect.push(Command::KeyDown(tap));
                effect.push(Command::KeyUp(tap));
            }
            KeyState::Hold(HoldAction::Modifier(mods)) => {
                effect.push(Command::ModsClear(mods));
            }
            KeyState::Hold(HoldAction::Layer(id)) => {
                stack.deactivate(id);
            }
        }
    }
}

impl Resolver {
    fn output_code(&self, code: KeyCode) -> KeyCode {
        if self.swap_alt_gui {
            code.swap_alt_gui()
        } else {
            code
        }
    }

    fn output_mods(&self, mods: Mods) -> Mods {
        if self.swap_alt_gui {
            mods.swap_alt_gui()
        } else {
            mods
        }
    }
}

fn describe(action: &KeyAction) -> &'static str {
    match action {
        KeyAction::PassThrough => "pass-through",
        KeyAction::NoOp => "no-op",
        KeyAction::SimpleCode(_) => "code",
        KeyAction::LayerToggle(_, ToggleMode::Momentary) => "momentary layer",
        KeyAction::LayerToggle(_, ToggleMode::SetPersistentDefault) => "default layer",
        KeyAction::DualRole { .. } => "dual-role",
        KeyAction::Custom(_) => "custom",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{cu, df, k, lt, mo, mt, CustomEvent, NO, TRNS};
    use crate::keys::{COLS, ROWS};
    use crate::layer::{Layer, LayerId, TriLayer};
    use crate::stack::LayerState;
    use crate::{Keyboard, Mods};

    const TERM: u64 = 200;

    const BASE: LayerId = LayerId(0);
    const LOWER: LayerId = LayerId(1);
    const RAISE: LayerId = LayerId(2);
    const OTHER: LayerId = LayerId(3);
    const ADJUST: LayerId = LayerId(4);
    const EMPTY: LayerId = LayerId(5);

    const Q: KeyPosition = KeyPosition::new(0, 0);
    const LOWER_KEY: KeyPosition = KeyPosition::new(0, 1);
    const RAISE_KEY: KeyPosition = KeyPosition::new(0, 2);
    const LT_KEY: KeyPosition = KeyPosition::new(0, 3);
    const MT_KEY: KeyPosition = KeyPosition::new(0, 4);
    const DF_KEY: KeyPosition = KeyPosition::new(0, 5);
    const CUSTOM_KEY: KeyPosition = KeyPosition::new(0, 6);
    const DEAD_KEY: KeyPosition = KeyPosition::new(0, 7);
    const F_KEY: KeyPosition = KeyPosition::new(1, 0);
    const NUM_KEY: KeyPosition = KeyPosition::new(1, 1);

    static LAYERS: [Layer; 6] = {
        let mut base = [[k(Keyboard::A); COLS]; ROWS];
        base[0][0] = k(Keyboard::Q);
        base[0][1] = mo(LOWER);
        base[0][2] = mo(RAISE);
        base[0][3] = lt(LOWER, Keyboard::Space);
        base[0][4] = mt(Mods::ALT, Keyboard::ReturnEnter);
        base[0][5] = df(OTHER);
        base[0][6] = cu(CustomEvent(7));
        base[0][7] = NO;

        let mut lower = [[TRNS; COLS]; ROWS];
        lower[1][0] = k(Keyboard::F1);
        lower[1][1] = k(Keyboard::Keyboard1);

        let mut raise = [[TRNS; COLS]; ROWS];
        raise[1][0] = k(Keyboard::F2);
        raise[1][2] = k(Keyboard::Keyboard2);

        let mut other = [[k(Keyboard::B); COLS]; ROWS];
        other[0][1] = mo(LOWER);

        let mut adjust = [[TRNS; COLS]; ROWS];
        adjust[1][0] = k(Keyboard::F3);

        [base, lower, raise, other, adjust, [[TRNS; COLS]; ROWS]]
    };

    static TRI: [TriLayer; 1] = [TriLayer { lower: LOWER, raise: RAISE, adjust: ADJUST }];

    fn setup() -> (Resolver, LayerStack) {
        crate::testlog::setup();
        let keymap = Keymap::new(&LAYERS, &TRI, BASE).unwrap();
        (Resolver::new(keymap, TERM), LayerStack::for_keymap(&keymap, BASE))
    }

    fn press(r: &mut Resolver, s: &mut LayerStack, pos: KeyPosition, t: u64) -> Effect {
        r.dispatch(KeyEvent::press(pos, t), s)
    }

    fn release(r: &mut Resolver, s: &mut LayerStack, pos: KeyPosition, t: u64) -> Effect {
        r.dispatch(KeyEvent::release(pos, t), s)
    }

    fn code(key: Keyboard) -> KeyCode {
        KeyCode::new(key)
    }

    #[test]
    fn pass_through_reaches_default() {
        let (r, mut s) = setup();
        s.activate(EMPTY);
        for pos in KeyPosition::all() {
            assert_eq!(r.resolve(pos, &s), r.keymap().action_at(BASE, pos));
        }
    }

    #[test]
    fn stacking_order_does_not_matter() {
        let (r, _) = setup();
        let mut ab = LayerStack::for_keymap(r.keymap(), BASE);
        ab.activate(LOWER);
        ab.activate(EMPTY);
        let mut ba = LayerStack::for_keymap(r.keymap(), BASE);
        ba.activate(EMPTY);
        ba.activate(LOWER);
        for pos in KeyPosition::all() {
            assert_eq!(r.resolve(pos, &ab), r.resolve(pos, &ba));
        }
    }

    #[test]
    fn tri_layer_wins() {
        let (mut r, mut s) = setup();
        press(&mut r, &mut s, LOWER_KEY, 0);
        assert_eq!(r.resolve(F_KEY, &s), k(Keyboard::F1));
        let effect = press(&mut r, &mut s, RAISE_KEY, 10);
        assert!(effect.commands().is_empty());
        assert_eq!(
            effect.layers,
            Some(LayerState {
                active: LOWER.bit() | RAISE.bit() | ADJUST.bit(),
                default: BASE
            })
        );
        assert_eq!(r.resolve(F_KEY, &s), k(Keyboard::F3));
        // Where the combined layer passes through, the layers below it show.
        assert_eq!(r.resolve(NUM_KEY, &s), k(Keyboard::Keyboard1));

        release(&mut r, &mut s, LOWER_KEY, 20);
        assert_eq!(r.resolve(F_KEY, &s), k(Keyboard::F2));
        release(&mut r, &mut s, RAISE_KEY, 30);
        assert_eq!(r.resolve(F_KEY, &s), k(Keyboard::A));
    }

    #[test]
    fn simple_code() {
        let (mut r, mut s) = setup();
        let down = press(&mut r, &mut s, Q, 0);
        assert_eq!(down.commands(), [Command::KeyDown(code(Keyboard::Q))]);
        assert_eq!(down.layers, None);
        let up = release(&mut r, &mut s, Q, 5);
        assert_eq!(up.commands(), [Command::KeyUp(code(Keyboard::Q))]);
    }

    #[test]
    fn dual_role_tap() {
        let (mut r, mut s) = setup();
        let down = press(&mut r, &mut s, MT_KEY, 100);
        assert!(down.is_empty());
        assert_eq!(r.dual_role_state(MT_KEY), DualRoleState::Pending);
        assert!(r.tick(100 + TERM - 1, &mut s).is_empty());

        let up = release(&mut r, &mut s, MT_KEY, 100 + TERM - 1);
        assert_eq!(
            up.commands(),
            [
                Command::KeyDown(code(Keyboard::ReturnEnter)),
                Command::KeyUp(code(Keyboard::ReturnEnter)),
            ]
        );
        assert_eq!(r.dual_role_state(MT_KEY), DualRoleState::Idle);
    }

    #[test]
    fn dual_role_hold_by_timeout() {
        let (mut r, mut s) = setup();
        press(&mut r, &mut s, MT_KEY, 0);
        let held = r.tick(TERM + 1, &mut s);
        assert_eq!(held.commands(), [Command::ModsSet(Mods::ALT)]);
        assert_eq!(r.dual_role_state(MT_KEY), DualRoleState::ResolvedHold);

        // Only once.
        assert!(r.tick(TERM + 50, &mut s).is_empty());
        assert!(r.tick(TERM + 500, &mut s).is_empty());

        let up = release(&mut r, &mut s, MT_KEY, TERM + 600);
        assert_eq!(up.commands(), [Command::ModsClear(Mods::ALT)]);
        assert_eq!(r.dual_role_state(MT_KEY), DualRoleState::Idle);
    }

    #[test]
    fn dual_role_release_at_term_is_hold() {
        let (mut r, mut s) = setup();
        press(&mut r, &mut s, MT_KEY, 0);
        let up = release(&mut r, &mut s, MT_KEY, TERM);
        assert_eq!(
            up.commands(),
            [Command::ModsSet(Mods::ALT), Command::ModsClear(Mods::ALT)]
        );
    }

    #[test]
    fn dual_role_interrupted() {
        let (mut r, mut s) = setup();
        press(&mut r, &mut s, MT_KEY, 0);
        let effect = press(&mut r, &mut s, Q, 10);
        assert_eq!(
            effect.commands(),
            [Command::ModsSet(Mods::ALT), Command::KeyDown(code(Keyboard::Q))]
        );
        release(&mut r, &mut s, Q, 20);
        let up = release(&mut r, &mut s, MT_KEY, 30);
        assert_eq!(up.commands(), [Command::ModsClear(Mods::ALT)]);
    }

    #[test]
    fn layer_tap_interrupted_uses_layer() {
        let (mut r, mut s) = setup();
        press(&mut r, &mut s, LT_KEY, 0);
        let effect = press(&mut r, &mut s, F_KEY, 10);
        assert_eq!(effect.commands(), [Command::KeyDown(code(Keyboard::F1))]);
        assert!(effect.layers.is_some());

        let up = release(&mut r, &mut s, LT_KEY, 20);
        assert!(up.commands().is_empty());
        assert_eq!(up.layers, Some(LayerState { active: 0, default: BASE }));

        // The F1 was pressed on the lower layer, and releases as such.
        let up = release(&mut r, &mut s, F_KEY, 30);
        assert_eq!(up.commands(), [Command::KeyUp(code(Keyboard::F1))]);
    }

    #[test]
    fn release_uses_press_time_action() {
        let (mut r, mut s) = setup();
        press(&mut r, &mut s, LOWER_KEY, 0);
        let down = press(&mut r, &mut s, NUM_KEY, 10);
        assert_eq!(down.commands(), [Command::KeyDown(code(Keyboard::Keyboard1))]);
        release(&mut r, &mut s, LOWER_KEY, 20);
        let up = release(&mut r, &mut s, NUM_KEY, 30);
        assert_eq!(up.commands(), [Command::KeyUp(code(Keyboard::Keyboard1))]);
    }

    #[test]
    fn set_persistent_default() {
        let (mut r, mut s) = setup();
        press(&mut r, &mut s, LOWER_KEY, 0);
        let effect = press(&mut r, &mut s, DF_KEY, 10);
        assert_eq!(effect.commands(), [Command::PersistDefault(OTHER)]);
        assert_eq!(effect.layers, Some(LayerState { active: 0, default: OTHER }));

        assert!(release(&mut r, &mut s, DF_KEY, 20).is_empty());
        // The lower layer was collapsed; releasing its key doesn't underflow.
        assert!(release(&mut r, &mut s, LOWER_KEY, 30).is_empty());
        assert_eq!(s.state(), LayerState { active: 0, default: OTHER });
        assert_eq!(r.resolve(Q, &s), k(Keyboard::B));

        // And the momentary layer still works from the new default.
        press(&mut r, &mut s, LOWER_KEY, 40);
        assert_eq!(r.resolve(F_KEY, &s), k(Keyboard::F1));
    }

    #[test]
    fn stray_release_does_nothing() {
        let (mut r, mut s) = setup();
        assert!(release(&mut r, &mut s, LOWER_KEY, 0).is_empty());
        assert!(release(&mut r, &mut s, Q, 0).is_empty());
        assert_eq!(s.state(), LayerState { active: 0, default: BASE });

        // A second release of a momentary key doesn't take another key's hold.
        press(&mut r, &mut s, LOWER_KEY, 10);
        press(&mut r, &mut s, LT_KEY, 20);
        r.tick(20 + TERM, &mut s);
        release(&mut r, &mut s, LOWER_KEY, 300);
        assert!(release(&mut r, &mut s, LOWER_KEY, 310).is_empty());
        assert!(s.is_active(LOWER));
        release(&mut r, &mut s, LT_KEY, 320);
        assert!(!s.is_active(LOWER));
    }

    #[test]
    fn custom_and_dead_keys() {
        let (mut r, mut s) = setup();
        let down = press(&mut r, &mut s, CUSTOM_KEY, 0);
        assert_eq!(
            down.commands(),
            [Command::Custom { event: CustomEvent(7), pressed: true }]
        );
        assert_eq!(down.layers, None);
        let up = release(&mut r, &mut s, CUSTOM_KEY, 10);
        assert_eq!(
            up.commands(),
            [Command::Custom { event: CustomEvent(7), pressed: false }]
        );

        assert!(press(&mut r, &mut s, DEAD_KEY, 20).is_empty());
        assert!(release(&mut r, &mut s, DEAD_KEY, 30).is_empty());
    }

    #[test]
    fn swap_is_decided_at_press() {
        let (_, mut s) = setup();
        let alt = KeyCode::new(Keyboard::LeftAlt);
        let gui = KeyCode::new(Keyboard::LeftGUI);
        static SWAP: [Layer; 1] = {
            let mut base = [[k(Keyboard::LeftAlt); COLS]; ROWS];
            base[0][4] = mt(Mods::ALT, Keyboard::ReturnEnter);
            [base]
        };
        let mut r = Resolver::new(Keymap::new(&SWAP, &[], BASE).unwrap(), TERM);

        let down = press(&mut r, &mut s, Q, 0);
        assert_eq!(down.commands(), [Command::KeyDown(alt)]);
        r.set_swap_alt_gui(true);
        let up = release(&mut r, &mut s, Q, 10);
        assert_eq!(up.commands(), [Command::KeyUp(alt)]);

        let down = press(&mut r, &mut s, Q, 20);
        assert_eq!(down.commands(), [Command::KeyDown(gui)]);

        // A held modifier clears what it set.
        press(&mut r, &mut s, MT_KEY, 30);
        let held = r.tick(30 + TERM, &mut s);
        assert_eq!(held.commands(), [Command::ModsSet(Mods::GUI)]);
        r.set_swap_alt_gui(false);
        let up = release(&mut r, &mut s, MT_KEY, 300);
        assert_eq!(up.commands(), [Command::ModsClear(Mods::GUI)]);
        let up = release(&mut r, &mut s, Q, 310);
        assert_eq!(up.commands(), [Command::KeyUp(gui)]);
    }

    #[test]
    fn off_board_events_are_ignored() {
        let (mut r, mut s) = setup();
        assert!(press(&mut r, &mut s, KeyPosition::new(7, 0), 0).is_empty());
        assert_eq!(r.dual_role_state(KeyPosition::new(7, 0)), DualRoleState::Idle);
    }
}
