//! Planck keymap
//!
//! A 4x12 ortholinear board with a handful of base layouts (qwerty, colemak,
//! dvorak, and a couple of 30-key "gherkin" dvorak variants), the usual raise
//! and lower layers with adjust on top of both, and a Plover layer for steno.
//!
//! The gherkin layouts lean on dual-role keys: the corners and a few home keys
//! send a letter when tapped, and act as modifiers or layer shifts when held.

use crate::action::{cu, df, k, lt, mo, mt, s, CustomEvent, KeyCode, NO, TRNS};
use crate::layer::{ConfigError, Keymap, Layer, LayerId, TriLayer};
use crate::layout::{Context, CustomHandler, LayoutManager, Settings, Song};
use crate::log::{info, warn};
use crate::store::ConfigStore;
use crate::{Keyboard as K, Mods};

pub const QWERTY: LayerId = LayerId(0);
pub const COLEMAK: LayerId = LayerId(1);
pub const DVORAK: LayerId = LayerId(2);
pub const GHERKIN_DVORAK: LayerId = LayerId(3);
pub const RAISE: LayerId = LayerId(4);
pub const LOWER: LayerId = LayerId(5);
pub const GHELOW: LayerId = LayerId(6);
pub const GHE3: LayerId = LayerId(7);
pub const PLOVER: LayerId = LayerId(8);
pub const ADJUST: LayerId = LayerId(9);
pub const SPGHEDOV: LayerId = LayerId(10);
pub const SPGHE1: LayerId = LayerId(11);
pub const SPGHE2: LayerId = LayerId(12);
pub const SPGHE3: LayerId = LayerId(13);

/// The custom events of this keymap.
pub mod events {
    use crate::action::CustomEvent;

    /// Enter steno mode.
    pub const PLOVER: CustomEvent = CustomEvent(0);
    /// Leave steno mode.
    pub const EXIT_PLOVER: CustomEvent = CustomEvent(1);
    /// Right shift while held, and step the backlight.
    pub const BACKLIT: CustomEvent = CustomEvent(2);
    pub const BACKLIGHT_TOGGLE: CustomEvent = CustomEvent(3);
    pub const BACKLIGHT_UP: CustomEvent = CustomEvent(4);
    pub const BACKLIGHT_DOWN: CustomEvent = CustomEvent(5);
    pub const AUDIO_ON: CustomEvent = CustomEvent(6);
    pub const AUDIO_OFF: CustomEvent = CustomEvent(7);
    pub const SWAP_ALT_GUI: CustomEvent = CustomEvent(8);
    pub const NORM_ALT_GUI: CustomEvent = CustomEvent(9);
    /// Jump to the bootloader.
    pub const RESET: CustomEvent = CustomEvent(10);
    /// Toggle logging of every key.
    pub const DEBUG: CustomEvent = CustomEvent(11);
}

pub static TRI_LAYERS: [TriLayer; 1] = [TriLayer { lower: LOWER, raise: RAISE, adjust: ADJUST }];

const CTL: Mods = Mods::CONTROL;
const SFT: Mods = Mods::SHIFT;
const ALT: Mods = Mods::ALT;
const GUI: Mods = Mods::GUI;

const BL_TOGG: crate::KeyAction = cu(events::BACKLIGHT_TOGGLE);
const BL_INC: crate::KeyAction = cu(events::BACKLIGHT_UP);
const BL_DEC: crate::KeyAction = cu(events::BACKLIGHT_DOWN);

#[rustfmt::skip]
pub static LAYERS: [Layer; 14] = [
    // QWERTY
    [
        [k(K::Tab),         k(K::Q),       k(K::W),       k(K::E),      k(K::R),      k(K::T),         k(K::Y),         k(K::U),      k(K::I),         k(K::O),       k(K::P),            k(K::DeleteBackspace)],
        [k(K::LeftControl), k(K::A),       k(K::S),       k(K::D),      k(K::F),      k(K::G),         k(K::H),         k(K::J),      k(K::K),         k(K::L),       k(K::Semicolon),    k(K::ReturnEnter)],
        [k(K::LeftShift),   k(K::Z),       k(K::X),       k(K::C),      k(K::V),      k(K::B),         k(K::N),         k(K::M),      k(K::Comma),     k(K::Dot),     k(K::ForwardSlash), k(K::RightShift)],
        [k(K::Escape),      k(K::LeftGUI), k(K::LeftAlt), mo(LOWER),    k(K::Space),  k(K::LeftShift), k(K::LeftShift), mo(RAISE),    mo(LOWER),       k(K::PageUp),  k(K::PageDown),     k(K::RightControl)],
    ],
    // COLEMAK
    [
        [k(K::Tab),         k(K::Q),       k(K::W),       k(K::F),      k(K::P),      k(K::G),         k(K::J),         k(K::L),      k(K::U),         k(K::Y),       k(K::Semicolon),    k(K::DeleteBackspace)],
        [k(K::LeftControl), k(K::A),       k(K::R),       k(K::S),      k(K::T),      k(K::D),         k(K::H),         k(K::N),      k(K::E),         k(K::I),       k(K::O),            k(K::ReturnEnter)],
        [k(K::LeftShift),   k(K::Z),       k(K::X),       k(K::C),      k(K::V),      k(K::B),         k(K::K),         k(K::M),      k(K::Comma),     k(K::Dot),     k(K::ForwardSlash), k(K::RightShift)],
        [k(K::Escape),      k(K::LeftGUI), k(K::LeftAlt), mo(LOWER),    k(K::Space),  k(K::LeftShift), k(K::LeftShift), mo(RAISE),    mo(LOWER),       k(K::PageUp),  k(K::PageDown),     k(K::RightControl)],
    ],
    // DVORAK
    [
        [k(K::Tab),         k(K::Apostrophe), k(K::Comma), k(K::Dot),   k(K::P),      k(K::Y),         k(K::F),         k(K::G),      k(K::C),         k(K::R),       k(K::L),            k(K::DeleteBackspace)],
        [k(K::LeftControl), k(K::A),       k(K::O),       k(K::E),      k(K::U),      k(K::I),         k(K::D),         k(K::H),      k(K::T),         k(K::N),       k(K::S),            k(K::ReturnEnter)],
        [k(K::LeftShift),   k(K::Semicolon), k(K::Q),     k(K::J),      k(K::K),      k(K::X),         k(K::B),         k(K::M),      k(K::W),         k(K::V),       k(K::Z),            k(K::RightShift)],
        [k(K::Escape),      k(K::LeftGUI), k(K::LeftAlt), mo(LOWER),    k(K::Space),  k(K::LeftShift), k(K::LeftShift), mo(RAISE),    mo(LOWER),       k(K::PageUp),  k(K::PageDown),     k(K::RightControl)],
    ],
    // GHERKIN_DVORAK
    [
        [NO, k(K::Tab),                 mt(ALT, K::Space), mt(CTL, K::ReturnEnter), k(K::P), k(K::Y), k(K::F), k(K::G), k(K::C), k(K::R), lt(RAISE, K::L),  NO],
        [NO, k(K::A),                   k(K::O),           k(K::E),                 k(K::U), k(K::I), k(K::D), k(K::H), k(K::T), k(K::N), lt(GHELOW, K::S), NO],
        [NO, mt(SFT, K::Escape),        mt(GUI, K::Q),     k(K::J),                 k(K::K), k(K::X), k(K::B), k(K::M), k(K::W), k(K::V), lt(GHE3, K::Z),   NO],
        [NO, NO,                        NO,                NO,                      NO,      NO,      NO,      NO,      NO,      NO,      NO,               NO],
    ],
    // RAISE
    [
        [s(K::Keyboard4), s(K::Minus),     k(K::Backslash), s(K::Keyboard3),    s(K::Keyboard2), s(K::LeftBrace), s(K::RightBrace), k(K::Keyboard1), k(K::Keyboard2), k(K::Keyboard3), TRNS,            k(K::DeleteForward)],
        [s(K::Equal),     k(K::Minus),     s(K::Keyboard8), k(K::ForwardSlash), k(K::Equal),     s(K::Keyboard9), s(K::Keyboard0),  k(K::Keyboard4), k(K::Keyboard5), k(K::Keyboard6), k(K::Keyboard0), k(K::ReturnEnter)],
        [s(K::Keyboard6), s(K::Keyboard7), s(K::Backslash), s(K::ForwardSlash), s(K::Keyboard1), k(K::LeftBrace), k(K::RightBrace), k(K::Keyboard7), k(K::Keyboard8), k(K::Keyboard9), TRNS,            k(K::RightShift)],
        [s(K::Grave),     s(K::Keyboard5), k(K::Grave),     mo(LOWER),          k(K::Space),     k(K::LeftShift), k(K::LeftShift),  mo(RAISE),       mo(LOWER),       k(K::PageUp),    k(K::PageDown),  k(K::RightControl)],
    ],
    // LOWER
    [
        [k(K::Tab),       k(K::F10),     k(K::F1),      k(K::F2),  k(K::F3),     k(K::Mute),       BL_TOGG,          k(K::PageUp),    k(K::UpArrow),   k(K::PageDown),   TRNS,           k(K::DeleteForward)],
        [k(K::CapsLock),  k(K::F11),     k(K::F4),      k(K::F5),  k(K::F6),     k(K::VolumeUp),   BL_INC,           k(K::LeftArrow), k(K::DownArrow), k(K::RightArrow), TRNS,           k(K::ReturnEnter)],
        [k(K::LeftShift), k(K::F12),     k(K::F7),      k(K::F8),  k(K::F9),     k(K::VolumeDown), BL_DEC,           k(K::Home),      k(K::Insert),    k(K::End),        TRNS,           k(K::RightShift)],
        [k(K::Escape),    k(K::LeftGUI), k(K::LeftAlt), mo(LOWER), k(K::Space),  k(K::LeftShift),  k(K::LeftShift),  mo(RAISE),       mo(LOWER),       k(K::PageUp),     k(K::PageDown), k(K::RightControl)],
    ],
    // GHELOW
    [
        [NO, k(K::Apostrophe), k(K::Comma),     k(K::Dot),          s(K::Keyboard3), s(K::LeftBrace), s(K::RightBrace), k(K::PageUp),          k(K::UpArrow),       k(K::PageDown),   k(K::Home), NO],
        [NO, k(K::Minus),      s(K::Keyboard8), k(K::ForwardSlash), k(K::Equal),     s(K::Keyboard9), s(K::Keyboard0),  k(K::LeftArrow),       k(K::DownArrow),     k(K::RightArrow), TRNS,       NO],
        [NO, k(K::Semicolon),  s(K::Backslash), s(K::ForwardSlash), s(K::Keyboard1), k(K::LeftBrace), k(K::RightBrace), k(K::DeleteBackspace), k(K::DeleteForward), k(K::Insert),     k(K::End),  NO],
        [NO, NO,               NO,              NO,                 NO,              NO,              NO,               NO,                    NO,                  NO,               NO,         NO],
    ],
    // GHE3
    [
        [NO, s(K::Apostrophe), s(K::Comma), s(K::Dot),       k(K::Backslash), k(K::Mute),       k(K::F10), k(K::F1), k(K::F2), k(K::F3), TRNS, NO],
        [NO, s(K::Minus),      s(K::Equal), s(K::Keyboard6), s(K::Keyboard4), k(K::VolumeUp),   k(K::F11), k(K::F4), k(K::F5), k(K::F6), TRNS, NO],
        [NO, s(K::Semicolon),  s(K::Grave), s(K::Keyboard5), k(K::Grave),     k(K::VolumeDown), k(K::F12), k(K::F7), k(K::F8), k(K::F9), TRNS, NO],
        [NO, NO,               NO,          NO,              NO,              NO,               NO,        NO,       NO,       NO,       NO,   NO],
    ],
    // PLOVER
    //
    // Plover itself reads these as plain keys; the board just needs to send
    // them with n-key rollover.
    [
        [k(K::Keyboard1), k(K::Keyboard1), k(K::Keyboard1), k(K::Keyboard1), k(K::Keyboard1), k(K::Keyboard1), k(K::Keyboard1), k(K::Keyboard1), k(K::Keyboard1), k(K::Keyboard1), k(K::Keyboard1),  k(K::Keyboard1)],
        [NO,                         k(K::Q), k(K::W), k(K::E), k(K::R), k(K::T), k(K::Y), k(K::U), k(K::I), k(K::O), k(K::P),         k(K::LeftBrace)],
        [NO,                         k(K::A), k(K::S), k(K::D), k(K::F), k(K::G), k(K::H), k(K::J), k(K::K), k(K::L), k(K::Semicolon), k(K::Apostrophe)],
        [cu(events::EXIT_PLOVER),    NO,      NO,      k(K::C), k(K::V), NO,      NO,      k(K::N), k(K::M), NO,      NO,              NO],
    ],
    // ADJUST
    [
        [TRNS, cu(events::RESET), cu(events::DEBUG), TRNS,                 TRNS,                  TRNS,                     TRNS,                     NO,         NO,           TRNS,               TRNS,               k(K::DeleteForward)],
        [TRNS, TRNS,              NO,                cu(events::AUDIO_ON), cu(events::AUDIO_OFF), cu(events::NORM_ALT_GUI), cu(events::SWAP_ALT_GUI), df(QWERTY), df(COLEMAK),  df(DVORAK),         cu(events::PLOVER), TRNS],
        [TRNS, NO,                NO,                NO,                   NO,                    NO,                       NO,                       TRNS,       df(SPGHEDOV), df(GHERKIN_DVORAK), TRNS,               TRNS],
        [TRNS, TRNS,              TRNS,              TRNS,                 TRNS,                  TRNS,                     TRNS,                     TRNS,       TRNS,         TRNS,               TRNS,               TRNS],
    ],
    // SPGHEDOV
    [
        [NO,                 NO,                NO,                      NO,      NO,      mo(RAISE), mo(LOWER), NO,      NO,      NO,      NO,      NO],
        [k(K::Tab),          mt(ALT, K::Space), mt(CTL, K::ReturnEnter), k(K::P), k(K::Y), NO,        NO,        k(K::F), k(K::G), k(K::C), k(K::R), lt(SPGHE1, K::L)],
        [k(K::A),            k(K::O),           k(K::E),                 k(K::U), k(K::I), NO,        NO,        k(K::D), k(K::H), k(K::T), k(K::N), lt(SPGHE2, K::S)],
        [mt(SFT, K::Escape), mt(GUI, K::Q),     k(K::J),                 k(K::K), k(K::X), NO,        NO,        k(K::B), k(K::M), k(K::W), k(K::V), lt(SPGHE3, K::Z)],
    ],
    // SPGHE1
    [
        [NO,               NO,              NO,                 NO,              NO,              NO, NO, NO,               NO,              NO,              NO,              NO],
        [s(K::Apostrophe), s(K::Comma),     s(K::Dot),          s(K::Keyboard2), s(K::LeftBrace), NO, NO, s(K::RightBrace), k(K::Keyboard1), k(K::Keyboard2), k(K::Keyboard3), TRNS],
        [k(K::Minus),      s(K::Keyboard8), k(K::ForwardSlash), k(K::Equal),     s(K::Keyboard9), NO, NO, s(K::Keyboard0),  k(K::Keyboard4), k(K::Keyboard5), k(K::Keyboard6), k(K::Keyboard0)],
        [s(K::Semicolon),  s(K::Backslash), s(K::ForwardSlash), s(K::Keyboard1), k(K::LeftBrace), NO, NO, k(K::RightBrace), k(K::Keyboard7), k(K::Keyboard8), k(K::Keyboard9), TRNS],
    ],
    // SPGHE2
    [
        [NO,               NO,              NO,                 NO,              NO,              NO, NO, NO,               NO,                    NO,                  NO,               NO],
        [k(K::Apostrophe), k(K::Comma),     k(K::Dot),          s(K::Keyboard3), s(K::LeftBrace), NO, NO, s(K::RightBrace), k(K::PageUp),          k(K::UpArrow),       k(K::PageDown),   k(K::Home)],
        [k(K::Minus),      s(K::Keyboard8), k(K::ForwardSlash), k(K::Equal),     s(K::Keyboard9), NO, NO, s(K::Keyboard0),  k(K::LeftArrow),       k(K::DownArrow),     k(K::RightArrow), TRNS],
        [k(K::Semicolon),  s(K::Backslash), s(K::ForwardSlash), s(K::Keyboard1), k(K::LeftBrace), NO, NO, k(K::RightBrace), k(K::DeleteBackspace), k(K::DeleteForward), k(K::Insert),     k(K::End)],
    ],
    // SPGHE3
    [
        [NO,             NO,          NO,              NO,              NO,               NO, NO, NO,        NO,       NO,       NO,       NO],
        [k(K::CapsLock), s(K::Comma), s(K::Dot),       k(K::Backslash), k(K::Mute),       NO, NO, k(K::F10), k(K::F1), k(K::F2), k(K::F3), TRNS],
        [s(K::Minus),    s(K::Equal), s(K::Keyboard6), s(K::Keyboard4), k(K::VolumeUp),   NO, NO, k(K::F11), k(K::F4), k(K::F5), k(K::F6), TRNS],
        [k(K::Grave),    s(K::Grave), s(K::Keyboard5), s(K::Keyboard7), k(K::VolumeDown), NO, NO, k(K::F12), k(K::F7), k(K::F8), k(K::F9), TRNS],
    ],
];

/// The checked Planck keymap.
pub fn keymap() -> Result<Keymap, ConfigError> {
    Keymap::new(&LAYERS, &TRI_LAYERS, QWERTY)
}

/// A layout manager running the Planck keymap.
pub fn layout(store: &mut dyn ConfigStore) -> Result<LayoutManager<PlanckHandler>, ConfigError> {
    Ok(LayoutManager::new(keymap()?, Settings::default(), PlanckHandler, store))
}

/// Handles the Planck keymap's custom events.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlanckHandler;

impl CustomHandler for PlanckHandler {
    fn handle(&mut self, event: CustomEvent, pressed: bool, ctx: &mut Context<'_>) {
        match (event, pressed) {
            (events::PLOVER, true) => {
                info!("Entering plover");
                if let Some(audio) = ctx.audio() {
                    audio.stop_all();
                    audio.play(Song::Plover);
                }
                let stack = ctx.stack();
                stack.force_off(RAISE);
                stack.force_off(LOWER);
                stack.force_off(ADJUST);
                stack.latch(PLOVER);
                ctx.set_nkro(true);
            }
            (events::EXIT_PLOVER, true) => {
                info!("Leaving plover");
                if let Some(audio) = ctx.audio() {
                    audio.play(Song::PloverGoodbye);
                }
                ctx.stack().unlatch(PLOVER);
            }
            (events::BACKLIT, true) => {
                ctx.key_down(KeyCode::new(K::RightShift));
                if let Some(backlight) = ctx.backlight() {
                    backlight.step();
                }
            }
            (events::BACKLIT, false) => {
                ctx.key_up(KeyCode::new(K::RightShift));
            }
            (events::BACKLIGHT_TOGGLE, true) => {
                if let Some(backlight) = ctx.backlight() {
                    backlight.toggle();
                }
            }
            (events::BACKLIGHT_UP, true) => {
                if let Some(backlight) = ctx.backlight() {
                    backlight.increase();
                }
            }
            (events::BACKLIGHT_DOWN, true) => {
                if let Some(backlight) = ctx.backlight() {
                    backlight.decrease();
                }
            }
            (events::AUDIO_ON, true) => ctx.set_audio(true),
            (events::AUDIO_OFF, true) => ctx.set_audio(false),
            (events::SWAP_ALT_GUI, true) => ctx.set_swap_alt_gui(true),
            (events::NORM_ALT_GUI, true) => ctx.set_swap_alt_gui(false),
            (events::RESET, true) => {
                info!("Reset to bootloader");
                ctx.bootloader();
            }
            (events::DEBUG, true) => ctx.toggle_verbose(),
            (_, false) => (),
            (_, true) => warn!("Unknown custom event {}", event.0),
        }
    }
}
