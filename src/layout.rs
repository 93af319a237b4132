//! Handle layout related concerns, such as:
//!
//! - Driving the resolver from the host's key events and timer.
//! - Sending what comes out to the host.
//! - Handing custom events to the keymap's own handler.
//! - Keeping the persisted config up to date.
//!
//! The host implements [`LayoutActions`], which is both the output sink and
//! the place the optional parts of the board (audio, backlight) are found.
//! Those optional parts return `None` unless the host has them, so the keymap
//! can ask for them unconditionally.

use core::fmt;

use crate::action::{CustomEvent, KeyCode};
use crate::effect::{Command, Effect};
use crate::layer::{ConfigError, Keymap, LayerId};
use crate::log::{info, warn};
use crate::resolver::Resolver;
use crate::stack::{LayerStack, LayerState};
use crate::store::{self, ConfigStore, KeymapConfig, StoreError};
use crate::{KeyEvent, Mods};

pub mod planck;

/// Runtime settings.
#[derive(Clone, Copy, Debug)]
pub struct Settings {
    /// How long, in ticks, a dual-role key has to be held to count as a hold.
    pub tapping_term: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings { tapping_term: 200 }
    }
}

/// Audio cues the keymap can ask for.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Song {
    Plover,
    PloverGoodbye,
}

/// A speaker.
pub trait AudioCue {
    fn play(&mut self, song: Song);
    fn stop_all(&mut self);
}

/// A backlight.
pub trait Backlight {
    /// Move to the next brightness, wrapping to off.
    fn step(&mut self);
    fn toggle(&mut self);
    fn increase(&mut self);
    fn decrease(&mut self);
}

/// What the layout needs from the host.
pub trait LayoutActions {
    fn key_down(&mut self, code: KeyCode);
    fn key_up(&mut self, code: KeyCode);
    fn set_mods(&mut self, mods: Mods);
    fn clear_mods(&mut self, mods: Mods);

    /// The active layers changed.  Useful for indicators.
    fn layers_changed(&mut self, state: LayerState) {
        let _ = state;
    }

    /// Where the keymap config lives.
    fn store(&mut self) -> &mut dyn ConfigStore;

    fn audio(&mut self) -> Option<&mut dyn AudioCue> {
        None
    }

    fn backlight(&mut self) -> Option<&mut dyn Backlight> {
        None
    }

    /// Reboot into the bootloader.  Does nothing unless the host supports it.
    fn bootloader(&mut self) {}
}

/// The keymap's handler for its custom events.
pub trait CustomHandler {
    fn handle(&mut self, event: CustomEvent, pressed: bool, ctx: &mut Context<'_>);
}

/// A keymap without custom events.
impl CustomHandler for () {
    fn handle(&mut self, event: CustomEvent, _pressed: bool, _ctx: &mut Context<'_>) {
        warn!("Unhandled custom event {}", event.0);
    }
}

/// What a custom handler gets to work with.
pub struct Context<'a> {
    stack: &'a mut LayerStack,
    config: &'a mut KeymapConfig,
    resolver: &'a mut Resolver,
    actions: &'a mut dyn LayoutActions,
}

impl<'a> Context<'a> {
    pub fn stack(&mut self) -> &mut LayerStack {
        &mut *self.stack
    }

    pub fn config(&self) -> &KeymapConfig {
        &*self.config
    }

    /// Sent as given.  The Alt/GUI swap only applies to codes from the
    /// keymap tables.
    pub fn key_down(&mut self, code: KeyCode) {
        self.actions.key_down(code);
    }

    pub fn key_up(&mut self, code: KeyCode) {
        self.actions.key_up(code);
    }

    /// The speaker, if there is one and audio hasn't been turned off.
    pub fn audio(&mut self) -> Option<&mut dyn AudioCue> {
        if self.config.audio {
            self.actions.audio()
        } else {
            None
        }
    }

    pub fn backlight(&mut self) -> Option<&mut dyn Backlight> {
        self.actions.backlight()
    }

    pub fn bootloader(&mut self) {
        self.actions.bootloader();
    }

    /// The config changes below are saved once the handler returns.
    pub fn set_nkro(&mut self, nkro: bool) {
        self.config.nkro = nkro;
    }

    pub fn set_audio(&mut self, audio: bool) {
        self.config.audio = audio;
    }

    /// Keys already down still release what they sent.
    pub fn set_swap_alt_gui(&mut self, swap: bool) {
        self.config.swap_alt_gui = swap;
        self.resolver.set_swap_alt_gui(swap);
    }

    /// Flip verbose logging of resolved keys.
    pub fn toggle_verbose(&mut self) {
        let verbose = !self.resolver.is_verbose();
        info!("verbose: {}", verbose);
        self.resolver.set_verbose(verbose);
    }
}

/// Errors from changing the layout at runtime.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum LayoutError {
    Config(ConfigError),
    Store(StoreError),
}

impl From<ConfigError> for LayoutError {
    fn from(e: ConfigError) -> Self {
        LayoutError::Config(e)
    }
}

impl From<StoreError> for LayoutError {
    fn from(e: StoreError) -> Self {
        LayoutError::Store(e)
    }
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::Config(e) => write!(f, "{}", e),
            LayoutError::Store(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LayoutError {}

/// The layout manager.
pub struct LayoutManager<H> {
    resolver: Resolver,
    stack: LayerStack,

    /// The config as it should be in storage.
    config: KeymapConfig,

    /// Set when `config` hasn't made it to storage yet.
    dirty: bool,

    handler: H,
}

impl<H: CustomHandler> LayoutManager<H> {
    /// Bring up the layout.  The default layer comes from the saved config,
    /// if there is one that the keymap can use.
    pub fn new(
        keymap: Keymap,
        settings: Settings,
        handler: H,
        store: &mut dyn ConfigStore,
    ) -> Self {
        let mut config = match store::read_config(store) {
            Some(config) => config,
            None => {
                info!("No saved keymap config, using defaults");
                KeymapConfig::new(keymap.default_layer())
            }
        };
        if keymap.check_default(config.default_layer()).is_err() {
            warn!("Saved default layer {} not usable", config.default_layer);
            config.default_layer = keymap.default_layer().0;
        }
        info!("Starting on layer {}", config.default_layer);

        let mut resolver = Resolver::new(keymap, settings.tapping_term);
        resolver.set_swap_alt_gui(config.swap_alt_gui);

        LayoutManager {
            stack: LayerStack::for_keymap(&keymap, config.default_layer()),
            resolver,
            config,
            dirty: false,
            handler,
        }
    }

    /// Handle a single key event.
    ///
    /// The event is always fully handled; an error only means the config
    /// couldn't be saved.  The new config stays in effect, and is not retried
    /// until it changes again or [`LayoutManager::flush`] is called.
    pub fn handle_event(
        &mut self,
        event: KeyEvent,
        actions: &mut dyn LayoutActions,
    ) -> Result<(), StoreError> {
        let effect = self.resolver.dispatch(event, &mut self.stack);
        self.apply(effect, actions)
    }

    /// Let time pass, for dual-role keys.
    pub fn tick(&mut self, now: u64, actions: &mut dyn LayoutActions) -> Result<(), StoreError> {
        let effect = self.resolver.tick(now, &mut self.stack);
        self.apply(effect, actions)
    }

    /// Make a layer the persistent default.  Everything else is turned off.
    pub fn set_default_layer(
        &mut self,
        id: LayerId,
        actions: &mut dyn LayoutActions,
    ) -> Result<(), LayoutError> {
        self.resolver.keymap().check_default(id)?;
        self.stack.set_default(id);
        self.config.default_layer = id.0;
        self.dirty = true;
        actions.layers_changed(self.stack.state());
        self.persist(actions)?;
        Ok(())
    }

    /// Try again to save a config that didn't get saved.
    pub fn flush(&mut self, actions: &mut dyn LayoutActions) -> Result<(), StoreError> {
        self.persist(actions)
    }

    pub fn layer_state(&self) -> LayerState {
        self.stack.state()
    }

    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn config(&self) -> &KeymapConfig {
        &self.config
    }

    /// Is there config waiting to be saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn apply(&mut self, effect: Effect, actions: &mut dyn LayoutActions) -> Result<(), StoreError> {
        let mut layers = effect.layers;
        let config_before = self.config;
        let mut save = false;

        for command in effect {
            match command {
                Command::KeyDown(code) => actions.key_down(code),
                Command::KeyUp(code) => actions.key_up(code),
                Command::ModsSet(mods) => actions.set_mods(mods),
                Command::ModsClear(mods) => actions.clear_mods(mods),
                Command::Custom { event, pressed } => {
                    let before = self.stack.state();
                    let mut ctx = Context {
                        stack: &mut self.stack,
                        config: &mut self.config,
                        resolver: &mut self.resolver,
                        actions: &mut *actions,
                    };
                    self.handler.handle(event, pressed, &mut ctx);
                    let after = self.stack.state();
                    if after != before {
                        layers = Some(after);
                    }
                }
                Command::PersistDefault(id) => {
                    self.config.default_layer = id.0;
                    save = true;
                }
            }
        }

        if let Some(state) = layers {
            actions.layers_changed(state);
        }

        if save || self.config != config_before {
            self.dirty = true;
            self.persist(actions)
        } else {
            Ok(())
        }
    }

    fn persist(&mut self, actions: &mut dyn LayoutActions) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        match store::write_config(actions.store(), &self.config) {
            Ok(()) => {
                info!("Saved keymap config, default layer {}", self.config.default_layer);
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                warn!("Fail to save keymap config");
                Err(e)
            }
        }
    }
}
