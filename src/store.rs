//! Persisted keymap configuration.
//!
//! The few settings that survive a power cycle (the default layer, and some
//! toggles the keymap can flip) are kept in a single small page of
//! non-volatile storage.  The host provides the page through [`ConfigStore`];
//! how it gets to flash or EEPROM is its business.
//!
//! The page holds a little-endian 16-bit length, a CBOR record of that length,
//! and then the CRC of the record.  An erased page (all `0xff`) reads as no
//! record at all.

use core::fmt;

use crc::{Crc, CRC_16_IBM_SDLC};
use minicbor::{Decode, Encode};

use crate::layer::LayerId;
use crate::log::warn;

/// Size of the configuration page.
pub const PAGE_SIZE: usize = 64;

/// Value of an erased byte.
pub const ERASED: u8 = 0xff;

pub type Page = [u8; PAGE_SIZE];

/// The CRC generator we are using.
pub const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// The length and the CRC around the record.
const OVERHEAD: usize = 4;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum StoreError {
    /// The host couldn't read the page.
    Read,
    /// The host couldn't write the page.
    Write,
    /// The record doesn't fit in a page.
    TooLarge(usize),
    /// The record couldn't be encoded.
    Encode,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Read => write!(f, "config page read failed"),
            StoreError::Write => write!(f, "config page write failed"),
            StoreError::TooLarge(n) => {
                write!(f, "config record of {} bytes does not fit in {} byte page", n, PAGE_SIZE)
            }
            StoreError::Encode => write!(f, "config record could not be encoded"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for StoreError {}

/// Access to the page of non-volatile storage.
pub trait ConfigStore {
    fn read_page(&mut self, page: &mut Page) -> Result<(), StoreError>;
    fn write_page(&mut self, page: &Page) -> Result<(), StoreError>;
}

/// Everything we keep across power cycles.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Encode, Decode)]
#[cbor(tag(0x6b65796d6170))]
#[cbor(map)]
pub struct KeymapConfig {
    /// The persistent default layer.
    #[n(1)]
    pub default_layer: u8,

    /// Host should use the n-key rollover report.  Steno needs this.
    #[n(2)]
    pub nkro: bool,

    /// Audio cues are wanted.
    #[n(3)]
    pub audio: bool,

    /// Send GUI for Alt and Alt for GUI.
    #[n(4)]
    pub swap_alt_gui: bool,
}

impl Default for KeymapConfig {
    fn default() -> Self {
        KeymapConfig {
            default_layer: 0,
            nkro: false,
            audio: true,
            swap_alt_gui: false,
        }
    }
}

impl KeymapConfig {
    pub fn new(default_layer: LayerId) -> Self {
        KeymapConfig {
            default_layer: default_layer.0,
            ..KeymapConfig::default()
        }
    }

    pub fn default_layer(&self) -> LayerId {
        LayerId(self.default_layer)
    }

    /// Build the page image for this record.
    pub fn encode_page(&self) -> Result<Page, StoreError> {
        let body = minicbor::to_vec(self).map_err(|_| StoreError::Encode)?;
        let len = body.len();
        if len + OVERHEAD > PAGE_SIZE {
            return Err(StoreError::TooLarge(len));
        }

        let mut page = [ERASED; PAGE_SIZE];
        page[..2].copy_from_slice(&(len as u16).to_le_bytes());
        page[2..2 + len].copy_from_slice(&body);
        page[2 + len..OVERHEAD + len].copy_from_slice(&CRC.checksum(&body).to_le_bytes());
        Ok(page)
    }

    /// Decode a page image.  An erased page, or one that doesn't check out, is
    /// `None`.
    pub fn decode_page(page: &Page) -> Option<KeymapConfig> {
        let len = u16::from_le_bytes([page[0], page[1]]) as usize;
        if len == 0xffff {
            return None;
        }
        if len + OVERHEAD > PAGE_SIZE {
            warn!("Config page has bad length {}", len);
            return None;
        }

        let body = &page[2..2 + len];
        let crc = u16::from_le_bytes([page[2 + len], page[3 + len]]);
        if CRC.checksum(body) != crc {
            warn!("Config page CRC mismatch");
            return None;
        }

        match minicbor::decode(body) {
            Ok(config) => Some(config),
            Err(_) => {
                warn!("Fail to decode keymap config");
                None
            }
        }
    }
}

/// Read the config record, if there is a good one.
pub fn read_config(store: &mut dyn ConfigStore) -> Option<KeymapConfig> {
    let mut page = [ERASED; PAGE_SIZE];
    if store.read_page(&mut page).is_err() {
        warn!("Fail to read config page");
        return None;
    }
    KeymapConfig::decode_page(&page)
}

pub fn write_config(store: &mut dyn ConfigStore, config: &KeymapConfig) -> Result<(), StoreError> {
    let page = config.encode_page()?;
    store.write_page(&page)
}

/// The saved default layer, if any.
pub fn read_default_layer(store: &mut dyn ConfigStore) -> Option<LayerId> {
    read_config(store).map(|config| config.default_layer())
}

/// Save a new default layer, keeping the rest of the saved config.
pub fn write_default_layer(store: &mut dyn ConfigStore, layer: LayerId) -> Result<(), StoreError> {
    let mut config = read_config(store).unwrap_or_default();
    config.default_layer = layer.0;
    write_config(store, &config)
}

/// A config page held in RAM.  Used by hosts without non-volatile storage, and
/// by tests, which can make writes fail.
pub struct MemStore {
    page: Page,
    fail_writes: bool,
    writes: usize,
}

impl Default for MemStore {
    fn default() -> Self {
        MemStore {
            page: [ERASED; PAGE_SIZE],
            fail_writes: false,
            writes: 0,
        }
    }
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Direct access to the page, as if poking at the flash.
    pub fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }
}

impl ConfigStore for MemStore {
    fn read_page(&mut self, page: &mut Page) -> Result<(), StoreError> {
        page.copy_from_slice(&self.page);
        Ok(())
    }

    fn write_page(&mut self, page: &Page) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Write);
        }
        self.page.copy_from_slice(page);
        self.writes += 1;
        Ok(())
    }
}
