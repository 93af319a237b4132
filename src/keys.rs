//! Keys on the board
//!
//! The Planck is a 4x12 grid with no gaps in the matrix, so every (row,
//! column) pair is a real switch.  Scan codes from the matrix are the linear
//! index `row * COLS + col`, which is what the host firmware hands us.

/// Number of rows in the matrix.
pub const ROWS: usize = 4;

/// Number of columns in the matrix.
pub const COLS: usize = 12;

/// All of the scancodes fit within this.
pub const NKEYS: usize = ROWS * COLS;

/// A single physical switch.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyPosition {
    pub row: u8,
    pub col: u8,
}

impl KeyPosition {
    pub const fn new(row: u8, col: u8) -> Self {
        KeyPosition { row, col }
    }

    /// Build a position from a linear scan code.
    pub fn from_index(index: usize) -> Option<Self> {
        if index < NKEYS {
            Some(KeyPosition {
                row: (index / COLS) as u8,
                col: (index % COLS) as u8,
            })
        } else {
            None
        }
    }

    /// Is this position on the board at all.
    pub fn is_valid(&self) -> bool {
        (self.row as usize) < ROWS && (self.col as usize) < COLS
    }

    /// The linear scan code of this position.  Only meaningful for valid
    /// positions.
    pub fn index(&self) -> usize {
        self.row as usize * COLS + self.col as usize
    }

    /// Iterate over every position on the board, in scan order.
    pub fn all() -> impl Iterator<Item = KeyPosition> {
        (0..NKEYS).filter_map(KeyPosition::from_index)
    }
}

#[test]
fn test_positions() {
    assert_eq!(KeyPosition::new(3, 11).index(), NKEYS - 1);
    assert_eq!(KeyPosition::from_index(13), Some(KeyPosition::new(1, 1)));
    assert_eq!(KeyPosition::from_index(NKEYS), None);
    assert!(!KeyPosition::new(4, 0).is_valid());
    assert!(!KeyPosition::new(0, 12).is_valid());
    assert_eq!(KeyPosition::all().count(), NKEYS);
    for (i, pos) in KeyPosition::all().enumerate() {
        assert_eq!(pos.index(), i);
    }
}
