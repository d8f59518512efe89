//! A fixed-capacity bitboard for square boards of runtime size.
//!
//! Boards up to `MAX_BOARD_SIZE`×`MAX_BOARD_SIZE` are packed into a small
//! array of `u64` words, so the type stays `Copy` and never allocates.
//! Cells are addressed as `(x, y)` where `x` is the column and `y` the row.

use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};
use core::fmt;

/// Largest supported board edge.
pub const MAX_BOARD_SIZE: u8 = 20;

const CELLS: usize = MAX_BOARD_SIZE as usize * MAX_BOARD_SIZE as usize;
const WORDS: usize = CELLS.div_ceil(64);

/// Errors returned by bitboard operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitBoardError {
    /// Requested board edge exceeds `MAX_BOARD_SIZE`.
    #[error("board size {size} exceeds the maximum of {max}")]
    SizeTooLarge { size: u8, max: u8 },
    /// Cell lies outside `[0, size)` on either axis.
    #[error("cell ({x}, {y}) is outside a {size}x{size} board")]
    IndexOutOfBounds { x: i32, y: i32, size: u8 },
}

/// An N×N bitboard where N is chosen at construction time.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitBoard {
    size: u8,
    words: [u64; WORDS],
}

impl BitBoard {
    /// Create an empty board. Sizes above `MAX_BOARD_SIZE` are clamped.
    #[inline]
    pub fn new(size: u8) -> Self {
        BitBoard {
            size: size.min(MAX_BOARD_SIZE),
            words: [0; WORDS],
        }
    }

    /// Fallible constructor: returns `Err(SizeTooLarge)` instead of clamping.
    pub fn try_new(size: u8) -> Result<Self, BitBoardError> {
        if size > MAX_BOARD_SIZE {
            Err(BitBoardError::SizeTooLarge {
                size,
                max: MAX_BOARD_SIZE,
            })
        } else {
            Ok(Self::new(size))
        }
    }

    /// Board edge length.
    #[inline]
    pub fn size(&self) -> u8 {
        self.size
    }

    /// Number of cells on the board (`size * size`).
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.size as usize * self.size as usize
    }

    /// Returns `true` if `(x, y)` lies on the board.
    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.size as i32 && y < self.size as i32
    }

    /// Returns the number of set cells.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns true if no cells are set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Returns true if every cell of the board is set.
    pub fn is_full(&self) -> bool {
        self.count_ones() == self.cell_count()
    }

    /// Returns true if both boards share at least one set cell.
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Gets the bit at `(x, y)`.
    pub fn get(&self, x: i32, y: i32) -> Result<bool, BitBoardError> {
        let idx = self.index(x, y)?;
        Ok(self.words[idx / 64] >> (idx % 64) & 1 == 1)
    }

    /// Like [`get`](Self::get) but treats off-board cells as unset.
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.get(x, y).unwrap_or(false)
    }

    /// Sets the bit at `(x, y)`.
    pub fn set(&mut self, x: i32, y: i32) -> Result<(), BitBoardError> {
        let idx = self.index(x, y)?;
        self.words[idx / 64] |= 1 << (idx % 64);
        Ok(())
    }

    /// Clears the bit at `(x, y)`.
    pub fn clear(&mut self, x: i32, y: i32) -> Result<(), BitBoardError> {
        let idx = self.index(x, y)?;
        self.words[idx / 64] &= !(1 << (idx % 64));
        Ok(())
    }

    /// Sets all board cells.
    pub fn fill(&mut self) {
        self.words = Self::mask(self.size);
    }

    /// Clears all cells.
    #[inline]
    pub fn clear_all(&mut self) {
        self.words = [0; WORDS];
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Result<usize, BitBoardError> {
        if self.in_bounds(x, y) {
            Ok(y as usize * self.size as usize + x as usize)
        } else {
            Err(BitBoardError::IndexOutOfBounds {
                x,
                y,
                size: self.size,
            })
        }
    }

    fn mask(size: u8) -> [u64; WORDS] {
        let cells = size as usize * size as usize;
        let mut words = [0u64; WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            let start = i * 64;
            if cells >= start + 64 {
                *word = !0;
            } else if cells > start {
                *word = (1u64 << (cells - start)) - 1;
            }
        }
        words
    }

    /// Builds a board from `(x, y)` positions, rejecting off-board cells.
    pub fn from_cells<I>(size: u8, cells: I) -> Result<Self, BitBoardError>
    where
        I: IntoIterator<Item = (i32, i32)>,
    {
        let mut board = Self::new(size);
        for (x, y) in cells {
            board.set(x, y)?;
        }
        Ok(board)
    }

    /// Builds a board from `(x, y)` positions, silently dropping off-board cells.
    pub fn from_cells_clipped<I>(size: u8, cells: I) -> Self
    where
        I: IntoIterator<Item = (i32, i32)>,
    {
        let mut board = Self::new(size);
        for (x, y) in cells {
            let _ = board.set(x, y);
        }
        board
    }

    /// Iterator over the set cells in row-major order.
    #[inline]
    pub fn iter_set_bits(&self) -> SetBits<'_> {
        SetBits {
            board: self,
            idx: 0,
        }
    }
}

impl fmt::Debug for BitBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BitBoard<{}>:", self.size)?;
        fmt::Display::fmt(self, f)?;
        writeln!(f)
    }
}

impl fmt::Display for BitBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.size as i32 {
            for x in 0..self.size as i32 {
                let bit = if self.contains(x, y) { '■' } else { '□' };
                write!(f, "{} ", bit)?;
            }
            if y + 1 < self.size as i32 {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Iterator over the set cells of a bitboard, yielding `(x, y)`.
#[derive(Clone, Copy)]
pub struct SetBits<'a> {
    board: &'a BitBoard,
    idx: usize,
}

impl Iterator for SetBits<'_> {
    type Item = (u8, u8);

    fn next(&mut self) -> Option<Self::Item> {
        let size = self.board.size as usize;
        while self.idx < size * size {
            let idx = self.idx;
            self.idx += 1;
            if self.board.words[idx / 64] >> (idx % 64) & 1 == 1 {
                return Some(((idx % size) as u8, (idx / size) as u8));
            }
        }
        None
    }
}

// Binary operators keep the left operand's size; both sides are expected to
// describe the same board.

impl BitAnd for BitBoard {
    type Output = Self;
    fn bitand(mut self, rhs: Self) -> Self {
        self &= rhs;
        self
    }
}

impl BitOr for BitBoard {
    type Output = Self;
    fn bitor(mut self, rhs: Self) -> Self {
        self |= rhs;
        self
    }
}

/// Complement within the board bounds.
impl Not for BitBoard {
    type Output = Self;
    fn not(self) -> Self {
        let mask = Self::mask(self.size);
        let mut out = self;
        for (w, m) in out.words.iter_mut().zip(mask.iter()) {
            *w = !*w & m;
        }
        out
    }
}

impl BitAndAssign for BitBoard {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        for (a, b) in self.words.iter_mut().zip(rhs.words.iter()) {
            *a &= b;
        }
    }
}

impl BitOrAssign for BitBoard {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        let mask = Self::mask(self.size);
        for ((a, b), m) in self.words.iter_mut().zip(rhs.words.iter()).zip(mask.iter()) {
            *a = (*a | b) & m;
        }
    }
}
