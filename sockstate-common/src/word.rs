//! The 64-bit state word and its bit-range primitives.
//!
//! ```text
//! entry:  |disc|----function specific----|-id-|------low weight fields------|
//!         63 60 59                     32 31 28 27                          0
//! return: |disc|---general socket state--|--------fine grained fields-------|
//!         63 60 59                     32 31                                0
//! ```

use core::fmt;

/// Top-nibble tag telling entry words from return words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Discriminant {
    Entry = 0xe,
    Return = 0xf,
}

const DISCRIMINANT_SHIFT: u32 = 60;
const DISCRIMINANT_MASK: u64 = 0xf << DISCRIMINANT_SHIFT;

/// Replaces bits 60-63 of `word` with `disc` and leaves everything else alone.
#[inline(always)]
pub const fn apply_mask(word: u64, disc: Discriminant) -> u64 {
    (word & !DISCRIMINANT_MASK) | ((disc as u64) << DISCRIMINANT_SHIFT)
}

/// A contiguous bit range inside a state word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    shift: u32,
    mask: u64,
}

impl Field {
    /// `width` bits starting at bit `shift`.
    pub const fn new(shift: u32, width: u32) -> Self {
        assert!(width > 0 && width < 64);
        assert!(shift + width <= DISCRIMINANT_SHIFT);
        Field {
            shift,
            mask: (1 << width) - 1,
        }
    }

    /// Single bit flag at `shift`.
    pub const fn bit(shift: u32) -> Self {
        Field::new(shift, 1)
    }

    pub const fn shift(&self) -> u32 {
        self.shift
    }

    pub const fn width(&self) -> u32 {
        self.mask.count_ones()
    }

    /// The bits this field may occupy, in word position.
    pub const fn span(&self) -> u64 {
        self.mask << self.shift
    }

    /// Word contribution of `raw`, truncated to the field width.
    #[inline(always)]
    pub const fn pack(&self, raw: u64) -> u64 {
        (raw & self.mask) << self.shift
    }
}

/// Function id, bits 28-31 of an entry word.
pub const FUNCTION_ID: Field = Field::new(28, 4);

/// A state word under construction or ready for emission.
///
/// Fields are only ever ORed in; nothing reads partial state back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct StateWord(u64);

impl StateWord {
    pub const fn empty() -> Self {
        StateWord(0)
    }

    /// Starts an entry word carrying `id` in bits 28-31.
    pub const fn with_function_id(id: u8) -> Self {
        StateWord(FUNCTION_ID.pack(id as u64))
    }

    #[inline(always)]
    pub fn set(&mut self, field: Field, raw: u64) {
        self.0 |= field.pack(raw);
    }

    #[inline(always)]
    pub fn set_if(&mut self, field: Field, cond: bool) {
        if cond {
            self.0 |= field.pack(1);
        }
    }

    /// Forces the top nibble. Must be the last write.
    #[inline(always)]
    pub const fn finish(self, disc: Discriminant) -> Self {
        StateWord(apply_mask(self.0, disc))
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn discriminant_bits(self) -> u8 {
        (self.0 >> DISCRIMINANT_SHIFT) as u8
    }
}

impl From<StateWord> for u64 {
    fn from(word: StateWord) -> u64 {
        word.0
    }
}

impl fmt::LowerHex for StateWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// The trace line body: lowercase hex, no prefix, no padding.
impl fmt::Display for StateWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}
