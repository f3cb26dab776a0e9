//! Condition flags.

use serde::Serialize;

/// Carry, zero and negative flags.
///
/// Always rebuilt from the outcome of the last arithmetic or logic
/// instruction, never patched bit by bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Flags {
    pub carry: bool,
    pub zero: bool,
    pub negative: bool,
}

impl Flags {
    /// All flags clear.
    pub const fn new() -> Self {
        Self { carry: false, zero: false, negative: false }
    }

    /// Flags for an unwrapped ALU result.
    ///
    /// Carry is set when `wide` does not fit in a byte; zero and negative
    /// look at the wrapped byte.
    pub fn from_wide(wide: i32) -> Self {
        let byte = wide.rem_euclid(256) as u8;
        Self::from_byte(byte, !(0..=0xFF).contains(&wide))
    }

    /// Flags for a byte result with an explicit carry-out.
    pub fn from_byte(result: u8, carry: bool) -> Self {
        Self {
            carry,
            zero: result == 0,
            negative: result & 0x80 != 0,
        }
    }

    /// Clear all three flags.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
