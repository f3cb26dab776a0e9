//! Pico registers.
//!
//! Every storage cell in the machine is a [`Register`]: one byte with a
//! canonical two-digit hex form and a static label. The register file holds
//! the four architectural registers:
//! - PC: program counter (0x00-0x7F, or the halted sentinel)
//! - ACC: accumulator (main computation register)
//! - IR: instruction register (opcode fetched this cycle)
//! - Q: auxiliary operand register (index, transfer and ALU second operand)

use std::fmt;
use serde::Serialize;

use crate::cpu::memory::MEMORY_SIZE;

/// Program counter value written by `HLT`.
///
/// Any PC at or above [`MEMORY_SIZE`] counts as halted; this is just the
/// canonical one.
pub const HALTED_PC: u8 = 0xFF;

/// Human-readable name of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Label {
    /// An architectural register such as `PC` or `ACC`.
    Named(&'static str),
    /// A memory cell, named by its address.
    Cell(u8),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Named(name) => f.pad(name),
            Label::Cell(addr) => f.pad(&format!("0x{:02X}", addr)),
        }
    }
}

/// A single 8-bit storage cell.
///
/// Only the numeric value is stored, so the hex text is always the
/// zero-padded encoding of it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    value: u8,
    label: Label,
}

impl Register {
    /// Create a zeroed register.
    pub const fn new(label: Label) -> Self {
        Self { value: 0, label }
    }

    /// Create a zeroed architectural register.
    pub const fn named(name: &'static str) -> Self {
        Self::new(Label::Named(name))
    }

    /// Current value.
    #[inline]
    pub const fn get(&self) -> u8 {
        self.value
    }

    /// The register's label.
    #[inline]
    pub const fn label(&self) -> Label {
        self.label
    }

    /// Canonical two-digit uppercase hex text.
    pub fn hex(&self) -> String {
        format!("{:02X}", self.value)
    }

    /// Store a byte.
    #[inline]
    pub fn set(&mut self, value: u8) {
        self.value = value;
    }

    /// Store an arbitrary integer, wrapping modulo 256.
    pub fn set_from_value(&mut self, n: i32) {
        self.value = n.rem_euclid(256) as u8;
    }

    /// Store a value typed by a user.
    ///
    /// Accepts 0-2 hex digits in either case; the empty string reads as
    /// zero. Anything else is rejected and leaves the register untouched.
    pub fn set_from_text(&mut self, text: &str) -> bool {
        match parse_hex(text) {
            Some(value) => {
                self.value = value;
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.value)
    }
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:02X}", self.label, self.value)
    }
}

/// Parse 0-2 hex digits.
pub(crate) fn parse_hex(text: &str) -> Option<u8> {
    if text.len() > 2 || !text.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    if text.is_empty() {
        return Some(0);
    }
    u8::from_str_radix(text, 16).ok()
}

/// The Pico register file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registers {
    /// PC: address of the next instruction.
    pub pc: Register,

    /// ACC: accumulator.
    pub acc: Register,

    /// IR: opcode fetched by the current cycle.
    pub ir: Register,

    /// Q: auxiliary operand register.
    pub q: Register,
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub const fn new() -> Self {
        Self {
            pc: Register::named("PC"),
            acc: Register::named("ACC"),
            ir: Register::named("IR"),
            q: Register::named("Q"),
        }
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Address the PC points at, or `None` once halted.
    pub fn pc_address(&self) -> Option<usize> {
        let pc = self.pc.get() as usize;
        (pc < MEMORY_SIZE).then_some(pc)
    }

    /// Whether the PC sits outside memory.
    pub fn is_halted(&self) -> bool {
        self.pc_address().is_none()
    }

    /// Advance the PC past an instruction of `len` cells, wrapping at the
    /// end of memory.
    pub fn advance_pc(&mut self, len: usize) {
        if let Some(pc) = self.pc_address() {
            self.pc.set(((pc + len) % MEMORY_SIZE) as u8);
        }
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u8) {
        self.pc.set(addr);
    }

    /// Park the PC on the halted sentinel.
    pub fn halt(&mut self) {
        self.pc.set(HALTED_PC);
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
