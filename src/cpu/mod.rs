//! CPU emulation for the Pico.
//!
//! This module implements the complete Pico architecture:
//! - 128 one-byte memory cells
//! - 4 registers: PC, ACC (accumulator), IR (instruction), Q (auxiliary)
//! - carry / zero / negative flags
//! - one- and two-cell instructions with direct, indexed and immediate operands

pub mod memory;
pub mod registers;
pub mod flags;
pub mod decode;
pub mod execute;
pub mod scheduler;

pub use memory::{Memory, MEMORY_SIZE};
pub use registers::{Register, Registers, Label, HALTED_PC};
pub use flags::Flags;
pub use decode::{Instruction, AddrMode, DecodeError};
pub use execute::{Cpu, CpuError, StepOutcome, RegisterName, Snapshot};
pub use scheduler::{RunMode, RunHandle, Cadence, Pacer, Tick};
