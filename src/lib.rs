//! # Pico Emulator
//!
//! An educational 8-bit accumulator machine: 128 bytes of memory, four
//! registers (PC, ACC, IR, Q), three flags and a fail-stop
//! fetch/decode/execute cycle that can be stepped or run at a slow or fast
//! cadence.
//!
//! The machine is host-agnostic. Hosts drive continuous execution through
//! [`Cpu::start_running`] and [`Cpu::run_cycle`], and observe it through
//! the change hook installed with [`Cpu::set_on_change`].

pub mod cpu;
pub mod asm;
pub mod config;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{
    Cpu, CpuError, StepOutcome, RegisterName, Snapshot, Memory, MEMORY_SIZE, Register, Registers,
    Flags, Instruction, RunMode, RunHandle, Cadence, Pacer, Tick,
};
pub use asm::{assemble, disassemble, disassemble_at, csv, AssemblerError, CsvError};
pub use config::{Config, ConfigError};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
