//! Assembler, disassembler and memory image format for Pico programs.
//!
//! This module provides:
//! - A simple two-pass assembler (text → memory image)
//! - A disassembler (memory → readable text)
//! - The plain-text memory image codec used for load/save

pub mod assembler;
pub mod disasm;
pub mod csv;

pub use assembler::{assemble, AssemblerError};
pub use disasm::{disassemble, disassemble_at};
pub use csv::{load_memory, save_memory, CsvError};
