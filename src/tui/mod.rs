//! TUI debugger for the Pico emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register and flag panel
//! - 16×8 memory grid with an in-place cell editor
//! - Step/run/stop controls at slow or fast cadence
//! - Disassembly view following the PC

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
