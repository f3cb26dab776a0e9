//! WebAssembly bindings for the Pico emulator.
//!
//! The browser owns the timer: call `start_running`, then call `tick` every
//! returned number of milliseconds until it returns `false`.

use wasm_bindgen::prelude::*;
use crate::cpu::{Cpu, RunHandle, Tick, MEMORY_SIZE};
use crate::asm::assembler::assemble;
use crate::asm::disasm::disassemble_at;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly machine wrapper.
#[wasm_bindgen]
pub struct WasmMachine {
    cpu: Cpu,
    run: Option<RunHandle>,
}

#[wasm_bindgen]
impl WasmMachine {
    /// Create a new machine with zeroed memory.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            run: None,
        }
    }

    /// Load a program from assembly source code at address 0.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let program = assemble(source)
            .map_err(|e| JsError::new(&format!("{}", e)))?;

        self.halt();
        self.cpu.load_program(0, &program)
            .map_err(|e| JsError::new(&format!("{}", e)))?;

        Ok(program.len())
    }

    /// Replace memory from its comma-separated hex form.
    #[wasm_bindgen]
    pub fn load_csv(&mut self, text: &str) -> Result<(), JsError> {
        self.run = None;
        self.cpu.load_memory_text(text)
            .map_err(|e| JsError::new(&format!("{}", e)))
    }

    /// Memory in comma-separated hex form.
    #[wasm_bindgen]
    pub fn save_csv(&self) -> String {
        self.cpu.save_memory_text()
    }

    /// Register a JavaScript callback fired after every state change.
    #[wasm_bindgen]
    pub fn set_on_change(&mut self, callback: js_sys::Function) {
        self.cpu.set_on_change(move |_| {
            // Exceptions thrown by the callback are dropped.
            let _ = callback.call0(&JsValue::NULL);
        });
    }

    #[wasm_bindgen]
    pub fn clear_on_change(&mut self) {
        self.cpu.clear_on_change();
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let listing = self.cpu.regs().pc_address().map(|pc| disassemble_at(self.cpu.mem(), pc).0);
        self.cpu.step()
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        Ok(listing.unwrap_or_default())
    }

    /// Start continuous execution. Returns the tick period in milliseconds.
    #[wasm_bindgen]
    pub fn start_running(&mut self, fast: bool) -> u32 {
        self.run = Some(self.cpu.start_running(fast));
        self.cpu.period().map_or(0, |p| p.as_millis() as u32)
    }

    /// Run one scheduled cycle. Returns whether the host should keep
    /// ticking.
    #[wasm_bindgen]
    pub fn tick(&mut self) -> bool {
        let Some(handle) = self.run.as_ref() else {
            return false;
        };
        match self.cpu.run_cycle(handle) {
            Tick::Stepped => true,
            Tick::Stopped | Tick::Cancelled => {
                self.run = None;
                false
            }
        }
    }

    /// Stop continuous execution.
    #[wasm_bindgen]
    pub fn halt(&mut self) {
        self.run = None;
        self.cpu.halt();
    }

    /// Reset registers and flags; memory is kept.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.run = None;
        self.cpu.reset();
    }

    /// Store user text (0-2 hex digits) into a memory cell.
    #[wasm_bindgen]
    pub fn edit_cell(&mut self, addr: usize, text: &str) -> bool {
        addr < MEMORY_SIZE && self.cpu.edit_cell(addr, text)
    }

    #[wasm_bindgen]
    pub fn shift_up(&mut self, addr: usize) {
        if addr < MEMORY_SIZE {
            self.cpu.shift_up(addr);
        }
    }

    #[wasm_bindgen]
    pub fn shift_down(&mut self, addr: usize) {
        if addr < MEMORY_SIZE {
            self.cpu.shift_down(addr);
        }
    }

    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    /// Run-mode as string: "Stopped", "Slow" or "Fast".
    #[wasm_bindgen]
    pub fn run_mode(&self) -> String {
        format!("{:?}", self.cpu.run_mode())
    }

    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles()
    }

    /// Status line text.
    #[wasm_bindgen]
    pub fn last_message(&self) -> String {
        self.cpu.last_message().to_string()
    }

    /// Whether the status line reports a failure.
    #[wasm_bindgen]
    pub fn is_error(&self) -> bool {
        self.cpu.last_message_is_error()
    }

    #[wasm_bindgen]
    pub fn pc(&self) -> u8 {
        self.cpu.regs().pc.get()
    }

    #[wasm_bindgen]
    pub fn acc(&self) -> u8 {
        self.cpu.regs().acc.get()
    }

    #[wasm_bindgen]
    pub fn ir(&self) -> u8 {
        self.cpu.regs().ir.get()
    }

    #[wasm_bindgen]
    pub fn q(&self) -> u8 {
        self.cpu.regs().q.get()
    }

    /// Get memory cell value at address (0-127).
    #[wasm_bindgen]
    pub fn memory_at(&self, addr: usize) -> u8 {
        if addr < MEMORY_SIZE {
            self.cpu.mem().read(addr)
        } else {
            0
        }
    }

    /// All of memory in address order.
    #[wasm_bindgen]
    pub fn memory_all(&self) -> Vec<u8> {
        self.cpu.mem().bytes().to_vec()
    }

    /// Full machine state as a JSON string.
    #[wasm_bindgen]
    pub fn snapshot_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.cpu.snapshot())
            .map_err(|e| JsError::new(&format!("{}", e)))
    }
}

impl Default for WasmMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble source code and return the program size in bytes.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<usize, JsError> {
    let program = assemble(source)
        .map_err(|e| JsError::new(&format!("{}", e)))?;
    Ok(program.len())
}
