//! CPU execution engine for the Pico.
//!
//! Implements the fetch-decode-execute cycle, the status line, the change
//! hook and the run-mode transitions used by hosts that tick the machine.

use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::asm::csv::{self, CsvError};
use crate::cpu::decode::{self, AddrMode, DecodeError, Instruction};
use crate::cpu::flags::Flags;
use crate::cpu::memory::{MemoryError, MEMORY_SIZE};
use crate::cpu::scheduler::{Cadence, RunHandle, RunMode, Scheduler, Tick};
use crate::cpu::{Memory, Registers};

/// What a successful [`Cpu::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One instruction ran and the PC still points into memory.
    Executed(Instruction),
    /// `HLT` ran; the PC now holds the halted sentinel.
    Halted,
    /// The PC was already halted, so nothing happened.
    Idle,
}

/// Architectural register selector for text edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterName {
    Pc,
    Acc,
    Ir,
    Q,
}

/// Callback run after every state change.
pub type ChangeHook = Box<dyn FnMut(&Cpu)>;

/// The Pico CPU.
pub struct Cpu {
    regs: Registers,
    flags: Flags,
    mem: Memory,
    /// Instruction count (for profiling).
    cycles: u64,
    last_message: String,
    last_message_is_error: bool,
    scheduler: Scheduler,
    cadence: Cadence,
    on_change: Option<ChangeHook>,
}

impl Cpu {
    /// Create a new CPU with zeroed state.
    pub fn new() -> Self {
        Self::with_cadence(Cadence::default())
    }

    /// Create a new CPU that reports `cadence` to its hosts.
    pub fn with_cadence(cadence: Cadence) -> Self {
        Self {
            regs: Registers::new(),
            flags: Flags::new(),
            mem: Memory::new(),
            cycles: 0,
            last_message: String::new(),
            last_message_is_error: false,
            scheduler: Scheduler::default(),
            cadence,
            on_change: None,
        }
    }

    // ==================== Accessors ====================

    pub fn regs(&self) -> &Registers {
        &self.regs
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn mem(&self) -> &Memory {
        &self.mem
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn run_mode(&self) -> RunMode {
        self.scheduler.mode()
    }

    /// Outcome text of the most recent step.
    pub fn last_message(&self) -> &str {
        &self.last_message
    }

    pub fn last_message_is_error(&self) -> bool {
        self.last_message_is_error
    }

    /// Check if the PC has left memory.
    pub fn is_halted(&self) -> bool {
        self.regs.is_halted()
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn set_cadence(&mut self, cadence: Cadence) {
        self.cadence = cadence;
    }

    /// How long the host should wait between scheduled cycles, or `None`
    /// while stopped.
    pub fn period(&self) -> Option<Duration> {
        self.cadence.period(self.run_mode())
    }

    // ==================== Change hook ====================

    /// Install the change hook, replacing any previous one.
    ///
    /// The hook gets read-only access to the CPU and so cannot call back
    /// into mutating operations.
    pub fn set_on_change<F>(&mut self, hook: F)
    where
        F: FnMut(&Cpu) + 'static,
    {
        self.on_change = Some(Box::new(hook));
    }

    pub fn clear_on_change(&mut self) {
        self.on_change = None;
    }

    fn notify(&mut self) {
        if let Some(mut hook) = self.on_change.take() {
            hook(self);
            self.on_change = Some(hook);
        }
    }

    // ==================== Lifecycle ====================

    /// Reset registers, flags, status and run-mode. Memory is kept so a
    /// program does not need reloading.
    pub fn reset(&mut self) {
        self.scheduler.stop();
        self.regs.reset();
        self.flags.reset();
        self.cycles = 0;
        self.set_status(String::new(), false);
        info!("reset");
        self.notify();
    }

    /// Load a program into memory starting at `start_addr`. Halts first.
    pub fn load_program(&mut self, start_addr: usize, program: &[u8]) -> Result<(), MemoryError> {
        self.halt();
        self.mem.load_program(start_addr, program)?;
        self.notify();
        Ok(())
    }

    /// Replace all of memory from its text form. Halts first; on error
    /// memory is unchanged.
    pub fn load_memory_text(&mut self, text: &str) -> Result<(), CsvError> {
        self.halt();
        csv::load_memory(&mut self.mem, text)?;
        info!("memory loaded");
        self.notify();
        Ok(())
    }

    /// Text form of all of memory.
    pub fn save_memory_text(&self) -> String {
        csv::save_memory(&self.mem)
    }

    /// Edit a memory cell from user text. Returns false, with nothing
    /// changed, if the text is not 0-2 hex digits.
    ///
    /// # Panics
    /// Panics if address is out of range.
    pub fn edit_cell(&mut self, addr: usize, text: &str) -> bool {
        let accepted = self.mem.get_mut(addr).set_from_text(text);
        if accepted {
            self.notify();
        }
        accepted
    }

    /// Edit an architectural register from user text.
    pub fn edit_register(&mut self, name: RegisterName, text: &str) -> bool {
        let reg = match name {
            RegisterName::Pc => &mut self.regs.pc,
            RegisterName::Acc => &mut self.regs.acc,
            RegisterName::Ir => &mut self.regs.ir,
            RegisterName::Q => &mut self.regs.q,
        };
        let accepted = reg.set_from_text(text);
        if accepted {
            self.notify();
        }
        accepted
    }

    /// Delete the memory cell at `addr`, moving later cells down one
    /// address.
    pub fn shift_up(&mut self, addr: usize) {
        self.mem.shift_up(addr);
        self.notify();
    }

    /// Insert a zero cell at `addr`, moving later cells up one address.
    pub fn shift_down(&mut self, addr: usize) {
        self.mem.shift_down(addr);
        self.notify();
    }

    // ==================== Run control ====================

    /// Begin continuous execution. The host drives it by calling
    /// [`Cpu::run_cycle`] with the returned handle every [`Cpu::period`].
    pub fn start_running(&mut self, fast: bool) -> RunHandle {
        let mode = if fast { RunMode::Fast } else { RunMode::Slow };
        let handle = self.scheduler.start(mode);
        info!("running ({:?})", mode);
        self.notify();
        handle
    }

    /// Stop continuous execution. Every outstanding [`RunHandle`] is dead
    /// once this returns. Does nothing when already stopped.
    pub fn halt(&mut self) {
        if self.scheduler.stop() {
            info!("stopped at PC=0x{:02X}", self.regs.pc.get());
            self.notify();
        }
    }

    /// Run one scheduled cycle for `handle`.
    pub fn run_cycle(&mut self, handle: &RunHandle) -> Tick {
        if !self.scheduler.is_live(handle) {
            return Tick::Cancelled;
        }

        match self.step() {
            Ok(StepOutcome::Executed(_)) if self.run_mode().is_running() => Tick::Stepped,
            Ok(StepOutcome::Idle) => {
                self.halt();
                Tick::Stopped
            }
            Ok(_) | Err(_) => Tick::Stopped,
        }
    }

    // ==================== Fetch / decode / execute ====================

    /// Execute a single instruction.
    ///
    /// On failure the error is also written to the status line and the
    /// run-mode drops to stopped. A failed cycle changes nothing but IR.
    pub fn step(&mut self) -> Result<StepOutcome, CpuError> {
        let Some(pc) = self.regs.pc_address() else {
            return Ok(StepOutcome::Idle);
        };

        // Fetch
        let opcode = self.mem.read(pc);
        let operand = self.mem.read((pc + 1) % MEMORY_SIZE);
        self.regs.ir.set(opcode);

        // Decode and execute
        let result = decode::decode(opcode, operand)
            .map_err(|source| CpuError::Decode { addr: pc as u8, source })
            .and_then(|instr| self.execute(pc, instr).map(|()| instr));

        let outcome = match result {
            Ok(instr) => {
                self.cycles += 1;
                debug!(
                    "{:02X}: {:<12} ACC={} Q={} {:?}",
                    pc, instr.to_string(), self.regs.acc, self.regs.q, self.flags
                );
                if self.regs.is_halted() {
                    info!("halted at 0x{:02X} after {} cycles", pc, self.cycles);
                    self.set_status(format!("Halted at 0x{:02X}", pc), false);
                    self.scheduler.stop();
                    Ok(StepOutcome::Halted)
                } else {
                    self.set_status(format!("0x{:02X}: {}", pc, instr), false);
                    Ok(StepOutcome::Executed(instr))
                }
            }
            Err(e) => {
                warn!("{}", e);
                self.set_status(e.to_string(), true);
                self.scheduler.stop();
                Err(e)
            }
        };

        self.notify();
        outcome
    }

    fn set_status(&mut self, message: String, is_error: bool) {
        self.last_message = message;
        self.last_message_is_error = is_error;
    }

    /// Execute a decoded instruction.
    ///
    /// Works on copies of the registers and defers the memory write, so
    /// nothing is committed unless the whole instruction succeeds.
    fn execute(&mut self, pc: usize, instr: Instruction) -> Result<(), CpuError> {
        let mut regs = self.regs;
        let mut flags = self.flags;
        let mut store: Option<(usize, u8)> = None;
        let mut next_pc = Some(instr.cells());

        let acc = regs.acc.get();
        let q = regs.q.get();

        match instr {
            // ==================== Implied ====================

            Instruction::Hlt => {
                regs.halt();
                next_pc = None;
            }

            Instruction::Nop => {}

            Instruction::Taq => regs.q.set(acc),

            Instruction::Tqa => regs.acc.set(q),

            Instruction::Swp => {
                regs.acc.set(q);
                regs.q.set(acc);
            }

            Instruction::Not => {
                let result = !acc;
                regs.acc.set(result);
                flags = Flags::from_byte(result, false);
            }

            Instruction::Neg => flags = set_wide(&mut regs, -(acc as i32)),

            Instruction::Inc => flags = set_wide(&mut regs, acc as i32 + 1),

            Instruction::Dec => flags = set_wide(&mut regs, acc as i32 - 1),

            Instruction::Shl => {
                let result = acc << 1;
                regs.acc.set(result);
                flags = Flags::from_byte(result, acc & 0x80 != 0);
            }

            Instruction::Shr => {
                let result = acc >> 1;
                regs.acc.set(result);
                flags = Flags::from_byte(result, acc & 0x01 != 0);
            }

            Instruction::Rol => {
                let result = acc.rotate_left(1);
                regs.acc.set(result);
                flags = Flags::from_byte(result, acc & 0x80 != 0);
            }

            Instruction::Ror => {
                let result = acc.rotate_right(1);
                regs.acc.set(result);
                flags = Flags::from_byte(result, acc & 0x01 != 0);
            }

            Instruction::Adq => flags = set_wide(&mut regs, acc as i32 + q as i32),

            Instruction::Sbq => flags = set_wide(&mut regs, acc as i32 - q as i32),

            Instruction::Cpq => flags = Flags::from_wide(acc as i32 - q as i32),

            // ==================== Literal ====================

            Instruction::Ldi { value } => regs.acc.set(value),

            // ==================== Operand ====================

            Instruction::Lda { arg, mode } => {
                let value = self.operand(pc, &regs, arg, mode)?;
                regs.acc.set(value);
            }

            Instruction::Ldq { arg, mode } => {
                let value = self.operand(pc, &regs, arg, mode)?;
                regs.q.set(value);
            }

            Instruction::Sta { arg, mode } => {
                let addr = self.effective_address(pc, &regs, arg, mode)?;
                store = Some((addr, acc));
            }

            Instruction::Stq { arg, mode } => {
                let addr = self.effective_address(pc, &regs, arg, mode)?;
                store = Some((addr, q));
            }

            Instruction::Add { arg, mode } => {
                let value = self.operand(pc, &regs, arg, mode)?;
                flags = set_wide(&mut regs, acc as i32 + value as i32);
            }

            Instruction::Sub { arg, mode } => {
                let value = self.operand(pc, &regs, arg, mode)?;
                flags = set_wide(&mut regs, acc as i32 - value as i32);
            }

            Instruction::Cmp { arg, mode } => {
                let value = self.operand(pc, &regs, arg, mode)?;
                flags = Flags::from_wide(acc as i32 - value as i32);
            }

            Instruction::And { arg, mode } => {
                let result = acc & self.operand(pc, &regs, arg, mode)?;
                regs.acc.set(result);
                flags = Flags::from_byte(result, false);
            }

            Instruction::Or { arg, mode } => {
                let result = acc | self.operand(pc, &regs, arg, mode)?;
                regs.acc.set(result);
                flags = Flags::from_byte(result, false);
            }

            Instruction::Xor { arg, mode } => {
                let result = acc ^ self.operand(pc, &regs, arg, mode)?;
                regs.acc.set(result);
                flags = Flags::from_byte(result, false);
            }

            // ==================== Control Flow ====================

            Instruction::Jmp { target }
            | Instruction::Jz { target }
            | Instruction::Jnz { target }
            | Instruction::Jc { target }
            | Instruction::Jnc { target }
            | Instruction::Jn { target }
            | Instruction::Jnn { target } => {
                let taken = match instr {
                    Instruction::Jz { .. } => flags.zero,
                    Instruction::Jnz { .. } => !flags.zero,
                    Instruction::Jc { .. } => flags.carry,
                    Instruction::Jnc { .. } => !flags.carry,
                    Instruction::Jn { .. } => flags.negative,
                    Instruction::Jnn { .. } => !flags.negative,
                    _ => true,
                };
                if (target as usize) >= MEMORY_SIZE {
                    return Err(self.bad_address(pc, target as usize));
                }
                if taken {
                    regs.jump(target);
                    next_pc = None;
                }
            }
        }

        if let Some(len) = next_pc {
            regs.advance_pc(len);
        }

        // Commit
        self.regs = regs;
        self.flags = flags;
        if let Some((addr, value)) = store {
            self.mem.write(addr, value);
        }

        Ok(())
    }

    /// Resolve the operand byte of an ALU instruction to a value.
    fn operand(&self, pc: usize, regs: &Registers, arg: u8, mode: AddrMode) -> Result<u8, CpuError> {
        match mode {
            AddrMode::Immediate => Ok(arg),
            _ => Ok(self.mem.read(self.effective_address(pc, regs, arg, mode)?)),
        }
    }

    /// Compute the memory index an operand refers to.
    fn effective_address(&self, pc: usize, regs: &Registers, arg: u8, mode: AddrMode) -> Result<usize, CpuError> {
        let addr = match mode {
            AddrMode::Indexed => arg as usize + regs.q.get() as usize,
            AddrMode::Direct | AddrMode::Immediate => arg as usize,
        };
        if addr >= MEMORY_SIZE {
            return Err(self.bad_address(pc, addr));
        }
        Ok(addr)
    }

    fn bad_address(&self, pc: usize, target: usize) -> CpuError {
        CpuError::InvalidAddress {
            addr: pc as u8,
            opcode: self.regs.ir.get(),
            target,
        }
    }

    // ==================== Snapshot ====================

    /// Serializable copy of the whole machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            pc: self.regs.pc.get(),
            acc: self.regs.acc.get(),
            ir: self.regs.ir.get(),
            q: self.regs.q.get(),
            flags: self.flags,
            run_mode: self.run_mode(),
            cycles: self.cycles,
            last_message: self.last_message.clone(),
            last_message_is_error: self.last_message_is_error,
            memory: self.mem.clone(),
        }
    }
}

/// Store a wide ALU result in ACC and return its flags.
fn set_wide(regs: &mut Registers, wide: i32) -> Flags {
    regs.acc.set_from_value(wide);
    Flags::from_wide(wide)
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("run_mode", &self.run_mode())
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("flags", &self.flags)
            .field("has_hook", &self.on_change.is_some())
            .finish()
    }
}

/// Point-in-time machine state, for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub pc: u8,
    pub acc: u8,
    pub ir: u8,
    pub q: u8,
    pub flags: Flags,
    pub run_mode: RunMode,
    pub cycles: u64,
    pub last_message: String,
    pub last_message_is_error: bool,
    pub memory: Memory,
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("at 0x{addr:02X}: {source}")]
    Decode {
        addr: u8,
        #[source]
        source: DecodeError,
    },

    #[error("at 0x{addr:02X}: opcode 0x{opcode:02X} addresses 0x{target:02X}, outside memory")]
    InvalidAddress { addr: u8, opcode: u8, target: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::registers::HALTED_PC;
    use std::cell::Cell;
    use std::rc::Rc;

    fn make_program(instructions: &[Instruction]) -> Vec<u8> {
        instructions.iter().flat_map(encode).collect()
    }

    fn cpu_with(instructions: &[Instruction]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.load_program(0, &make_program(instructions)).unwrap();
        cpu
    }

    fn run_to_halt(cpu: &mut Cpu) {
        for _ in 0..1000 {
            if cpu.step().unwrap() != StepOutcome::Idle && !cpu.is_halted() {
                continue;
            }
            return;
        }
        panic!("program did not halt");
    }

    fn counter(cpu: &mut Cpu) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let seen = Rc::clone(&count);
        cpu.set_on_change(move |_| seen.set(seen.get() + 1));
        count
    }

    #[test]
    fn test_load_literal_then_halt() {
        let mut cpu = Cpu::new();
        cpu.load_program(0, &[0x15, 0x00]).unwrap();

        assert!(matches!(cpu.step().unwrap(), StepOutcome::Executed(Instruction::Ldi { value: 5 })));
        assert_eq!(cpu.step().unwrap(), StepOutcome::Halted);
        assert_eq!(cpu.regs().acc.get(), 5);
        assert_eq!(cpu.regs().pc.get(), HALTED_PC);

        let before = cpu.snapshot();
        assert_eq!(cpu.step().unwrap(), StepOutcome::Idle);
        let after = cpu.snapshot();
        assert_eq!(before.pc, after.pc);
        assert_eq!(before.acc, after.acc);
        assert_eq!(before.cycles, after.cycles);
        assert_eq!(before.last_message, after.last_message);
    }

    #[test]
    fn test_idle_step_does_not_notify() {
        let mut cpu = cpu_with(&[Instruction::Hlt]);
        cpu.step().unwrap();
        let count = counter(&mut cpu);
        cpu.step().unwrap();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_undefined_opcode_is_fail_stop() {
        let mut cpu = cpu_with(&[
            Instruction::Ldi { value: 7 },
            Instruction::Taq,
            Instruction::Add { arg: 0x10, mode: AddrMode::Immediate },
        ]);
        cpu.mem.write(4, 0xFF);
        for _ in 0..3 {
            cpu.step().unwrap();
        }
        let handle = cpu.start_running(false);
        let before = (cpu.regs().acc, cpu.regs().q, cpu.regs().pc, cpu.flags());

        let err = cpu.step().unwrap_err();
        assert_eq!(err, CpuError::Decode { addr: 4, source: DecodeError::InvalidOpcode(0xFF) });
        assert_eq!((cpu.regs().acc, cpu.regs().q, cpu.regs().pc, cpu.flags()), before);
        assert_eq!(cpu.regs().ir.get(), 0xFF);
        assert!(cpu.last_message_is_error());
        assert!(cpu.last_message().contains("0x04"));
        assert!(cpu.last_message().contains("0xFF"));
        assert_eq!(cpu.run_mode(), RunMode::Stopped);
        assert_eq!(cpu.run_cycle(&handle), Tick::Cancelled);
    }

    #[test]
    fn test_fault_is_recoverable() {
        let mut cpu = Cpu::new();
        cpu.load_program(0, &[0xEE, 0x00]).unwrap();
        assert!(cpu.step().is_err());

        assert!(cpu.edit_cell(0, "13"));
        assert!(matches!(cpu.step().unwrap(), StepOutcome::Executed(_)));
        assert!(!cpu.last_message_is_error());
        assert_eq!(cpu.regs().acc.get(), 3);
    }

    #[test]
    fn test_indexed_store_out_of_range_commits_nothing() {
        let mut cpu = cpu_with(&[
            Instruction::Ldq { arg: 0x10, mode: AddrMode::Immediate },
            Instruction::Ldi { value: 9 },
            Instruction::Sta { arg: 0x75, mode: AddrMode::Indexed },
        ]);
        cpu.step().unwrap();
        cpu.step().unwrap();
        let mem_before = cpu.mem().clone();
        let pc_before = cpu.regs().pc.get();

        let err = cpu.step().unwrap_err();
        assert_eq!(err, CpuError::InvalidAddress { addr: 3, opcode: 0x31, target: 0x85 });
        assert_eq!(cpu.mem(), &mem_before);
        assert_eq!(cpu.regs().pc.get(), pc_before);
        assert_eq!(cpu.regs().ir.get(), 0x31);
    }

    #[test]
    fn test_direct_operand_outside_memory() {
        let mut cpu = cpu_with(&[Instruction::Lda { arg: 0x80, mode: AddrMode::Direct }]);
        assert!(matches!(cpu.step(), Err(CpuError::InvalidAddress { target: 0x80, .. })));
    }

    #[test]
    fn test_jump_target_outside_memory() {
        // Not taken, but the target is still checked.
        let mut cpu = cpu_with(&[Instruction::Jc { target: 0x90 }]);
        assert!(matches!(cpu.step(), Err(CpuError::InvalidAddress { target: 0x90, .. })));
        assert_eq!(cpu.regs().pc.get(), 0);
    }

    #[test]
    fn test_load_add_store() {
        let mut cpu = cpu_with(&[
            Instruction::Lda { arg: 0x40, mode: AddrMode::Direct },
            Instruction::Add { arg: 0x41, mode: AddrMode::Direct },
            Instruction::Sta { arg: 0x42, mode: AddrMode::Direct },
            Instruction::Hlt,
        ]);
        cpu.mem.write(0x40, 10);
        cpu.mem.write(0x41, 5);

        run_to_halt(&mut cpu);

        assert_eq!(cpu.mem().read(0x42), 15);
        assert_eq!(cpu.cycles(), 4);
    }

    #[test]
    fn test_add_carry_and_zero() {
        let mut cpu = cpu_with(&[
            Instruction::Lda { arg: 0xF0, mode: AddrMode::Immediate },
            Instruction::Add { arg: 0x10, mode: AddrMode::Immediate },
        ]);
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs().acc.get(), 0);
        assert_eq!(cpu.flags(), Flags { carry: true, zero: true, negative: false });
    }

    #[test]
    fn test_sub_borrow_sets_negative_and_carry() {
        let mut cpu = cpu_with(&[
            Instruction::Ldi { value: 1 },
            Instruction::Sub { arg: 2, mode: AddrMode::Immediate },
        ]);
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs().acc.get(), 0xFF);
        assert_eq!(cpu.flags(), Flags { carry: true, zero: false, negative: true });
    }

    #[test]
    fn test_flags_fully_recomputed() {
        let mut cpu = cpu_with(&[
            Instruction::Ldi { value: 1 },
            Instruction::Sub { arg: 2, mode: AddrMode::Immediate },
            Instruction::And { arg: 0x0F, mode: AddrMode::Immediate },
        ]);
        for _ in 0..3 {
            cpu.step().unwrap();
        }
        // Carry from the SUB does not survive the AND.
        assert_eq!(cpu.regs().acc.get(), 0x0F);
        assert_eq!(cpu.flags(), Flags::default());
    }

    #[test]
    fn test_loads_leave_flags() {
        let mut cpu = cpu_with(&[
            Instruction::Ldi { value: 0 },
            Instruction::Cmp { arg: 0, mode: AddrMode::Immediate },
            Instruction::Ldi { value: 3 },
        ]);
        for _ in 0..3 {
            cpu.step().unwrap();
        }
        assert!(cpu.flags().zero);
        assert_eq!(cpu.regs().acc.get(), 3);
    }

    #[test]
    fn test_shifts_and_rotates() {
        let mut cpu = cpu_with(&[
            Instruction::Lda { arg: 0x81, mode: AddrMode::Immediate },
            Instruction::Shl,
            Instruction::Lda { arg: 0x81, mode: AddrMode::Immediate },
            Instruction::Ror,
        ]);
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs().acc.get(), 0x02);
        assert!(cpu.flags().carry);

        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs().acc.get(), 0xC0);
        assert!(cpu.flags().carry);
        assert!(cpu.flags().negative);
    }

    fn flags(carry: bool, zero: bool, negative: bool) -> Flags {
        Flags { carry, zero, negative }
    }

    /// Every opcode from a known state: instruction at 0x10, data cell
    /// 0x40 = 0x0F, jump target 0x30.
    #[test]
    fn test_every_instruction_effect() {
        use crate::cpu::decode::AddrMode::{Direct, Immediate, Indexed};

        const NONE: Flags = Flags::new();
        let cn = flags(true, false, true);
        let z = flags(false, true, false);
        let c = flags(true, false, false);
        let n = flags(false, false, true);
        let cz = flags(true, true, false);

        // (instruction, ACC, Q, flags) -> (ACC, Q, cell 0x40, PC, flags)
        let cases: Vec<(Instruction, u8, u8, Flags, u8, u8, u8, u8, Flags)> = vec![
            // Implied, flags untouched
            (Instruction::Nop, 0x01, 0x02, cn, 0x01, 0x02, 0x0F, 0x11, cn),
            (Instruction::Taq, 0x05, 0x00, cn, 0x05, 0x05, 0x0F, 0x11, cn),
            (Instruction::Tqa, 0x05, 0x09, cn, 0x09, 0x09, 0x0F, 0x11, cn),
            (Instruction::Swp, 0x05, 0x09, cn, 0x09, 0x05, 0x0F, 0x11, cn),
            // Logic clears carry
            (Instruction::Not, 0x0F, 0x00, cn, 0xF0, 0x00, 0x0F, 0x11, n),
            (Instruction::Not, 0xFF, 0x00, cn, 0x00, 0x00, 0x0F, 0x11, z),
            // Negate borrows unless ACC is zero
            (Instruction::Neg, 0x80, 0x00, NONE, 0x80, 0x00, 0x0F, 0x11, cn),
            (Instruction::Neg, 0x00, 0x00, cn, 0x00, 0x00, 0x0F, 0x11, z),
            (Instruction::Neg, 0x01, 0x00, NONE, 0xFF, 0x00, 0x0F, 0x11, cn),
            (Instruction::Inc, 0xFF, 0x00, NONE, 0x00, 0x00, 0x0F, 0x11, cz),
            (Instruction::Inc, 0x7F, 0x00, NONE, 0x80, 0x00, 0x0F, 0x11, n),
            (Instruction::Dec, 0x00, 0x00, NONE, 0xFF, 0x00, 0x0F, 0x11, cn),
            (Instruction::Dec, 0x01, 0x00, cn, 0x00, 0x00, 0x0F, 0x11, z),
            // Shifted-out bit lands in carry
            (Instruction::Shl, 0x81, 0x00, NONE, 0x02, 0x00, 0x0F, 0x11, c),
            (Instruction::Shr, 0x01, 0x00, NONE, 0x00, 0x00, 0x0F, 0x11, cz),
            (Instruction::Rol, 0x81, 0x00, NONE, 0x03, 0x00, 0x0F, 0x11, c),
            (Instruction::Ror, 0x01, 0x00, NONE, 0x80, 0x00, 0x0F, 0x11, cn),
            (Instruction::Adq, 0xFF, 0x02, NONE, 0x01, 0x02, 0x0F, 0x11, c),
            (Instruction::Sbq, 0x01, 0x02, NONE, 0xFF, 0x02, 0x0F, 0x11, cn),
            (Instruction::Cpq, 0x05, 0x05, cn, 0x05, 0x05, 0x0F, 0x11, z),
            (Instruction::Ldi { value: 7 }, 0x00, 0x00, cn, 0x07, 0x00, 0x0F, 0x11, cn),
            // Loads and stores leave flags
            (Instruction::Lda { arg: 0x40, mode: Direct }, 0x00, 0x00, cn, 0x0F, 0x00, 0x0F, 0x12, cn),
            (Instruction::Lda { arg: 0x3F, mode: Indexed }, 0x00, 0x01, cn, 0x0F, 0x01, 0x0F, 0x12, cn),
            (Instruction::Lda { arg: 0x99, mode: Immediate }, 0x00, 0x00, cn, 0x99, 0x00, 0x0F, 0x12, cn),
            (Instruction::Ldq { arg: 0x21, mode: Immediate }, 0x00, 0x00, cn, 0x00, 0x21, 0x0F, 0x12, cn),
            (Instruction::Sta { arg: 0x40, mode: Direct }, 0x55, 0x00, cn, 0x55, 0x00, 0x55, 0x12, cn),
            (Instruction::Stq { arg: 0x3E, mode: Indexed }, 0x00, 0x02, cn, 0x00, 0x02, 0x02, 0x12, cn),
            // ALU with memory and immediate operands
            (Instruction::Add { arg: 0x40, mode: Direct }, 0xF1, 0x00, NONE, 0x00, 0x00, 0x0F, 0x12, cz),
            (Instruction::Sub { arg: 0x01, mode: Immediate }, 0x00, 0x00, NONE, 0xFF, 0x00, 0x0F, 0x12, cn),
            (Instruction::And { arg: 0xF0, mode: Immediate }, 0x3C, 0x00, cn, 0x30, 0x00, 0x0F, 0x12, NONE),
            (Instruction::Or { arg: 0x40, mode: Direct }, 0x80, 0x00, c, 0x8F, 0x00, 0x0F, 0x12, n),
            (Instruction::Xor { arg: 0xFF, mode: Immediate }, 0xFF, 0x00, c, 0x00, 0x00, 0x0F, 0x12, z),
            (Instruction::Cmp { arg: 0x06, mode: Immediate }, 0x05, 0x00, NONE, 0x05, 0x00, 0x0F, 0x12, cn),
            (Instruction::Cmp { arg: 0x40, mode: Direct }, 0x0F, 0x00, cn, 0x0F, 0x00, 0x0F, 0x12, z),
            // Jumps, taken and not taken
            (Instruction::Jmp { target: 0x30 }, 0x00, 0x00, NONE, 0x00, 0x00, 0x0F, 0x30, NONE),
            (Instruction::Jz { target: 0x30 }, 0x00, 0x00, z, 0x00, 0x00, 0x0F, 0x30, z),
            (Instruction::Jz { target: 0x30 }, 0x00, 0x00, NONE, 0x00, 0x00, 0x0F, 0x12, NONE),
            (Instruction::Jnz { target: 0x30 }, 0x00, 0x00, NONE, 0x00, 0x00, 0x0F, 0x30, NONE),
            (Instruction::Jnz { target: 0x30 }, 0x00, 0x00, z, 0x00, 0x00, 0x0F, 0x12, z),
            (Instruction::Jc { target: 0x30 }, 0x00, 0x00, c, 0x00, 0x00, 0x0F, 0x30, c),
            (Instruction::Jc { target: 0x30 }, 0x00, 0x00, NONE, 0x00, 0x00, 0x0F, 0x12, NONE),
            (Instruction::Jnc { target: 0x30 }, 0x00, 0x00, NONE, 0x00, 0x00, 0x0F, 0x30, NONE),
            (Instruction::Jnc { target: 0x30 }, 0x00, 0x00, c, 0x00, 0x00, 0x0F, 0x12, c),
            (Instruction::Jn { target: 0x30 }, 0x00, 0x00, n, 0x00, 0x00, 0x0F, 0x30, n),
            (Instruction::Jn { target: 0x30 }, 0x00, 0x00, NONE, 0x00, 0x00, 0x0F, 0x12, NONE),
            (Instruction::Jnn { target: 0x30 }, 0x00, 0x00, NONE, 0x00, 0x00, 0x0F, 0x30, NONE),
            (Instruction::Jnn { target: 0x30 }, 0x00, 0x00, n, 0x00, 0x00, 0x0F, 0x12, n),
        ];

        for (instr, acc, q, before, want_acc, want_q, want_cell, want_pc, want_flags) in cases {
            let mut cpu = Cpu::new();
            cpu.load_program(0x10, &encode(&instr)).unwrap();
            cpu.mem.write(0x40, 0x0F);
            cpu.regs.pc.set(0x10);
            cpu.regs.acc.set(acc);
            cpu.regs.q.set(q);
            cpu.flags = before;

            let outcome = cpu.step().unwrap_or_else(|e| panic!("{}: {}", instr, e));
            assert_eq!(outcome, StepOutcome::Executed(instr), "{}", instr);
            assert_eq!(cpu.regs().acc.get(), want_acc, "{} ACC", instr);
            assert_eq!(cpu.regs().q.get(), want_q, "{} Q", instr);
            assert_eq!(cpu.mem().read(0x40), want_cell, "{} cell 0x40", instr);
            assert_eq!(cpu.regs().pc.get(), want_pc, "{} PC", instr);
            assert_eq!(cpu.flags(), want_flags, "{} flags", instr);
        }
    }

    #[test]
    fn test_transfers() {
        let mut cpu = cpu_with(&[
            Instruction::Ldi { value: 4 },
            Instruction::Taq,
            Instruction::Ldi { value: 9 },
            Instruction::Swp,
        ]);
        for _ in 0..4 {
            cpu.step().unwrap();
        }
        assert_eq!(cpu.regs().acc.get(), 4);
        assert_eq!(cpu.regs().q.get(), 9);
    }

    #[test]
    fn test_indexed_load() {
        let mut cpu = cpu_with(&[
            Instruction::Ldq { arg: 3, mode: AddrMode::Immediate },
            Instruction::Lda { arg: 0x40, mode: AddrMode::Indexed },
        ]);
        cpu.mem.write(0x43, 0x99);
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs().acc.get(), 0x99);
    }

    #[test]
    fn test_countdown_loop() {
        // ACC := 3; loop: DEC; JNZ loop; HLT
        let mut cpu = cpu_with(&[
            Instruction::Ldi { value: 3 },
            Instruction::Dec,
            Instruction::Jnz { target: 1 },
            Instruction::Hlt,
        ]);
        run_to_halt(&mut cpu);
        assert_eq!(cpu.regs().acc.get(), 0);
        assert!(cpu.flags().zero);
        assert_eq!(cpu.cycles(), 1 + 3 * 2 + 1);
    }

    #[test]
    fn test_pc_wraps_at_end_of_memory() {
        let mut cpu = Cpu::new();
        cpu.mem.write(127, 0x01); // NOP
        cpu.mem.write(0, 0x17); // LDI 7
        cpu.edit_register(RegisterName::Pc, "7F");

        cpu.step().unwrap();
        assert_eq!(cpu.regs().pc.get(), 0);
        cpu.step().unwrap();
        assert_eq!(cpu.regs().acc.get(), 7);
    }

    #[test]
    fn test_operand_fetch_wraps() {
        let mut cpu = Cpu::new();
        cpu.mem.write(127, 0x40); // LDA #
        cpu.mem.write(0, 0x2A);
        cpu.edit_register(RegisterName::Pc, "7f");

        cpu.step().unwrap();
        assert_eq!(cpu.regs().acc.get(), 0x2A);
        assert_eq!(cpu.regs().pc.get(), 1);
    }

    #[test]
    fn test_reset_keeps_memory() {
        let mut cpu = cpu_with(&[
            Instruction::Ldi { value: 1 },
            Instruction::Sub { arg: 2, mode: AddrMode::Immediate },
            Instruction::Taq,
        ]);
        for _ in 0..3 {
            cpu.step().unwrap();
        }
        let _handle = cpu.start_running(true);
        let mem_before = cpu.mem().clone();

        cpu.reset();

        assert_eq!(cpu.regs(), &Registers::new());
        assert_eq!(cpu.flags(), Flags::default());
        assert_eq!(cpu.last_message(), "");
        assert!(!cpu.last_message_is_error());
        assert_eq!(cpu.run_mode(), RunMode::Stopped);
        assert_eq!(cpu.mem(), &mem_before);
    }

    #[test]
    fn test_reset_clears_error_status() {
        let mut cpu = Cpu::new();
        cpu.mem.write(0, 0xFF);
        assert!(cpu.step().is_err());
        cpu.reset();
        assert!(!cpu.last_message_is_error());
        assert_eq!(cpu.last_message(), "");
    }

    #[test]
    fn test_run_cycle_until_halt() {
        let mut cpu = cpu_with(&[
            Instruction::Ldi { value: 2 },
            Instruction::Inc,
            Instruction::Hlt,
        ]);
        let handle = cpu.start_running(true);
        assert_eq!(cpu.period(), Some(Duration::ZERO));

        assert_eq!(cpu.run_cycle(&handle), Tick::Stepped);
        assert_eq!(cpu.run_cycle(&handle), Tick::Stepped);
        assert_eq!(cpu.run_cycle(&handle), Tick::Stopped);
        assert_eq!(cpu.run_mode(), RunMode::Stopped);
        assert_eq!(cpu.run_cycle(&handle), Tick::Cancelled);
        assert_eq!(cpu.regs().acc.get(), 3);
    }

    #[test]
    fn test_halt_cancels_immediately() {
        let mut cpu = cpu_with(&[Instruction::Jmp { target: 0 }]);
        let count = counter(&mut cpu);

        let handle = cpu.start_running(true);
        cpu.halt();
        let settled = count.get();
        let cycles = cpu.cycles();

        for _ in 0..10 {
            assert_eq!(cpu.run_cycle(&handle), Tick::Cancelled);
        }
        assert_eq!(count.get(), settled);
        assert_eq!(cpu.cycles(), cycles);
        assert_eq!(cpu.period(), None);
    }

    #[test]
    fn test_halt_when_stopped_is_noop() {
        let mut cpu = Cpu::new();
        let count = counter(&mut cpu);
        cpu.halt();
        assert_eq!(count.get(), 0);
        assert_eq!(cpu.run_mode(), RunMode::Stopped);
    }

    #[test]
    fn test_running_from_halted_pc_stops() {
        let mut cpu = cpu_with(&[Instruction::Hlt]);
        cpu.step().unwrap();
        let handle = cpu.start_running(false);
        assert_eq!(cpu.run_cycle(&handle), Tick::Stopped);
        assert_eq!(cpu.run_mode(), RunMode::Stopped);
    }

    #[test]
    fn test_hook_fires_on_mutations() {
        let mut cpu = cpu_with(&[Instruction::Nop, Instruction::Nop]);
        let count = counter(&mut cpu);

        cpu.step().unwrap();
        assert_eq!(count.get(), 1);
        cpu.reset();
        assert_eq!(count.get(), 2);

        let handle = cpu.start_running(false);
        assert_eq!(count.get(), 3);
        cpu.run_cycle(&handle);
        assert_eq!(count.get(), 4);
    }

    #[test]
    fn test_hook_sees_new_state_and_is_replaced() {
        let mut cpu = cpu_with(&[Instruction::Ldi { value: 6 }, Instruction::Nop]);
        let seen = Rc::new(Cell::new(0u8));
        let sink = Rc::clone(&seen);
        cpu.set_on_change(move |cpu| sink.set(cpu.regs().acc.get()));

        cpu.step().unwrap();
        assert_eq!(seen.get(), 6);

        let count = counter(&mut cpu);
        cpu.step().unwrap();
        assert_eq!(count.get(), 1);

        cpu.clear_on_change();
        cpu.reset();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_load_memory_text_halts_first() {
        let mut cpu = Cpu::new();
        let handle = cpu.start_running(true);
        let text = cpu.save_memory_text().replacen("00", "15", 1);

        cpu.load_memory_text(&text).unwrap();

        assert_eq!(cpu.run_mode(), RunMode::Stopped);
        assert_eq!(cpu.run_cycle(&handle), Tick::Cancelled);
        assert_eq!(cpu.mem().read(0), 0x15);
    }

    #[test]
    fn test_load_program_halts_first() {
        let mut cpu = Cpu::new();
        let handle = cpu.start_running(false);

        cpu.load_program(0, &[0x15, 0x00]).unwrap();

        assert_eq!(cpu.run_mode(), RunMode::Stopped);
        assert_eq!(cpu.run_cycle(&handle), Tick::Cancelled);
        assert_eq!(cpu.mem().read(0), 0x15);
        assert_eq!(cpu.cycles(), 0);
    }

    #[test]
    fn test_load_memory_text_rejects_bad_input() {
        let mut cpu = cpu_with(&[Instruction::Ldi { value: 5 }]);
        let before = cpu.mem().clone();
        assert!(cpu.load_memory_text("GZ").is_err());
        assert_eq!(cpu.mem(), &before);
    }

    #[test]
    fn test_edit_rejects_bad_text() {
        let mut cpu = Cpu::new();
        let count = counter(&mut cpu);
        assert!(!cpu.edit_cell(3, "XYZ"));
        assert!(!cpu.edit_register(RegisterName::Acc, "1G"));
        assert_eq!(count.get(), 0);
        assert!(cpu.edit_register(RegisterName::Acc, "1f"));
        assert_eq!(cpu.regs().acc.get(), 0x1F);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut cpu = cpu_with(&[Instruction::Ldi { value: 5 }]);
        cpu.step().unwrap();
        let json = serde_json::to_value(cpu.snapshot()).unwrap();
        assert_eq!(json["acc"], 5);
        assert_eq!(json["run_mode"], "Stopped");
        assert_eq!(json["memory"].as_array().unwrap().len(), MEMORY_SIZE);
    }
}
