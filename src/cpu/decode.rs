//! Instruction decoder for the Pico.
//!
//! Every opcode is one byte. The high nibble selects a group and the low
//! nibble selects the operation (or, for `LDI`, carries a 4-bit literal).
//! Memory, immediate and jump groups take one operand byte from the
//! following cell, so instructions are one or two cells long.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// How the operand byte of a two-cell ALU instruction is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddrMode {
    /// Operand is an address (group 0x2).
    Direct,
    /// Operand + Q is an address (group 0x3).
    Indexed,
    /// Operand is the value itself (group 0x4).
    Immediate,
}

impl AddrMode {
    /// Opcode group (high nibble) for this mode.
    pub fn group(self) -> u8 {
        match self {
            AddrMode::Direct => 0x20,
            AddrMode::Indexed => 0x30,
            AddrMode::Immediate => 0x40,
        }
    }
}

/// Decoded Pico instruction.
///
/// Organized into groups:
/// - Implied: HLT, NOP, transfers, single-operand ALU ops, Q-operand ALU ops
/// - Literal: LDI
/// - Operand: LDA, STA, ADD, SUB, AND, OR, XOR, CMP, LDQ, STQ
/// - Control: JMP and the conditional jumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Implied ====================

    /// Halt execution: PC := sentinel
    Hlt,

    /// No operation
    Nop,

    /// Q := ACC
    Taq,

    /// ACC := Q
    Tqa,

    /// Swap ACC and Q
    Swp,

    /// ACC := !ACC
    Not,

    /// ACC := 0 - ACC
    Neg,

    /// ACC := ACC + 1
    Inc,

    /// ACC := ACC - 1
    Dec,

    /// Shift ACC left one bit, bit 7 into carry
    Shl,

    /// Shift ACC right one bit, bit 0 into carry
    Shr,

    /// Rotate ACC left one bit
    Rol,

    /// Rotate ACC right one bit
    Ror,

    /// ACC := ACC + Q
    Adq,

    /// ACC := ACC - Q
    Sbq,

    /// Flags from ACC - Q
    Cpq,

    // ==================== Literal ====================

    /// ACC := value (0-15, embedded in the opcode)
    Ldi { value: u8 },

    // ==================== Operand ====================

    /// ACC := operand
    Lda { arg: u8, mode: AddrMode },

    /// [addr] := ACC
    Sta { arg: u8, mode: AddrMode },

    /// ACC := ACC + operand
    Add { arg: u8, mode: AddrMode },

    /// ACC := ACC - operand
    Sub { arg: u8, mode: AddrMode },

    /// ACC := ACC & operand
    And { arg: u8, mode: AddrMode },

    /// ACC := ACC | operand
    Or { arg: u8, mode: AddrMode },

    /// ACC := ACC ^ operand
    Xor { arg: u8, mode: AddrMode },

    /// Flags from ACC - operand
    Cmp { arg: u8, mode: AddrMode },

    /// Q := operand
    Ldq { arg: u8, mode: AddrMode },

    /// [addr] := Q
    Stq { arg: u8, mode: AddrMode },

    // ==================== Control Flow ====================

    /// Unconditional jump
    Jmp { target: u8 },

    /// Jump if zero flag set
    Jz { target: u8 },

    /// Jump if zero flag clear
    Jnz { target: u8 },

    /// Jump if carry flag set
    Jc { target: u8 },

    /// Jump if carry flag clear
    Jnc { target: u8 },

    /// Jump if negative flag set
    Jn { target: u8 },

    /// Jump if negative flag clear
    Jnn { target: u8 },
}

impl Instruction {
    /// Number of memory cells the instruction occupies.
    pub fn cells(&self) -> usize {
        match self {
            Instruction::Lda { .. }
            | Instruction::Sta { .. }
            | Instruction::Add { .. }
            | Instruction::Sub { .. }
            | Instruction::And { .. }
            | Instruction::Or { .. }
            | Instruction::Xor { .. }
            | Instruction::Cmp { .. }
            | Instruction::Ldq { .. }
            | Instruction::Stq { .. }
            | Instruction::Jmp { .. }
            | Instruction::Jz { .. }
            | Instruction::Jnz { .. }
            | Instruction::Jc { .. }
            | Instruction::Jnc { .. }
            | Instruction::Jn { .. }
            | Instruction::Jnn { .. } => 2,
            _ => 1,
        }
    }
}

/// Opcode values for decoding.
#[derive(Debug, Clone, Copy)]
struct Opcode;

impl Opcode {
    const HLT: u8 = 0x00;
    const NOP: u8 = 0x01;
    const TAQ: u8 = 0x02;
    const TQA: u8 = 0x03;
    const SWP: u8 = 0x04;
    const NOT: u8 = 0x05;
    const NEG: u8 = 0x06;
    const INC: u8 = 0x07;
    const DEC: u8 = 0x08;
    const SHL: u8 = 0x09;
    const SHR: u8 = 0x0A;
    const ROL: u8 = 0x0B;
    const ROR: u8 = 0x0C;
    const ADQ: u8 = 0x0D;
    const SBQ: u8 = 0x0E;
    const CPQ: u8 = 0x0F;

    const LDI: u8 = 0x10;

    // Low nibble of the operand groups
    const LDA: u8 = 0x0;
    const STA: u8 = 0x1;
    const ADD: u8 = 0x2;
    const SUB: u8 = 0x3;
    const AND: u8 = 0x4;
    const OR: u8 = 0x5;
    const XOR: u8 = 0x6;
    const CMP: u8 = 0x7;
    const LDQ: u8 = 0x8;
    const STQ: u8 = 0x9;

    const JMP: u8 = 0x50;
    const JZ: u8 = 0x51;
    const JNZ: u8 = 0x52;
    const JC: u8 = 0x53;
    const JNC: u8 = 0x54;
    const JN: u8 = 0x55;
    const JNN: u8 = 0x56;
}

/// Decode an opcode byte and the byte that follows it.
///
/// `operand` is ignored for one-cell instructions.
pub fn decode(opcode: u8, operand: u8) -> Result<Instruction, DecodeError> {
    let instruction = match opcode {
        Opcode::HLT => Instruction::Hlt,
        Opcode::NOP => Instruction::Nop,
        Opcode::TAQ => Instruction::Taq,
        Opcode::TQA => Instruction::Tqa,
        Opcode::SWP => Instruction::Swp,
        Opcode::NOT => Instruction::Not,
        Opcode::NEG => Instruction::Neg,
        Opcode::INC => Instruction::Inc,
        Opcode::DEC => Instruction::Dec,
        Opcode::SHL => Instruction::Shl,
        Opcode::SHR => Instruction::Shr,
        Opcode::ROL => Instruction::Rol,
        Opcode::ROR => Instruction::Ror,
        Opcode::ADQ => Instruction::Adq,
        Opcode::SBQ => Instruction::Sbq,
        Opcode::CPQ => Instruction::Cpq,
        0x10..=0x1F => Instruction::Ldi { value: opcode & 0x0F },
        0x20..=0x4F => decode_operand_group(opcode, operand)?,
        Opcode::JMP => Instruction::Jmp { target: operand },
        Opcode::JZ => Instruction::Jz { target: operand },
        Opcode::JNZ => Instruction::Jnz { target: operand },
        Opcode::JC => Instruction::Jc { target: operand },
        Opcode::JNC => Instruction::Jnc { target: operand },
        Opcode::JN => Instruction::Jn { target: operand },
        Opcode::JNN => Instruction::Jnn { target: operand },
        _ => return Err(DecodeError::InvalidOpcode(opcode)),
    };

    Ok(instruction)
}

fn decode_operand_group(opcode: u8, arg: u8) -> Result<Instruction, DecodeError> {
    let mode = match opcode & 0xF0 {
        0x20 => AddrMode::Direct,
        0x30 => AddrMode::Indexed,
        0x40 => AddrMode::Immediate,
        _ => return Err(DecodeError::InvalidOpcode(opcode)),
    };

    let instruction = match opcode & 0x0F {
        Opcode::LDA => Instruction::Lda { arg, mode },
        Opcode::STA if mode != AddrMode::Immediate => Instruction::Sta { arg, mode },
        Opcode::ADD => Instruction::Add { arg, mode },
        Opcode::SUB => Instruction::Sub { arg, mode },
        Opcode::AND => Instruction::And { arg, mode },
        Opcode::OR => Instruction::Or { arg, mode },
        Opcode::XOR => Instruction::Xor { arg, mode },
        Opcode::CMP => Instruction::Cmp { arg, mode },
        Opcode::LDQ => Instruction::Ldq { arg, mode },
        Opcode::STQ if mode != AddrMode::Immediate => Instruction::Stq { arg, mode },
        _ => return Err(DecodeError::InvalidOpcode(opcode)),
    };

    Ok(instruction)
}

/// Encode an instruction back to its memory cells.
pub fn encode(instr: &Instruction) -> Vec<u8> {
    let operand_op = |low: u8, arg: u8, mode: AddrMode| vec![mode.group() | low, arg];

    match *instr {
        Instruction::Hlt => vec![Opcode::HLT],
        Instruction::Nop => vec![Opcode::NOP],
        Instruction::Taq => vec![Opcode::TAQ],
        Instruction::Tqa => vec![Opcode::TQA],
        Instruction::Swp => vec![Opcode::SWP],
        Instruction::Not => vec![Opcode::NOT],
        Instruction::Neg => vec![Opcode::NEG],
        Instruction::Inc => vec![Opcode::INC],
        Instruction::Dec => vec![Opcode::DEC],
        Instruction::Shl => vec![Opcode::SHL],
        Instruction::Shr => vec![Opcode::SHR],
        Instruction::Rol => vec![Opcode::ROL],
        Instruction::Ror => vec![Opcode::ROR],
        Instruction::Adq => vec![Opcode::ADQ],
        Instruction::Sbq => vec![Opcode::SBQ],
        Instruction::Cpq => vec![Opcode::CPQ],
        Instruction::Ldi { value } => vec![Opcode::LDI | (value & 0x0F)],
        Instruction::Lda { arg, mode } => operand_op(Opcode::LDA, arg, mode),
        Instruction::Sta { arg, mode } => operand_op(Opcode::STA, arg, mode),
        Instruction::Add { arg, mode } => operand_op(Opcode::ADD, arg, mode),
        Instruction::Sub { arg, mode } => operand_op(Opcode::SUB, arg, mode),
        Instruction::And { arg, mode } => operand_op(Opcode::AND, arg, mode),
        Instruction::Or { arg, mode } => operand_op(Opcode::OR, arg, mode),
        Instruction::Xor { arg, mode } => operand_op(Opcode::XOR, arg, mode),
        Instruction::Cmp { arg, mode } => operand_op(Opcode::CMP, arg, mode),
        Instruction::Ldq { arg, mode } => operand_op(Opcode::LDQ, arg, mode),
        Instruction::Stq { arg, mode } => operand_op(Opcode::STQ, arg, mode),
        Instruction::Jmp { target } => vec![Opcode::JMP, target],
        Instruction::Jz { target } => vec![Opcode::JZ, target],
        Instruction::Jnz { target } => vec![Opcode::JNZ, target],
        Instruction::Jc { target } => vec![Opcode::JC, target],
        Instruction::Jnc { target } => vec![Opcode::JNC, target],
        Instruction::Jn { target } => vec![Opcode::JN, target],
        Instruction::Jnn { target } => vec![Opcode::JNN, target],
    }
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("undefined opcode 0x{0:02X}")]
    InvalidOpcode(u8),
}
