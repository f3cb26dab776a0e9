//! Simple assembler for Pico programs.
//!
//! Syntax:
//! ```text
//! ; Comment
//! LOOP:            ; Define a label
//!     LDI 5        ; Load a 4-bit literal
//!     LDA 0x10     ; Load from address 0x10
//!     ADD 0x10,Q   ; Add from address 0x10 + Q
//!     SUB #1       ; Subtract the value 1
//!     JNZ LOOP     ; Jump to label
//!     HLT          ; Halt
//!
//!     ORG 0x40     ; Set origin address
//!     DAT 42, $FF  ; Define data bytes
//! ```
//!
//! Numbers may be decimal, `0x` hex or `$` hex.

use std::collections::HashMap;
use thiserror::Error;

use crate::cpu::decode::{encode, AddrMode, Instruction};
use crate::cpu::memory::MEMORY_SIZE;

/// Assemble source code to a memory image.
///
/// The image starts at address 0 and ends at the highest cell written;
/// gaps left by `ORG` are zero.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// The assembler state.
struct Assembler {
    /// Current address (origin).
    current_addr: usize,
    /// Symbol table (label -> address).
    symbols: HashMap<String, u8>,
    /// Pending references: (cell to patch, label, source line).
    pending: Vec<(usize, String, usize)>,
    /// Output image.
    image: [u8; MEMORY_SIZE],
    /// One past the highest cell written.
    used: usize,
}

/// A parsed operand before label resolution.
enum Value {
    Number(i32),
    Label(String),
}

impl Assembler {
    fn new() -> Self {
        Self {
            current_addr: 0,
            symbols: HashMap::new(),
            pending: Vec::new(),
            image: [0; MEMORY_SIZE],
            used: 0,
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AssemblerError> {
        // Pass 1: Collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: Resolve forward references
        self.resolve_references()?;

        Ok(self.image[..self.used].to_vec())
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove comments
        let line = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        }
        .trim();

        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        if let Some((label, rest)) = line.split_once(':') {
            let label = label.trim().to_uppercase();
            if label.is_empty() || label.contains(char::is_whitespace) {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("invalid label {:?}", label),
                });
            }
            if self.current_addr >= MEMORY_SIZE {
                return Err(AssemblerError::ProgramTooLarge { line: line_num });
            }
            if self.symbols.insert(label.clone(), self.current_addr as u8).is_some() {
                return Err(AssemblerError::DuplicateLabel { line: line_num, label });
            }

            let rest = rest.trim();
            if rest.is_empty() {
                return Ok(());
            }
            return self.process_instruction(rest, line_num);
        }

        self.process_instruction(line, line_num)
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, operand) = match line.split_once(char::is_whitespace) {
            Some((m, rest)) => (m.to_uppercase(), Some(rest.trim())),
            None => (line.to_uppercase(), None),
        };

        match mnemonic.as_str() {
            // Directives
            "ORG" => {
                let addr = self.parse_number(require(operand, "ORG", line_num)?, line_num)?;
                if !(0..MEMORY_SIZE as i32).contains(&addr) {
                    return Err(AssemblerError::ValueOutOfRange { line: line_num, value: addr });
                }
                self.current_addr = addr as usize;
            }

            "DAT" | "DATA" | "DB" => {
                for item in require(operand, "DAT", line_num)?.split(',') {
                    let value = self.parse_number(item, line_num)?;
                    let byte = to_byte(value, line_num)?;
                    self.emit(&[byte], line_num)?;
                }
            }

            // Instructions
            _ => self.process_opcode(&mnemonic, operand, line_num)?,
        }

        Ok(())
    }

    fn process_opcode(&mut self, mnemonic: &str, operand: Option<&str>, line_num: usize) -> Result<(), AssemblerError> {
        if let Some(instr) = implied(mnemonic) {
            if operand.is_some() {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("{} takes no operand", mnemonic),
                });
            }
            return self.emit(&encode(&instr), line_num);
        }

        if mnemonic == "LDI" {
            let value = self.parse_number(require(operand, "LDI", line_num)?, line_num)?;
            if !(0..=15).contains(&value) {
                return Err(AssemblerError::ValueOutOfRange { line: line_num, value });
            }
            return self.emit(&encode(&Instruction::Ldi { value: value as u8 }), line_num);
        }

        let is_jump = jump(mnemonic, 0).is_some();
        if !is_jump && operand_op(mnemonic, 0, AddrMode::Direct).is_none() {
            return Err(AssemblerError::UnknownMnemonic {
                line: line_num,
                mnemonic: mnemonic.to_string(),
            });
        }

        let text = require(operand, mnemonic, line_num)?;

        if let Some(instr) = jump(mnemonic, 0) {
            let target = self.parse_value(text, line_num)?;
            return self.emit_with_operand(encode(&instr)[0], target, true, line_num);
        }

        let (value_text, mode) = if let Some(imm) = text.strip_prefix('#') {
            (imm, AddrMode::Immediate)
        } else if let Some((base, _)) = text
            .rsplit_once(',')
            .filter(|(_, index)| index.trim().eq_ignore_ascii_case("Q"))
        {
            (base, AddrMode::Indexed)
        } else {
            (text, AddrMode::Direct)
        };

        if mode == AddrMode::Immediate && matches!(mnemonic, "STA" | "STQ") {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("{} cannot take an immediate operand", mnemonic),
            });
        }

        let value = self.parse_value(value_text.trim(), line_num)?;
        let opcode = operand_op(mnemonic, 0, mode).map(|instr| encode(&instr)[0]);
        match opcode {
            Some(opcode) => self.emit_with_operand(opcode, value, mode != AddrMode::Immediate, line_num),
            None => Err(AssemblerError::UnknownMnemonic {
                line: line_num,
                mnemonic: mnemonic.to_string(),
            }),
        }
    }

    /// Emit a two-cell instruction whose second cell is `value`.
    fn emit_with_operand(&mut self, opcode: u8, value: Value, is_address: bool, line_num: usize) -> Result<(), AssemblerError> {
        let operand_addr = self.current_addr + 1;
        let byte = match value {
            Value::Number(n) if is_address => {
                if !(0..MEMORY_SIZE as i32).contains(&n) {
                    return Err(AssemblerError::ValueOutOfRange { line: line_num, value: n });
                }
                n as u8
            }
            Value::Number(n) => to_byte(n, line_num)?,
            Value::Label(label) => {
                self.pending.push((operand_addr, label, line_num));
                0 // Placeholder, resolved in pass 2
            }
        };
        self.emit(&[opcode, byte], line_num)
    }

    fn parse_value(&self, text: &str, line_num: usize) -> Result<Value, AssemblerError> {
        let starts_numeric = text
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || c == '$' || c == '-');
        if starts_numeric {
            return self.parse_number(text, line_num).map(Value::Number);
        }
        if text.is_empty() || !text.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid operand {:?}", text),
            });
        }
        Ok(Value::Label(text.to_uppercase()))
    }

    fn parse_number(&self, text: &str, line_num: usize) -> Result<i32, AssemblerError> {
        let text = text.trim();
        let invalid = || AssemblerError::SyntaxError {
            line: line_num,
            message: format!("invalid number {:?}", text),
        };

        // Check for hex literal
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).or_else(|| text.strip_prefix('$')) {
            return i32::from_str_radix(hex, 16).map_err(|_| invalid());
        }

        text.parse::<i32>().map_err(|_| invalid())
    }

    fn emit(&mut self, cells: &[u8], line_num: usize) -> Result<(), AssemblerError> {
        if self.current_addr + cells.len() > MEMORY_SIZE {
            return Err(AssemblerError::ProgramTooLarge { line: line_num });
        }
        for &cell in cells {
            self.image[self.current_addr] = cell;
            self.current_addr += 1;
        }
        self.used = self.used.max(self.current_addr);
        Ok(())
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (cell, label, line_num) in &self.pending {
            let addr = self.symbols.get(label).ok_or_else(|| AssemblerError::UndefinedLabel {
                line: *line_num,
                label: label.clone(),
            })?;
            self.image[*cell] = *addr;
        }
        Ok(())
    }
}

fn require<'a>(operand: Option<&'a str>, what: &str, line_num: usize) -> Result<&'a str, AssemblerError> {
    operand.filter(|s| !s.is_empty()).ok_or_else(|| AssemblerError::SyntaxError {
        line: line_num,
        message: format!("{} requires an operand", what),
    })
}

/// Accepts -128..=255 and stores it as a byte.
fn to_byte(value: i32, line_num: usize) -> Result<u8, AssemblerError> {
    if !(-128..=255).contains(&value) {
        return Err(AssemblerError::ValueOutOfRange { line: line_num, value });
    }
    Ok(value.rem_euclid(256) as u8)
}

fn implied(mnemonic: &str) -> Option<Instruction> {
    let instr = match mnemonic {
        "HLT" | "HALT" => Instruction::Hlt,
        "NOP" => Instruction::Nop,
        "TAQ" => Instruction::Taq,
        "TQA" => Instruction::Tqa,
        "SWP" => Instruction::Swp,
        "NOT" => Instruction::Not,
        "NEG" => Instruction::Neg,
        "INC" => Instruction::Inc,
        "DEC" => Instruction::Dec,
        "SHL" => Instruction::Shl,
        "SHR" => Instruction::Shr,
        "ROL" => Instruction::Rol,
        "ROR" => Instruction::Ror,
        "ADQ" => Instruction::Adq,
        "SBQ" => Instruction::Sbq,
        "CPQ" => Instruction::Cpq,
        _ => return None,
    };
    Some(instr)
}

fn jump(mnemonic: &str, target: u8) -> Option<Instruction> {
    let instr = match mnemonic {
        "JMP" => Instruction::Jmp { target },
        "JZ" | "JE" => Instruction::Jz { target },
        "JNZ" | "JNE" => Instruction::Jnz { target },
        "JC" => Instruction::Jc { target },
        "JNC" => Instruction::Jnc { target },
        "JN" => Instruction::Jn { target },
        "JNN" => Instruction::Jnn { target },
        _ => return None,
    };
    Some(instr)
}

fn operand_op(mnemonic: &str, arg: u8, mode: AddrMode) -> Option<Instruction> {
    let instr = match mnemonic {
        "LDA" => Instruction::Lda { arg, mode },
        "STA" => Instruction::Sta { arg, mode },
        "ADD" => Instruction::Add { arg, mode },
        "SUB" => Instruction::Sub { arg, mode },
        "AND" => Instruction::And { arg, mode },
        "OR" => Instruction::Or { arg, mode },
        "XOR" => Instruction::Xor { arg, mode },
        "CMP" => Instruction::Cmp { arg, mode },
        "LDQ" => Instruction::Ldq { arg, mode },
        "STQ" => Instruction::Stq { arg, mode },
        _ => return None,
    };
    Some(instr)
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i32 },

    #[error("program does not fit in memory (line {line})")]
    ProgramTooLarge { line: usize },
}
