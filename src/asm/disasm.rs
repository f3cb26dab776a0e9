//! Disassembler for Pico programs.
//!
//! Converts memory cells back to readable assembly.

use std::fmt;

use crate::cpu::decode::{decode, AddrMode, Instruction};
use crate::cpu::memory::{Memory, MEMORY_SIZE};

/// Disassemble the instruction starting at `addr`.
///
/// Returns the text and the number of cells it covers. Undefined opcodes
/// render as a `DAT` line one cell long.
pub fn disassemble_at(mem: &Memory, addr: usize) -> (String, usize) {
    let opcode = mem.read(addr);
    let operand = mem.read((addr + 1) % MEMORY_SIZE);
    match decode(opcode, operand) {
        Ok(decoded) => (decoded.to_string(), decoded.cells()),
        Err(_) => (format!("DAT 0x{:02X}  ; ???", opcode), 1),
    }
}

/// Disassemble `count` cells of memory starting at `start`.
///
/// Each line is `(address, text, cells)`; the walk stops at the end of
/// memory rather than wrapping.
pub fn disassemble_range(mem: &Memory, start: usize, count: usize) -> Vec<(usize, String, usize)> {
    let end = (start + count).min(MEMORY_SIZE);
    let mut lines = Vec::new();
    let mut addr = start;
    while addr < end {
        let (text, len) = disassemble_at(mem, addr);
        lines.push((addr, text, len));
        addr += len;
    }
    lines
}

/// Disassemble memory up to the last non-zero cell.
pub fn disassemble(mem: &Memory) -> String {
    let used = mem
        .iter()
        .rposition(|cell| cell.get() != 0)
        .map_or(1, |last| last + 1);

    let mut output = String::new();
    output.push_str("; Pico Disassembly\n");
    output.push_str("; ----------------\n\n");

    for (addr, text, len) in disassemble_range(mem, 0, used) {
        let raw: Vec<String> = (addr..addr + len)
            .map(|a| format!("{:02X}", mem.read(a % MEMORY_SIZE)))
            .collect();
        output.push_str(&format!("{:02X}: {:<20} ; {}\n", addr, text, raw.join(" ")));
    }

    output
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Implied
            Instruction::Hlt => f.write_str("HLT"),
            Instruction::Nop => f.write_str("NOP"),
            Instruction::Taq => f.write_str("TAQ"),
            Instruction::Tqa => f.write_str("TQA"),
            Instruction::Swp => f.write_str("SWP"),
            Instruction::Not => f.write_str("NOT"),
            Instruction::Neg => f.write_str("NEG"),
            Instruction::Inc => f.write_str("INC"),
            Instruction::Dec => f.write_str("DEC"),
            Instruction::Shl => f.write_str("SHL"),
            Instruction::Shr => f.write_str("SHR"),
            Instruction::Rol => f.write_str("ROL"),
            Instruction::Ror => f.write_str("ROR"),
            Instruction::Adq => f.write_str("ADQ"),
            Instruction::Sbq => f.write_str("SBQ"),
            Instruction::Cpq => f.write_str("CPQ"),

            // Literal
            Instruction::Ldi { value } => write!(f, "LDI {}", value),

            // Operand
            Instruction::Lda { arg, mode } => write!(f, "LDA {}", Operand(*arg, *mode)),
            Instruction::Sta { arg, mode } => write!(f, "STA {}", Operand(*arg, *mode)),
            Instruction::Add { arg, mode } => write!(f, "ADD {}", Operand(*arg, *mode)),
            Instruction::Sub { arg, mode } => write!(f, "SUB {}", Operand(*arg, *mode)),
            Instruction::And { arg, mode } => write!(f, "AND {}", Operand(*arg, *mode)),
            Instruction::Or { arg, mode } => write!(f, "OR {}", Operand(*arg, *mode)),
            Instruction::Xor { arg, mode } => write!(f, "XOR {}", Operand(*arg, *mode)),
            Instruction::Cmp { arg, mode } => write!(f, "CMP {}", Operand(*arg, *mode)),
            Instruction::Ldq { arg, mode } => write!(f, "LDQ {}", Operand(*arg, *mode)),
            Instruction::Stq { arg, mode } => write!(f, "STQ {}", Operand(*arg, *mode)),

            // Control
            Instruction::Jmp { target } => write!(f, "JMP 0x{:02X}", target),
            Instruction::Jz { target } => write!(f, "JZ 0x{:02X}", target),
            Instruction::Jnz { target } => write!(f, "JNZ 0x{:02X}", target),
            Instruction::Jc { target } => write!(f, "JC 0x{:02X}", target),
            Instruction::Jnc { target } => write!(f, "JNC 0x{:02X}", target),
            Instruction::Jn { target } => write!(f, "JN 0x{:02X}", target),
            Instruction::Jnn { target } => write!(f, "JNN 0x{:02X}", target),
        }
    }
}

/// An operand with its addressing-mode syntax.
struct Operand(u8, AddrMode);

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.1 {
            AddrMode::Direct => write!(f, "0x{:02X}", self.0),
            AddrMode::Indexed => write!(f, "0x{:02X},Q", self.0),
            AddrMode::Immediate => write!(f, "#0x{:02X}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;

    fn memory_with(instructions: &[Instruction]) -> Memory {
        let mut mem = Memory::new();
        let cells: Vec<u8> = instructions.iter().flat_map(encode).collect();
        mem.load_program(0, &cells).unwrap();
        mem
    }

    #[test]
    fn test_disassemble_hlt() {
        let mem = Memory::new();
        assert_eq!(disassemble_at(&mem, 0), ("HLT".to_string(), 1));
    }

    #[test]
    fn test_disassemble_with_mode() {
        let mem = memory_with(&[
            Instruction::Add { arg: 0x10, mode: AddrMode::Indexed },
            Instruction::Lda { arg: 5, mode: AddrMode::Immediate },
        ]);
        assert_eq!(disassemble_at(&mem, 0), ("ADD 0x10,Q".to_string(), 2));
        assert_eq!(disassemble_at(&mem, 2), ("LDA #0x05".to_string(), 2));
    }

    #[test]
    fn test_disassemble_undefined() {
        let mut mem = Memory::new();
        mem.write(3, 0xEE);
        let (text, len) = disassemble_at(&mem, 3);
        assert!(text.starts_with("DAT 0xEE"));
        assert_eq!(len, 1);
    }

    #[test]
    fn test_range_skips_operands() {
        let mem = memory_with(&[
            Instruction::Ldi { value: 3 },
            Instruction::Jmp { target: 0 },
            Instruction::Hlt,
        ]);
        let addrs: Vec<usize> = disassemble_range(&mem, 0, 4).iter().map(|l| l.0).collect();
        assert_eq!(addrs, vec![0, 1, 3]);
    }

    #[test]
    fn test_listing_stops_at_last_used_cell() {
        let mem = memory_with(&[Instruction::Ldi { value: 5 }, Instruction::Hlt, Instruction::Inc]);
        let listing = disassemble(&mem);
        assert!(listing.contains("00: LDI 5"));
        assert!(listing.contains("02: INC"));
        assert!(!listing.contains("03:"));
    }
}
