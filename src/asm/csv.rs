//! Plain-text memory image format.
//!
//! A memory image is the 128 cells in address order, each written as two
//! hex digits. `save_memory` lays them out 16 per line separated by commas;
//! `load_memory` accepts any mix of commas and whitespace between tokens.
//!
//! ```text
//! 15,00,00,00,00,00,00,00,00,00,00,00,00,00,00,00
//! ...
//! ```

use std::path::Path;
use thiserror::Error;

use crate::cpu::memory::{Memory, MEMORY_SIZE};

/// Cells written per line by [`save_memory`].
pub const CELLS_PER_ROW: usize = 16;

/// Render all of memory as text.
pub fn save_memory(mem: &Memory) -> String {
    let mut output = String::with_capacity(MEMORY_SIZE * 3);
    let cells: Vec<_> = mem.iter().collect();
    for row in cells.chunks(CELLS_PER_ROW) {
        let line: Vec<String> = row.iter().map(|cell| cell.hex()).collect();
        output.push_str(&line.join(","));
        output.push('\n');
    }
    output
}

/// Parse a full memory image without touching any memory.
pub fn parse_memory(text: &str) -> Result<[u8; MEMORY_SIZE], CsvError> {
    let tokens: Vec<&str> = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .collect();

    if tokens.len() != MEMORY_SIZE {
        return Err(CsvError::TokenCount { found: tokens.len() });
    }

    let mut image = [0u8; MEMORY_SIZE];
    for (position, token) in tokens.iter().enumerate() {
        image[position] = parse_token(token).ok_or_else(|| CsvError::InvalidToken {
            position,
            token: token.to_string(),
        })?;
    }

    Ok(image)
}

/// Replace all of memory from text. On error memory is left unchanged.
pub fn load_memory(mem: &mut Memory, text: &str) -> Result<(), CsvError> {
    let image = parse_memory(text)?;
    mem.replace_all(&image);
    Ok(())
}

/// Exactly two hex digits.
fn parse_token(token: &str) -> Option<u8> {
    if token.len() != 2 {
        return None;
    }
    crate::cpu::registers::parse_hex(token)
}

/// Read a memory image from disk.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<[u8; MEMORY_SIZE], CsvError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| CsvError::IoError(e.to_string()))?;
    parse_memory(&text)
}

/// Write a memory image to disk.
pub fn save_file<P: AsRef<Path>>(path: P, mem: &Memory) -> Result<(), CsvError> {
    std::fs::write(path.as_ref(), save_memory(mem))
        .map_err(|e| CsvError::IoError(e.to_string()))
}

/// Errors that can occur while loading a memory image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsvError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("expected 128 values, found {found}")]
    TokenCount { found: usize },

    #[error("value {position} ({token:?}) is not two hex digits")]
    InvalidToken { position: usize, token: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tokens(values: &[&str]) -> String {
        values.join(",")
    }

    #[test]
    fn test_save_layout() {
        let mut mem = Memory::new();
        mem.write(0, 0x15);
        mem.write(127, 0xAB);
        let text = save_memory(&mem);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), MEMORY_SIZE / CELLS_PER_ROW);
        assert!(lines[0].starts_with("15,00,"));
        assert!(lines[7].ends_with(",AB"));
    }

    #[test]
    fn test_untouched_memory_roundtrip() {
        let original = Memory::new();
        let mut loaded = Memory::new();
        loaded.write(5, 0x77);
        load_memory(&mut loaded, &save_memory(&original)).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_load_accepts_any_separators() {
        let mut cells = vec!["00"; MEMORY_SIZE];
        cells[1] = "ff";
        let text = cells.join(" \r\n");
        let image = parse_memory(&text).unwrap();
        assert_eq!(image[1], 0xFF);
    }

    #[test]
    fn test_wrong_token_count() {
        let mut mem = Memory::new();
        mem.write(0, 0x42);
        let before = mem.clone();

        let short = tokens(&["00"; MEMORY_SIZE - 1]);
        assert_eq!(load_memory(&mut mem, &short), Err(CsvError::TokenCount { found: 127 }));

        let long = tokens(&["00"; MEMORY_SIZE + 1]);
        assert_eq!(load_memory(&mut mem, &long), Err(CsvError::TokenCount { found: 129 }));

        assert_eq!(mem, before);
    }

    #[test]
    fn test_invalid_token() {
        let mut mem = Memory::new();
        mem.write(0, 0x42);
        let before = mem.clone();

        let mut cells = vec!["11"; MEMORY_SIZE];
        cells[9] = "GZ";
        let err = load_memory(&mut mem, &tokens(&cells)).unwrap_err();
        assert_eq!(err, CsvError::InvalidToken { position: 9, token: "GZ".into() });
        assert!(err.to_string().contains("GZ"));
        assert_eq!(mem, before);
    }

    #[test]
    fn test_one_digit_token_rejected() {
        let mut cells = vec!["00"; MEMORY_SIZE];
        cells[0] = "5";
        assert!(matches!(parse_memory(&tokens(&cells)), Err(CsvError::InvalidToken { position: 0, .. })));
    }

    #[test]
    fn test_missing_file() {
        let err = load_file("/nonexistent/pico/memory.csv").unwrap_err();
        assert!(matches!(err, CsvError::IoError(_)));
    }

    proptest! {
        #[test]
        fn prop_save_then_load_is_identity(values in proptest::collection::vec(any::<u8>(), MEMORY_SIZE)) {
            let mut original = Memory::new();
            original.load_program(0, &values).unwrap();

            let mut loaded = Memory::new();
            load_memory(&mut loaded, &save_memory(&original)).unwrap();
            prop_assert_eq!(loaded, original);
        }
    }
}
