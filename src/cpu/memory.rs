//! Pico memory subsystem.
//!
//! 128 one-byte cells, addressed 0x00-0x7F, holding both program and data.

use serde::{Serialize, Serializer};

use crate::cpu::registers::{Label, Register};

/// The number of memory cells in the Pico.
pub const MEMORY_SIZE: usize = 128;

/// Pico memory: 128 labelled byte cells.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    cells: [Register; MEMORY_SIZE],
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: std::array::from_fn(|addr| Register::new(Label::Cell(addr as u8))),
        }
    }

    /// Borrow a cell by address (0-127).
    ///
    /// # Panics
    /// Panics if address is out of range.
    #[inline]
    pub fn get(&self, addr: usize) -> &Register {
        assert!(addr < MEMORY_SIZE, "Memory address {} out of range (0-{})", addr, MEMORY_SIZE - 1);
        &self.cells[addr]
    }

    /// Mutably borrow a cell by address (0-127), e.g. for text edits.
    ///
    /// # Panics
    /// Panics if address is out of range.
    #[inline]
    pub fn get_mut(&mut self, addr: usize) -> &mut Register {
        assert!(addr < MEMORY_SIZE, "Memory address {} out of range (0-{})", addr, MEMORY_SIZE - 1);
        &mut self.cells[addr]
    }

    /// Read a cell by address (0-127).
    ///
    /// # Panics
    /// Panics if address is out of range.
    #[inline]
    pub fn read(&self, addr: usize) -> u8 {
        self.get(addr).get()
    }

    /// Write a cell by address (0-127).
    ///
    /// # Panics
    /// Panics if address is out of range.
    #[inline]
    pub fn write(&mut self, addr: usize, value: u8) {
        self.get_mut(addr).set(value);
    }

    /// Iterate over the cells in address order.
    pub fn iter(&self) -> std::slice::Iter<'_, Register> {
        self.cells.iter()
    }

    /// All cell values in address order.
    pub fn bytes(&self) -> [u8; MEMORY_SIZE] {
        std::array::from_fn(|addr| self.cells[addr].get())
    }

    /// Overwrite every cell at once.
    pub fn replace_all(&mut self, image: &[u8; MEMORY_SIZE]) {
        for (cell, &value) in self.cells.iter_mut().zip(image.iter()) {
            cell.set(value);
        }
    }

    /// Load a program into memory starting at the given address.
    pub fn load_program(&mut self, start_addr: usize, program: &[u8]) -> Result<(), MemoryError> {
        if start_addr + program.len() > MEMORY_SIZE {
            return Err(MemoryError::ProgramTooLarge {
                size: program.len(),
                available: MEMORY_SIZE.saturating_sub(start_addr),
            });
        }

        for (i, &byte) in program.iter().enumerate() {
            self.cells[start_addr + i].set(byte);
        }

        Ok(())
    }

    /// Delete the cell at `addr`, pulling every later cell one address
    /// lower. The last cell becomes zero.
    ///
    /// # Panics
    /// Panics if address is out of range.
    pub fn shift_up(&mut self, addr: usize) {
        assert!(addr < MEMORY_SIZE, "Memory address {} out of range (0-{})", addr, MEMORY_SIZE - 1);
        let mut image = self.bytes();
        image.copy_within(addr + 1.., addr);
        image[MEMORY_SIZE - 1] = 0;
        self.replace_all(&image);
    }

    /// Insert a zero cell at `addr`, pushing every later cell one address
    /// higher. The last cell falls off the end.
    ///
    /// # Panics
    /// Panics if address is out of range.
    pub fn shift_down(&mut self, addr: usize) {
        assert!(addr < MEMORY_SIZE, "Memory address {} out of range (0-{})", addr, MEMORY_SIZE - 1);
        let mut image = self.bytes();
        image.copy_within(addr..MEMORY_SIZE - 1, addr + 1);
        image[addr] = 0;
        self.replace_all(&image);
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|cell| cell.get() != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

impl Serialize for Memory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.cells.iter().map(Register::get))
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// Program is too large to fit in memory.
    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}
