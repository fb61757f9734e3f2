//! Places assembled object code into memory and wires vector-table entries.
//!
//! Grounded on spec §4.6; the teacher has only an unchecked `flash_memory`
//! copy loop (`src/emulator.rs`), extended here with the bounds/overlap
//! checks the spec calls for.

use thiserror::Error;

use crate::memory::{Memory, DEVICE_REGION_START, MEMORY_SIZE};
use crate::word::Word;

/// A relocatable image: a contiguous run of words starting at `orig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectCode {
    pub orig: u16,
    pub words: Vec<u16>,
}

impl ObjectCode {
    pub fn new(orig: u16, words: Vec<u16>) -> Self {
        Self { orig, words }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("object code at 0x{orig:04X} of length {len} runs past the end of memory")]
    OutOfBounds { orig: u16, len: usize },
    #[error("object code at 0x{orig:04X} of length {len} overlaps the device register region")]
    OverlapsReservedRegion { orig: u16, len: usize },
}

/// Copies object code into memory and installs vector-table entries.
///
/// Always operates with system privilege (spec §4.6): the loader is an
/// initial-setup mechanism, not something user code can invoke.
pub struct Loader<'m> {
    memory: &'m mut Memory,
}

impl<'m> Loader<'m> {
    pub fn new(memory: &'m mut Memory) -> Self {
        Self { memory }
    }

    /// Copy `code[i]` into memory at `orig + i` for all `i`.
    pub fn load(&mut self, obj: &ObjectCode) -> Result<(), LoadError> {
        Self::check_bounds(obj)?;
        for (i, word) in obj.words.iter().enumerate() {
            let addr = obj.orig.wrapping_add(i as u16);
            self.memory.store_raw(addr, Word::new(*word));
        }
        tracing::debug!(orig = format!("0x{:04X}", obj.orig), len = obj.words.len(), "loaded object code");
        Ok(())
    }

    /// Write `obj.orig` into the vector table at `vector_addr`, then load
    /// the code itself.
    pub fn load_vector(&mut self, vector_addr: u16, obj: &ObjectCode) -> Result<(), LoadError> {
        self.memory.store_raw(vector_addr, Word::new(obj.orig));
        self.load(obj)
    }

    fn check_bounds(obj: &ObjectCode) -> Result<(), LoadError> {
        let end = obj.orig as u32 + obj.words.len() as u32;
        if end > MEMORY_SIZE as u32 {
            return Err(LoadError::OutOfBounds {
                orig: obj.orig,
                len: obj.words.len(),
            });
        }
        if end > DEVICE_REGION_START as u32 && obj.orig < DEVICE_REGION_START {
            return Err(LoadError::OverlapsReservedRegion {
                orig: obj.orig,
                len: obj.words.len(),
            });
        }
        Ok(())
    }
}
