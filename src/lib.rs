#![warn(clippy::all, rust_2018_idioms)]

//! A from-scratch LC-3 teaching-machine emulator: CPU, memory-mapped I/O,
//! assembler, and a minimal BIOS image of trap handlers.
//!
//! Grounded throughout on `JackCrumpLeys-textbook210_emulator`'s
//! `src/emulator.rs`/`src/emulator/*`, restructured from a GUI-driven
//! micro-op stepper into the library-shaped, headless machine this crate
//! exposes.

pub mod assembler;
pub mod bios;
pub mod config;
pub mod cpu;
pub mod devices;
pub mod interrupts;
pub mod loader;
pub mod logging;
pub mod memory;
pub mod word;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag for [`cpu::Cpu::run_cancellable`].
///
/// Checked only between instructions (spec §5): a caller on another thread
/// can request a stop without the CPU tearing down mid-instruction.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
