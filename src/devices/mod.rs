//! Memory-mapped I/O devices.
//!
//! Each device owns one or more addresses in `0xFE00..=0xFFFF` and is
//! dispatched to by [`crate::memory::Memory`] instead of aliasing to RAM.

pub mod control;
mod display;
mod keyboard;

pub use control::{MachineControl, ProcessorStatus, SavedStackPointers};
pub use display::{Display, DDR_ADDR, DSR_ADDR};
pub use keyboard::{Keyboard, KBDR_ADDR, KBSR_ADDR};

use thiserror::Error;

use crate::word::Word;

/// Error raised by a device's own read/write logic; always surfaced to the
/// caller as a [`crate::memory::MemoryError::Device`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device has no register mapped at address 0x{addr:04X}")]
    Unmapped { addr: u16 },
}

/// A memory-mapped device register bank.
pub trait Device: Send {
    /// The addresses this device responds to.
    fn addresses(&self) -> &[u16];

    fn read(&mut self, addr: u16) -> Result<Word, DeviceError>;

    fn write(&mut self, addr: u16, value: Word) -> Result<(), DeviceError>;
}

/// Maps device addresses to the device handle that owns them.
///
/// Grounded on Design Notes §9's "abstract capability set plus a
/// device-registry mapping address -> handle" option: devices never hold a
/// reference back to the CPU, only an [`crate::interrupts::InterruptHandle`].
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Vec<Box<dyn Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, device: Box<dyn Device>) {
        self.devices.push(device);
    }

    pub fn handles(&self, addr: u16) -> bool {
        self.devices.iter().any(|d| d.addresses().contains(&addr))
    }

    pub fn read(&mut self, addr: u16) -> Result<Word, DeviceError> {
        self.device_for_mut(addr)
            .ok_or(DeviceError::Unmapped { addr })?
            .read(addr)
    }

    pub fn write(&mut self, addr: u16, value: Word) -> Result<(), DeviceError> {
        self.device_for_mut(addr)
            .ok_or(DeviceError::Unmapped { addr })?
            .write(addr, value)
    }

    fn device_for_mut(&mut self, addr: u16) -> Option<&mut Box<dyn Device>> {
        self.devices
            .iter_mut()
            .find(|d| d.addresses().contains(&addr))
    }
}
