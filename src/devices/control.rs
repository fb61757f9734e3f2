use std::sync::{Arc, Mutex};

use super::{Device, DeviceError};
use crate::word::Word;

/// Processor status register, mapped for trap handlers that need to inspect
/// or restore it without a dedicated `RTI`.
pub const PSR_ADDR: u16 = 0xFFFC;
/// Machine control register; clearing bit 15 halts the CPU.
pub const MCR_ADDR: u16 = 0xFFFE;
/// Saved supervisor stack pointer.
pub const SSP_ADDR: u16 = 0xFFFA;
/// Saved user stack pointer.
pub const USP_ADDR: u16 = 0xFFF8;

pub const PSR_PRIVILEGE_BIT: u16 = 0x8000;
pub const MCR_RUN_BIT: u16 = 0x8000;

/// The processor state that is simultaneously a CPU register and a
/// memory-mapped address (spec §3, §4.5). A single shared instance is the
/// source of truth for both [`crate::cpu::Cpu`]'s fast-path accessors and
/// the mapped devices below, so an `LDR`/`STR` against 0xFFFC and a native
/// `RTI` always observe the same PSR.
#[derive(Debug, Clone, Copy)]
pub struct SystemRegisters {
    pub psr: u16,
    pub mcr: u16,
    pub ssp: u16,
    pub usp: u16,
}

impl Default for SystemRegisters {
    fn default() -> Self {
        Self {
            psr: 0x0002, // supervisor mode, Z set
            mcr: 0,
            ssp: 0x3000,
            usp: 0x3000,
        }
    }
}

pub type SharedSystemRegisters = Arc<Mutex<SystemRegisters>>;

pub fn shared_system_registers() -> SharedSystemRegisters {
    Arc::new(Mutex::new(SystemRegisters::default()))
}

/// PSR mapped at [`PSR_ADDR`].
pub struct ProcessorStatus(SharedSystemRegisters);

impl ProcessorStatus {
    pub fn new(shared: SharedSystemRegisters) -> Self {
        Self(shared)
    }
}

impl Device for ProcessorStatus {
    fn addresses(&self) -> &[u16] {
        &[PSR_ADDR]
    }

    fn read(&mut self, addr: u16) -> Result<Word, DeviceError> {
        if addr != PSR_ADDR {
            return Err(DeviceError::Unmapped { addr });
        }
        Ok(Word::new(self.0.lock().expect("psr lock poisoned").psr))
    }

    fn write(&mut self, addr: u16, value: Word) -> Result<(), DeviceError> {
        if addr != PSR_ADDR {
            return Err(DeviceError::Unmapped { addr });
        }
        self.0.lock().expect("psr lock poisoned").psr = value.get();
        Ok(())
    }
}

/// MCR mapped at [`MCR_ADDR`].
pub struct MachineControl(SharedSystemRegisters);

impl MachineControl {
    pub fn new(shared: SharedSystemRegisters) -> Self {
        Self(shared)
    }
}

impl Device for MachineControl {
    fn addresses(&self) -> &[u16] {
        &[MCR_ADDR]
    }

    fn read(&mut self, addr: u16) -> Result<Word, DeviceError> {
        if addr != MCR_ADDR {
            return Err(DeviceError::Unmapped { addr });
        }
        Ok(Word::new(self.0.lock().expect("mcr lock poisoned").mcr))
    }

    fn write(&mut self, addr: u16, value: Word) -> Result<(), DeviceError> {
        if addr != MCR_ADDR {
            return Err(DeviceError::Unmapped { addr });
        }
        self.0.lock().expect("mcr lock poisoned").mcr = value.get();
        Ok(())
    }
}

/// SSP/USP mapped at [`SSP_ADDR`]/[`USP_ADDR`].
pub struct SavedStackPointers(SharedSystemRegisters);

impl SavedStackPointers {
    pub fn new(shared: SharedSystemRegisters) -> Self {
        Self(shared)
    }
}

impl Device for SavedStackPointers {
    fn addresses(&self) -> &[u16] {
        &[SSP_ADDR, USP_ADDR]
    }

    fn read(&mut self, addr: u16) -> Result<Word, DeviceError> {
        let regs = self.0.lock().expect("sysregs lock poisoned");
        match addr {
            SSP_ADDR => Ok(Word::new(regs.ssp)),
            USP_ADDR => Ok(Word::new(regs.usp)),
            _ => Err(DeviceError::Unmapped { addr }),
        }
    }

    fn write(&mut self, addr: u16, value: Word) -> Result<(), DeviceError> {
        let mut regs = self.0.lock().expect("sysregs lock poisoned");
        match addr {
            SSP_ADDR => {
                regs.ssp = value.get();
                Ok(())
            }
            USP_ADDR => {
                regs.usp = value.get();
                Ok(())
            }
            _ => Err(DeviceError::Unmapped { addr }),
        }
    }
}
