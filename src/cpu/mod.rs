//! Fetch-decode-execute loop, privilege/interrupt/trap machinery.
//!
//! Grounded on the teacher's `Emulator` in `src/emulator.rs`, simplified
//! from its per-micro-op GUI-animation stepper down to the macro 5-step
//! cycle the spec describes (§4.2): the micro-op visualizer exists purely
//! to animate execution in the egui GUI, which is out of scope here.

pub mod ops;

use std::sync::Arc;

use thiserror::Error;

use crate::config::EmulatorConfig;
use crate::devices::control::{
    shared_system_registers, MachineControl, ProcessorStatus, SavedStackPointers,
    MCR_RUN_BIT, PSR_PRIVILEGE_BIT,
};
use crate::devices::control::SharedSystemRegisters;
use crate::devices::{DeviceRegistry, Display, Keyboard};
use crate::interrupts::{InterruptController, InterruptHandle, PendingInterrupt};
use crate::memory::{Memory, MemoryError, PrivilegeLevel};
use crate::word::{sign_extend, Word};
use ops::OpCode;

/// Base address of the trap vector table (spec §3).
pub const TRAP_VECTOR_BASE: u16 = 0x0000;
/// Base address of the interrupt vector table.
pub const INTERRUPT_VECTOR_BASE: u16 = 0x0100;
/// Base address of the exception vector table.
pub const EXCEPTION_VECTOR_BASE: u16 = 0x0200;

/// All architected exceptions are serviced at the highest priority level,
/// matching the textbook LC-3 hardware (an Open Question the spec leaves
/// unresolved for exceptions specifically; see DESIGN.md).
const EXCEPTION_PRIORITY: u8 = 7;

const EXC_PRIVILEGE_VIOLATION: u16 = 0x00;
const EXC_ILLEGAL_OPCODE: u16 = 0x01;
const EXC_ACCESS_CONTROL_VIOLATION: u16 = 0x02;

const KEYBOARD_DEVICE_ID: u32 = 0;

/// An architected machine fault: always vectored internally unless the
/// relevant exception vector is zero (no handler installed), in which case
/// [`Cpu::step`] surfaces it to the caller (spec §7).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MachineFault {
    #[error("reserved opcode or illegal instruction")]
    IllegalOpcode,
    #[error("privileged instruction executed in user mode")]
    PrivilegeViolation,
    #[error("access control violation at 0x{addr:04X}")]
    AccessControlViolation { addr: u16 },
}

impl MachineFault {
    fn exception_vector_index(&self) -> u16 {
        match self {
            MachineFault::PrivilegeViolation => EXC_PRIVILEGE_VIOLATION,
            MachineFault::IllegalOpcode => EXC_ILLEGAL_OPCODE,
            MachineFault::AccessControlViolation { .. } => EXC_ACCESS_CONTROL_VIOLATION,
        }
    }
}

impl From<MemoryError> for MachineFault {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::PrivilegeViolation { addr } => {
                MachineFault::AccessControlViolation { addr }
            }
            MemoryError::Device { addr, .. } => MachineFault::AccessControlViolation { addr },
        }
    }
}

/// The outcome of one [`Cpu::step`] call, replacing native exceptions for
/// trap/exception control flow per Design Notes §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Continue,
    Halted,
    Fault(MachineFault),
}

pub struct Cpu {
    pub r: [Word; 8],
    pub pc: Word,
    pub ir: Word,
    pub mar: Word,
    pub mdr: Word,
    memory: Memory,
    sysregs: SharedSystemRegisters,
    interrupts: Arc<InterruptController>,
    pub config: EmulatorConfig,
}

impl Cpu {
    pub fn new(config: EmulatorConfig) -> Self {
        let sysregs = shared_system_registers();
        let interrupts = Arc::new(InterruptController::new());

        let mut devices = DeviceRegistry::new();
        let keyboard_handle = InterruptHandle::new(interrupts.clone(), KEYBOARD_DEVICE_ID);
        devices.register(Box::new(Keyboard::new(keyboard_handle)));
        devices.register(Box::new(Display::new()));
        devices.register(Box::new(MachineControl::new(sysregs.clone())));
        devices.register(Box::new(ProcessorStatus::new(sysregs.clone())));
        devices.register(Box::new(SavedStackPointers::new(sysregs.clone())));

        Self {
            r: [Word::new(0); 8],
            pc: Word::new(0x3000),
            ir: Word::new(0),
            mar: Word::new(0),
            mdr: Word::new(0),
            memory: Memory::new(devices),
            sysregs,
            interrupts,
            config,
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn interrupts(&self) -> &Arc<InterruptController> {
        &self.interrupts
    }

    // --- PSR / MCR accessors -------------------------------------------------

    pub fn priv_level(&self) -> PrivilegeLevel {
        let psr = self.sysregs.lock().expect("psr lock poisoned").psr;
        if psr & PSR_PRIVILEGE_BIT != 0 {
            PrivilegeLevel::User
        } else {
            PrivilegeLevel::System
        }
    }

    pub fn set_priv_level(&mut self, level: PrivilegeLevel) {
        let mut regs = self.sysregs.lock().expect("psr lock poisoned");
        regs.psr = match level {
            PrivilegeLevel::User => regs.psr | PSR_PRIVILEGE_BIT,
            PrivilegeLevel::System => regs.psr & !PSR_PRIVILEGE_BIT,
        };
    }

    pub fn priority(&self) -> u8 {
        let psr = self.sysregs.lock().expect("psr lock poisoned").psr;
        ((psr >> 8) & 0x7) as u8
    }

    pub fn set_priority(&mut self, level: u8) {
        let mut regs = self.sysregs.lock().expect("psr lock poisoned");
        regs.psr = (regs.psr & !0x0700) | (((level & 0x7) as u16) << 8);
    }

    pub fn psr(&self) -> u16 {
        self.sysregs.lock().expect("psr lock poisoned").psr
    }

    pub fn set_psr(&mut self, value: u16) {
        self.sysregs.lock().expect("psr lock poisoned").psr = value;
    }

    /// (N, Z, P) as booleans; exactly one is true after the first
    /// condition-code-setting instruction (spec §3 invariant).
    pub fn nzp(&self) -> (bool, bool, bool) {
        let psr = self.psr();
        (psr & 0b100 != 0, psr & 0b010 != 0, psr & 0b001 != 0)
    }

    pub fn update_flags(&mut self, reg_index: usize) {
        let value = self.r[reg_index].get();
        let mut regs = self.sysregs.lock().expect("psr lock poisoned");
        let flag = if (value >> 15) & 1 == 1 {
            0b100
        } else if value == 0 {
            0b010
        } else {
            0b001
        };
        regs.psr = (regs.psr & !0b111) | flag;
    }

    pub fn running(&self) -> bool {
        self.sysregs.lock().expect("mcr lock poisoned").mcr & MCR_RUN_BIT != 0
    }

    pub fn start_running(&mut self) {
        let mut regs = self.sysregs.lock().expect("mcr lock poisoned");
        regs.mcr |= MCR_RUN_BIT;
    }

    pub fn stop_running(&mut self) {
        let mut regs = self.sysregs.lock().expect("mcr lock poisoned");
        regs.mcr &= !MCR_RUN_BIT;
    }

    fn swap_stack_for(&mut self, level: PrivilegeLevel) {
        let mut regs = self.sysregs.lock().expect("sysregs lock poisoned");
        match (self.priv_level(), level) {
            (PrivilegeLevel::User, PrivilegeLevel::System) => {
                regs.usp = self.r[6].get();
                self.r[6].set(regs.ssp);
            }
            (PrivilegeLevel::System, PrivilegeLevel::User) => {
                regs.ssp = self.r[6].get();
                self.r[6].set(regs.usp);
            }
            _ => {}
        }
    }

    // --- Memory access, always through MAR/MDR (spec §4.3) ------------------

    pub fn mem_load(&mut self, addr: u16) -> Result<Word, MachineFault> {
        self.mar.set(addr);
        let value = self.memory.load(addr, self.priv_level())?;
        self.mdr = value;
        Ok(value)
    }

    pub fn mem_store(&mut self, addr: u16, value: Word) -> Result<(), MachineFault> {
        self.mar.set(addr);
        self.mdr = value;
        self.memory.store(addr, value, self.priv_level())?;
        Ok(())
    }

    /// Bypasses the privilege check; used only by exception/trap/interrupt
    /// vectoring to push onto the system stack even when called from a
    /// user-mode fault.
    fn sys_load(&mut self, addr: u16) -> Word {
        self.memory.load(addr, PrivilegeLevel::System).unwrap_or(Word::new(0))
    }

    fn sys_store(&mut self, addr: u16, value: Word) {
        let _ = self.memory.store(addr, value, PrivilegeLevel::System);
    }

    // --- The instruction cycle (spec §4.2) -----------------------------------

    /// Execute one full instruction cycle: check interrupts, fetch, decode,
    /// execute, check MCR.
    #[tracing::instrument(skip(self))]
    pub fn step(&mut self) -> StepResult {
        if !self.running() {
            return StepResult::Halted;
        }

        if let Some(pending) = self.interrupts.poll() {
            if pending.priority > self.priority() {
                self.service_interrupt(pending);
            }
        }

        let pc = self.pc.get();
        self.pc.set(pc.wrapping_add(1));
        let ir = match self.mem_load(pc) {
            Ok(word) => word,
            Err(fault) => return self.raise(fault),
        };
        self.ir = ir;

        let opcode = match OpCode::decode(ir) {
            Ok(opcode) => opcode,
            Err(fault) => return self.raise(fault),
        };
        tracing::trace!(pc = format!("0x{pc:04X}"), opcode = %opcode, "executing");

        if let Err(fault) = opcode.execute(self) {
            return self.raise(fault);
        }

        if !self.running() {
            return StepResult::Halted;
        }
        StepResult::Continue
    }

    /// Run until halted, faulted without a handler, or `max_steps` reached.
    pub fn run(&mut self) -> StepResult {
        self.start_running();
        let mut steps = 0usize;
        loop {
            if let Some(max) = self.config.max_steps {
                if steps >= max {
                    self.stop_running();
                    return StepResult::Halted;
                }
            }
            match self.step() {
                StepResult::Continue => {}
                other => return other,
            }
            steps += 1;
        }
    }

    /// Run with cooperative cancellation (spec §5): checked between
    /// instructions, never mid-instruction.
    pub fn run_cancellable(&mut self, cancel: &crate::CancelToken) -> StepResult {
        self.start_running();
        let mut steps = 0usize;
        loop {
            if cancel.is_cancelled() {
                self.stop_running();
                return StepResult::Halted;
            }
            if let Some(max) = self.config.max_steps {
                if steps >= max {
                    self.stop_running();
                    return StepResult::Halted;
                }
            }
            match self.step() {
                StepResult::Continue => {}
                other => return other,
            }
            steps += 1;
        }
    }

    fn raise(&mut self, fault: MachineFault) -> StepResult {
        let vector_addr = EXCEPTION_VECTOR_BASE + fault.exception_vector_index();
        let handler = self.sys_load(vector_addr);
        if handler.get() == 0 {
            tracing::warn!(?fault, "unhandled machine fault, no exception handler installed");
            return StepResult::Fault(fault);
        }
        self.vector_to(handler.get(), EXCEPTION_PRIORITY);
        StepResult::Continue
    }

    fn service_interrupt(&mut self, pending: PendingInterrupt) {
        tracing::debug!(?pending, "servicing interrupt");
        let vector_addr = INTERRUPT_VECTOR_BASE + pending.vector as u16;
        let handler = self.sys_load(vector_addr);
        self.vector_to(handler.get(), pending.priority);
        self.interrupts.ack(pending.priority);
    }

    /// Shared push-PSR/push-PC/switch-to-system-mode/jump sequence used by
    /// both exceptions and interrupts (spec §4.2).
    fn vector_to(&mut self, handler_addr: u16, priority: u8) {
        let psr = self.psr();
        self.swap_stack_for(PrivilegeLevel::System);
        self.set_priv_level(PrivilegeLevel::System);
        self.push(Word::new(psr));
        self.push(self.pc);
        self.set_priority(priority);
        self.pc.set(handler_addr);
    }

    fn push(&mut self, value: Word) {
        let sp = self.r[6].get().wrapping_sub(1);
        self.r[6].set(sp);
        self.sys_store(sp, value);
    }

    fn pop(&mut self) -> Word {
        let sp = self.r[6].get();
        let value = self.sys_load(sp);
        self.r[6].set(sp.wrapping_add(1));
        value
    }

    /// `RTI`: pop PC then PSR; if the restored PSR is user-mode, swap R6
    /// with the saved user stack pointer (spec §4.2).
    pub(crate) fn return_from_interrupt(&mut self) {
        let pc = self.pop();
        let psr = self.pop();
        self.pc = pc;
        let was_user = psr.get() & PSR_PRIVILEGE_BIT != 0;
        if was_user {
            self.swap_stack_for(PrivilegeLevel::User);
        }
        self.set_psr(psr.get());
    }

    pub(crate) fn sign_extend(&self, value: Word, bits: u8) -> Word {
        sign_extend(value.get(), bits)
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("pc", &self.pc)
            .field("ir", &self.ir)
            .field("r", &self.r)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Loader, ObjectCode};
    use tracing_test::traced_test;

    fn cpu() -> Cpu {
        Cpu::new(EmulatorConfig::default())
    }

    #[test]
    fn add_immediate_sets_condition_codes() {
        let mut c = cpu();
        c.r[1].set(5);
        // ADD R0, R1, #-2 -> 0001 000 001 1 11110
        let obj = ObjectCode::new(0x3000, vec![0b0001_000_001_1_11110]);
        Loader::new(c.memory_mut()).load(&obj).unwrap();
        c.pc.set(0x3000);
        c.start_running();
        c.memory_mut().store(0x0200, Word::new(0), PrivilegeLevel::System).ok();
        let r = c.step();
        assert_eq!(r, StepResult::Continue);
        assert_eq!(c.r[0].get(), 3);
        assert_eq!(c.nzp(), (false, false, true));
    }

    #[test]
    fn pc_advances_past_fetched_instruction_before_side_effects() {
        let mut c = cpu();
        // AND R0,R0,#0 at 0x3000
        let obj = ObjectCode::new(0x3000, vec![0b0101_000_000_1_00000]);
        Loader::new(c.memory_mut()).load(&obj).unwrap();
        c.pc.set(0x3000);
        c.start_running();
        c.step();
        assert_eq!(c.pc.get(), 0x3001);
    }

    #[traced_test]
    #[test]
    fn reserved_opcode_raises_illegal_opcode_fault_without_handler() {
        let mut c = cpu();
        let obj = ObjectCode::new(0x3000, vec![0b1101_000_000_000_000]);
        Loader::new(c.memory_mut()).load(&obj).unwrap();
        c.pc.set(0x3000);
        c.start_running();
        let r = c.step();
        assert_eq!(r, StepResult::Fault(MachineFault::IllegalOpcode));
        assert!(logs_contain("unhandled machine fault"));
    }

    #[test]
    fn reserved_opcode_vectors_to_installed_handler() {
        let mut c = cpu();
        let obj = ObjectCode::new(0x3000, vec![0b1101_000_000_000_000]);
        Loader::new(c.memory_mut()).load(&obj).unwrap();
        // Install a handler at 0x0400 for the illegal-opcode exception (index 1).
        c.memory_mut()
            .store(0x0201, Word::new(0x0400), PrivilegeLevel::System)
            .unwrap();
        c.r[6].set(0x2FFF); // system stack pointer
        c.pc.set(0x3000);
        c.start_running();
        let r = c.step();
        assert_eq!(r, StepResult::Continue);
        assert_eq!(c.pc.get(), 0x0400);
    }
}
