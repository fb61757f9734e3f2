use std::fmt;

use super::{Cpu, MachineFault, Op};
use crate::word::{BitAddressable, Word};

/// `TRAP`: `R7 <- PC`, `PC <- M[trapvect8]`. Mechanically identical to the
/// exception vectoring sequence, but the priority level is left unchanged
/// rather than elevated (spec §4.2): a trap is a voluntary system call, not
/// a fault.
#[derive(Debug, Clone, Copy)]
pub struct TrapOp {
    pub trap_vector: u8,
}

impl TrapOp {
    pub fn decode(ir: Word) -> Self {
        Self {
            trap_vector: ir.range(7..0).get() as u8,
        }
    }
}

impl Op for TrapOp {
    fn execute(&self, cpu: &mut Cpu) -> Result<(), MachineFault> {
        let handler = cpu.sys_load(super::TRAP_VECTOR_BASE + self.trap_vector as u16);
        cpu.r[7] = cpu.pc;
        let priority = cpu.priority();
        cpu.vector_to(handler.get(), priority);
        Ok(())
    }
}

impl fmt::Display for TrapOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TRAP x{:02X}", self.trap_vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;
    use crate::memory::PrivilegeLevel;

    #[test]
    fn traps_through_the_vector_table_and_links_r7() {
        let mut cpu = Cpu::new(EmulatorConfig::default());
        cpu.r[6].set(0x2FFF); // system stack pointer
        cpu.pc.set(0x3001);
        cpu.memory_mut()
            .store(0x0025, Word::new(0x0500), PrivilegeLevel::System)
            .unwrap();
        let op = TrapOp::decode(Word::new(0b1111_0000_00100101)); // TRAP x25
        op.execute(&mut cpu).unwrap();
        assert_eq!(cpu.pc.get(), 0x0500);
        assert_eq!(cpu.r[7].get(), 0x3001);
    }

    #[test]
    fn trap_leaves_priority_unchanged() {
        let mut cpu = Cpu::new(EmulatorConfig::default());
        cpu.set_priority(3);
        cpu.r[6].set(0x2FFF);
        cpu.memory_mut()
            .store(0x0021, Word::new(0x0600), PrivilegeLevel::System)
            .unwrap();
        let op = TrapOp::decode(Word::new(0b1111_0000_00100001)); // TRAP x21
        op.execute(&mut cpu).unwrap();
        assert_eq!(cpu.priority(), 3);
    }
}
