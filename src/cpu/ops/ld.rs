use std::fmt;

use super::{Cpu, MachineFault, Op};
use crate::word::{BitAddressable, Word};

/// `LD`: `DR <- mem[PC + sext(PCoffset9)]`; sets condition codes.
#[derive(Debug, Clone, Copy)]
pub struct LdOp {
    pub dr: u8,
    pub pc_offset9: i16,
}

impl LdOp {
    pub fn decode(ir: Word) -> Self {
        Self {
            dr: ir.range(11..9).get() as u8,
            pc_offset9: ir.range(8..0).sign_extend(8).as_i16(),
        }
    }
}

impl Op for LdOp {
    fn execute(&self, cpu: &mut Cpu) -> Result<(), MachineFault> {
        let addr = cpu.pc.get().wrapping_add(self.pc_offset9 as u16);
        let value = cpu.mem_load(addr)?;
        cpu.r[self.dr as usize] = value;
        cpu.update_flags(self.dr as usize);
        Ok(())
    }
}

impl fmt::Display for LdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LD R{}, #{}", self.dr, self.pc_offset9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;
    use crate::memory::PrivilegeLevel;

    #[test]
    fn loads_from_pc_relative_address_and_sets_flags() {
        let mut cpu = Cpu::new(EmulatorConfig::default());
        cpu.pc.set(0x3001);
        cpu.memory_mut()
            .store(0x3006, Word::new(0xFFFF), PrivilegeLevel::System)
            .unwrap();
        let op = LdOp::decode(Word::new(0b0010_000_000000101)); // LD R0 #5
        op.execute(&mut cpu).unwrap();
        assert_eq!(cpu.r[0].get(), 0xFFFF);
        assert_eq!(cpu.nzp(), (true, false, false));
    }
}
