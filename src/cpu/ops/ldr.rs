use std::fmt;

use super::{Cpu, MachineFault, Op};
use crate::word::{BitAddressable, Word};

/// `LDR`: `DR <- mem[R[baseR] + sext(offset6)]`; sets condition codes.
#[derive(Debug, Clone, Copy)]
pub struct LdrOp {
    pub dr: u8,
    pub base_r: u8,
    pub offset6: i16,
}

impl LdrOp {
    pub fn decode(ir: Word) -> Self {
        Self {
            dr: ir.range(11..9).get() as u8,
            base_r: ir.range(8..6).get() as u8,
            offset6: ir.range(5..0).sign_extend(5).as_i16(),
        }
    }
}

impl Op for LdrOp {
    fn execute(&self, cpu: &mut Cpu) -> Result<(), MachineFault> {
        let base = cpu.r[self.base_r as usize].get();
        let addr = base.wrapping_add(self.offset6 as u16);
        let value = cpu.mem_load(addr)?;
        cpu.r[self.dr as usize] = value;
        cpu.update_flags(self.dr as usize);
        Ok(())
    }
}

impl fmt::Display for LdrOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LDR R{}, R{}, #{}", self.dr, self.base_r, self.offset6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;
    use crate::memory::PrivilegeLevel;

    #[test]
    fn loads_from_base_plus_offset() {
        let mut cpu = Cpu::new(EmulatorConfig::default());
        cpu.r[2].set(0x4000);
        cpu.memory_mut()
            .store(0x4003, Word::new(7), PrivilegeLevel::System)
            .unwrap();
        let op = LdrOp::decode(Word::new(0b0110_000_010_000011)); // LDR R0,R2,#3
        op.execute(&mut cpu).unwrap();
        assert_eq!(cpu.r[0].get(), 7);
    }
}
