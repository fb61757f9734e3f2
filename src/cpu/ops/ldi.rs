use std::fmt;

use super::{Cpu, MachineFault, Op};
use crate::word::{BitAddressable, Word};

/// `LDI`: `DR <- mem[mem[PC + sext(PCoffset9)]]`; sets condition codes.
#[derive(Debug, Clone, Copy)]
pub struct LdiOp {
    pub dr: u8,
    pub pc_offset9: i16,
}

impl LdiOp {
    pub fn decode(ir: Word) -> Self {
        Self {
            dr: ir.range(11..9).get() as u8,
            pc_offset9: ir.range(8..0).sign_extend(8).as_i16(),
        }
    }
}

impl Op for LdiOp {
    fn execute(&self, cpu: &mut Cpu) -> Result<(), MachineFault> {
        let pointer_addr = cpu.pc.get().wrapping_add(self.pc_offset9 as u16);
        let indirect_addr = cpu.mem_load(pointer_addr)?.get();
        let value = cpu.mem_load(indirect_addr)?;
        cpu.r[self.dr as usize] = value;
        cpu.update_flags(self.dr as usize);
        Ok(())
    }
}

impl fmt::Display for LdiOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LDI R{}, #{}", self.dr, self.pc_offset9)
    }
}
