use std::fmt;

use super::{Cpu, MachineFault, Op};
use crate::word::{BitAddressable, Word};

/// `STR`: `mem[R[baseR] + sext(offset6)] <- SR`.
#[derive(Debug, Clone, Copy)]
pub struct StrOp {
    pub sr: u8,
    pub base_r: u8,
    pub offset6: i16,
}

impl StrOp {
    pub fn decode(ir: Word) -> Self {
        Self {
            sr: ir.range(11..9).get() as u8,
            base_r: ir.range(8..6).get() as u8,
            offset6: ir.range(5..0).sign_extend(5).as_i16(),
        }
    }
}

impl Op for StrOp {
    fn execute(&self, cpu: &mut Cpu) -> Result<(), MachineFault> {
        let base = cpu.r[self.base_r as usize].get();
        let addr = base.wrapping_add(self.offset6 as u16);
        let value = cpu.r[self.sr as usize];
        cpu.mem_store(addr, value)
    }
}

impl fmt::Display for StrOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "STR R{}, R{}, #{}", self.sr, self.base_r, self.offset6)
    }
}
