use std::fmt;

use super::{Cpu, MachineFault, Op};
use crate::word::{BitAddressable, Word};

/// `NOT`: `DR <- !SR`; sets condition codes.
#[derive(Debug, Clone, Copy)]
pub struct NotOp {
    pub dr: u8,
    pub sr: u8,
}

impl NotOp {
    pub fn decode(ir: Word) -> Self {
        Self {
            dr: ir.range(11..9).get() as u8,
            sr: ir.range(8..6).get() as u8,
        }
    }
}

impl Op for NotOp {
    fn execute(&self, cpu: &mut Cpu) -> Result<(), MachineFault> {
        let value = !cpu.r[self.sr as usize].get();
        cpu.r[self.dr as usize].set(value);
        cpu.update_flags(self.dr as usize);
        Ok(())
    }
}

impl fmt::Display for NotOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NOT R{}, R{}", self.dr, self.sr)
    }
}
