use std::fmt;

use super::{Cpu, MachineFault, Op};
use crate::word::{BitAddressable, Word};

#[derive(Debug, Clone, Copy)]
pub enum JsrTarget {
    /// `JSR`: PC-relative, 11-bit signed offset.
    Offset(i16),
    /// `JSRR`: indirect through a base register (spec §4.7 sugar for the
    /// baseR=7... no, distinct opcode bit, not sugar: the ISA itself
    /// encodes both forms under opcode 4).
    BaseRegister(u8),
}

/// `JSR`/`JSRR`: `R7 <- PC`, then jump to the computed target.
#[derive(Debug, Clone, Copy)]
pub struct JsrOp {
    pub target: JsrTarget,
}

impl JsrOp {
    pub fn decode(ir: Word) -> Self {
        let target = if ir.index(11).get() == 1 {
            JsrTarget::Offset(ir.range(10..0).sign_extend(10).as_i16())
        } else {
            JsrTarget::BaseRegister(ir.range(8..6).get() as u8)
        };
        Self { target }
    }
}

impl Op for JsrOp {
    fn execute(&self, cpu: &mut Cpu) -> Result<(), MachineFault> {
        let return_addr = cpu.pc.get();
        let target = match self.target {
            JsrTarget::Offset(offset) => return_addr.wrapping_add(offset as u16),
            JsrTarget::BaseRegister(base_r) => cpu.r[base_r as usize].get(),
        };
        cpu.r[7].set(return_addr);
        cpu.pc.set(target);
        Ok(())
    }
}

impl fmt::Display for JsrOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            JsrTarget::Offset(offset) => write!(f, "JSR #{}", offset),
            JsrTarget::BaseRegister(base_r) => write!(f, "JSRR R{}", base_r),
        }
    }
}
