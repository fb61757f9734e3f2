use std::fmt;

use super::{Cpu, MachineFault, Op};
use crate::word::{BitAddressable, Word};

/// `JMP`/`RET`: `PC <- R[baseR]`. `RET` is the assembler sugar for
/// `JMP R7` (spec §4.7); both share this single opcode.
#[derive(Debug, Clone, Copy)]
pub struct JmpOp {
    pub base_r: u8,
}

impl JmpOp {
    pub fn decode(ir: Word) -> Self {
        Self {
            base_r: ir.range(8..6).get() as u8,
        }
    }
}

impl Op for JmpOp {
    fn execute(&self, cpu: &mut Cpu) -> Result<(), MachineFault> {
        cpu.pc.set(cpu.r[self.base_r as usize].get());
        Ok(())
    }
}

impl fmt::Display for JmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.base_r == 7 {
            write!(f, "RET")
        } else {
            write!(f, "JMP R{}", self.base_r)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;

    #[test]
    fn jmp_sets_pc_from_base_register() {
        let mut cpu = Cpu::new(EmulatorConfig::default());
        cpu.r[3].set(0x4000);
        let op = JmpOp::decode(Word::new(0b1100_000_011_000000));
        op.execute(&mut cpu).unwrap();
        assert_eq!(cpu.pc.get(), 0x4000);
    }

    #[test]
    fn ret_displays_distinct_from_jmp() {
        let op = JmpOp::decode(Word::new(0b1100_000_111_000000));
        assert_eq!(op.to_string(), "RET");
    }
}
