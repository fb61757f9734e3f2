use std::fmt;

use super::{Cpu, MachineFault, Op};
use crate::word::{BitAddressable, Word};

/// `BR`: conditional branch. `PC <- PC + sext(PCoffset9)` if any of the
/// requested condition flags match the current NZP (spec §4.1 encoding
/// table). `n`/`z`/`p` all clear encodes an unconditional `NOP`.
#[derive(Debug, Clone, Copy)]
pub struct BrOp {
    pub n: bool,
    pub z: bool,
    pub p: bool,
    pub pc_offset9: i16,
}

impl BrOp {
    pub fn decode(ir: Word) -> Self {
        Self {
            n: ir.index(11).get() == 1,
            z: ir.index(10).get() == 1,
            p: ir.index(9).get() == 1,
            pc_offset9: ir.range(8..0).sign_extend(8).as_i16(),
        }
    }
}

impl Op for BrOp {
    fn execute(&self, cpu: &mut Cpu) -> Result<(), MachineFault> {
        let (n, z, p) = cpu.nzp();
        if (self.n && n) || (self.z && z) || (self.p && p) {
            let pc = cpu.pc.get();
            cpu.pc.set(pc.wrapping_add(self.pc_offset9 as u16));
        }
        Ok(())
    }
}

impl fmt::Display for BrOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BR{}{}{} #{}",
            if self.n { "n" } else { "" },
            if self.z { "z" } else { "" },
            if self.p { "p" } else { "" },
            self.pc_offset9
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;

    #[test]
    fn branch_taken_when_flag_matches() {
        let mut cpu = Cpu::new(EmulatorConfig::default());
        cpu.set_psr(cpu.psr() & !0b111 | 0b010); // Z
        cpu.pc.set(0x3001);
        let op = BrOp::decode(Word::new(0b0000_010_000000101)); // BRz #5
        op.execute(&mut cpu).unwrap();
        assert_eq!(cpu.pc.get(), 0x3006);
    }

    #[test]
    fn branch_not_taken_when_flag_differs() {
        let mut cpu = Cpu::new(EmulatorConfig::default());
        cpu.set_psr(cpu.psr() & !0b111 | 0b001); // P
        cpu.pc.set(0x3001);
        let op = BrOp::decode(Word::new(0b0000_010_000000101)); // BRz #5
        op.execute(&mut cpu).unwrap();
        assert_eq!(cpu.pc.get(), 0x3001);
    }

    #[test]
    fn negative_offset_branches_backward() {
        let mut cpu = Cpu::new(EmulatorConfig::default());
        cpu.set_psr(cpu.psr() & !0b111 | 0b100); // N
        cpu.pc.set(0x3010);
        let op = BrOp::decode(Word::new(0b0000_100_111111110)); // BRn #-2
        op.execute(&mut cpu).unwrap();
        assert_eq!(cpu.pc.get(), 0x300E);
    }
}
