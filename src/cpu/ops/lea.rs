use std::fmt;

use super::{Cpu, MachineFault, Op};
use crate::word::{BitAddressable, Word};

/// `LEA`: `DR <- PC + sext(PCoffset9)`.
///
/// Condition codes are left untouched by default; set
/// `EmulatorConfig::lea_sets_condition_codes` to opt into the
/// textbook-variant behavior some LC-3 implementations use (Open Question,
/// resolved in DESIGN.md).
#[derive(Debug, Clone, Copy)]
pub struct LeaOp {
    pub dr: u8,
    pub pc_offset9: i16,
}

impl LeaOp {
    pub fn decode(ir: Word) -> Self {
        Self {
            dr: ir.range(11..9).get() as u8,
            pc_offset9: ir.range(8..0).sign_extend(8).as_i16(),
        }
    }
}

impl Op for LeaOp {
    fn execute(&self, cpu: &mut Cpu) -> Result<(), MachineFault> {
        let addr = cpu.pc.get().wrapping_add(self.pc_offset9 as u16);
        cpu.r[self.dr as usize].set(addr);
        if cpu.config.lea_sets_condition_codes {
            cpu.update_flags(self.dr as usize);
        }
        Ok(())
    }
}

impl fmt::Display for LeaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LEA R{}, #{}", self.dr, self.pc_offset9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;

    #[test]
    fn computes_effective_address_without_touching_flags() {
        let mut cpu = Cpu::new(EmulatorConfig::default());
        cpu.set_psr(cpu.psr() & !0b111 | 0b001); // P set beforehand
        cpu.pc.set(0x3001);
        let op = LeaOp::decode(Word::new(0b1110_000_000000101)); // LEA R0 #5
        op.execute(&mut cpu).unwrap();
        assert_eq!(cpu.r[0].get(), 0x3006);
        assert_eq!(cpu.nzp(), (false, false, true), "flags untouched by default");
    }

    #[test]
    fn can_opt_into_setting_condition_codes() {
        let mut config = EmulatorConfig::default();
        config.lea_sets_condition_codes = true;
        let mut cpu = Cpu::new(config);
        cpu.pc.set(0x3001);
        let op = LeaOp::decode(Word::new(0b1110_000_000000101));
        op.execute(&mut cpu).unwrap();
        assert_eq!(cpu.nzp(), (false, false, true));
    }
}
