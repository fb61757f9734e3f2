use std::fmt;

use super::{Cpu, MachineFault, Op};
use crate::word::{BitAddressable, Word};

/// `STI`: `mem[mem[PC + sext(PCoffset9)]] <- SR`.
#[derive(Debug, Clone, Copy)]
pub struct StiOp {
    pub sr: u8,
    pub pc_offset9: i16,
}

impl StiOp {
    pub fn decode(ir: Word) -> Self {
        Self {
            sr: ir.range(11..9).get() as u8,
            pc_offset9: ir.range(8..0).sign_extend(8).as_i16(),
        }
    }
}

impl Op for StiOp {
    fn execute(&self, cpu: &mut Cpu) -> Result<(), MachineFault> {
        let pointer_addr = cpu.pc.get().wrapping_add(self.pc_offset9 as u16);
        let indirect_addr = cpu.mem_load(pointer_addr)?.get();
        let value = cpu.r[self.sr as usize];
        cpu.mem_store(indirect_addr, value)
    }
}

impl fmt::Display for StiOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "STI R{}, #{}", self.sr, self.pc_offset9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;
    use crate::memory::PrivilegeLevel;

    #[test]
    fn stores_through_pointer() {
        let mut cpu = Cpu::new(EmulatorConfig::default());
        cpu.pc.set(0x3001);
        cpu.r[0].set(0x55AA);
        cpu.memory_mut()
            .store(0x3006, Word::new(0x4000), PrivilegeLevel::System)
            .unwrap();
        let op = StiOp::decode(Word::new(0b1011_000_000000101)); // STI R0 #5
        op.execute(&mut cpu).unwrap();
        assert_eq!(
            cpu.memory_mut()
                .load(0x4000, PrivilegeLevel::System)
                .unwrap()
                .get(),
            0x55AA
        );
    }
}
