//! Pass 2: lays out object code from a parsed source list, per spec §4.8.
//!
//! Grounded on `twe4ked-lc3`'s `src/process.rs` for the per-opcode bit
//! layout; fatal-on-first-error, unlike the parser's accumulate-everything
//! pass 1 (spec §7), since a wrong symbol or out-of-range field makes every
//! later address in the image suspect.

use super::ast::{Instruction, LineContent, SourceLine};
use super::parser::SymbolTable;
use super::{AssembleError, RegisterError};
use crate::loader::ObjectCode;
use crate::word::fits_signed;

pub struct Generator<'a> {
    lines: &'a [SourceLine],
}

impl<'a> Generator<'a> {
    pub fn new(lines: &'a [SourceLine]) -> Self {
        Self { lines }
    }

    pub fn generate(&self, symbols: &SymbolTable) -> Result<ObjectCode, AssembleError> {
        let Some(first) = self.lines.first() else {
            return Err(AssembleError::MissingOrig);
        };
        let LineContent::Orig(orig) = first.content else {
            return Err(AssembleError::MissingOrig);
        };

        let mut words = Vec::new();
        for line in &self.lines[1..] {
            if let LineContent::Orig(_) = line.content {
                return Err(AssembleError::MisplacedOrig { line: line.line });
            }
            emit(line, symbols, &mut words)?;
        }

        Ok(ObjectCode::new(orig, words))
    }
}

fn emit(line: &SourceLine, symbols: &SymbolTable, words: &mut Vec<u16>) -> Result<(), AssembleError> {
    match &line.content {
        LineContent::Empty | LineContent::Orig(_) | LineContent::End => {}
        LineContent::FillImmediate(v) => words.push(*v as u16),
        LineContent::FillLabel(label) => {
            let addr = symbols
                .lookup(label)
                .ok_or_else(|| AssembleError::Symbol(super::SymbolError { name: label.clone() }))?;
            words.push(addr);
        }
        LineContent::Blkw(n) => words.extend(std::iter::repeat(0u16).take(*n as usize)),
        LineContent::Stringz(s) => {
            words.extend(s.chars().map(|c| c as u16));
            words.push(0);
        }
        LineContent::Instruction(instr) => {
            // Every instruction is one word; the PC at fetch time has
            // already moved past it (spec §4.3's incremented-PC rule).
            let pc = line.addr.wrapping_add(1);
            words.push(encode(instr, pc, symbols)?);
        }
    }
    Ok(())
}

fn reg(r: u8) -> Result<u16, AssembleError> {
    if r > 7 {
        return Err(AssembleError::Register(RegisterError { register: r }));
    }
    Ok(r as u16)
}

fn offset_bits(value: i32, bits: u8) -> Result<u16, AssembleError> {
    if !fits_signed(value, bits) {
        return Err(AssembleError::OffsetRange(super::OffsetRangeError {
            offset: value as u16,
            range: 1u32 << bits,
        }));
    }
    Ok((value as u16) & ((1u16 << bits) - 1))
}

fn encode(instr: &Instruction, pc: u16, symbols: &SymbolTable) -> Result<u16, AssembleError> {
    Ok(match *instr {
        Instruction::AddReg { dr, sr1, sr2 } => {
            0x1000 | (reg(dr)? << 9) | (reg(sr1)? << 6) | reg(sr2)?
        }
        Instruction::AddImm { dr, sr1, imm5 } => {
            0x1000 | (reg(dr)? << 9) | (reg(sr1)? << 6) | 0x20 | offset_bits(imm5, 5)?
        }
        Instruction::AddImmLabel { dr, sr1, ref label } => {
            0x1000 | (reg(dr)? << 9) | (reg(sr1)? << 6) | 0x20 | symbols.offset(label, pc, 5)?
        }
        Instruction::AndReg { dr, sr1, sr2 } => {
            0x5000 | (reg(dr)? << 9) | (reg(sr1)? << 6) | reg(sr2)?
        }
        Instruction::AndImm { dr, sr1, imm5 } => {
            0x5000 | (reg(dr)? << 9) | (reg(sr1)? << 6) | 0x20 | offset_bits(imm5, 5)?
        }
        Instruction::AndImmLabel { dr, sr1, ref label } => {
            0x5000 | (reg(dr)? << 9) | (reg(sr1)? << 6) | 0x20 | symbols.offset(label, pc, 5)?
        }
        Instruction::Not { dr, sr } => 0x9000 | (reg(dr)? << 9) | (reg(sr)? << 6) | 0x3F,
        Instruction::Ld { dr, ref label } => {
            0x2000 | (reg(dr)? << 9) | symbols.offset(label, pc, 9)?
        }
        Instruction::Ldi { dr, ref label } => {
            0xA000 | (reg(dr)? << 9) | symbols.offset(label, pc, 9)?
        }
        Instruction::Ldr { dr, base_r, offset6 } => {
            0x6000 | (reg(dr)? << 9) | (reg(base_r)? << 6) | offset_bits(offset6, 6)?
        }
        Instruction::Lea { dr, ref label } => {
            0xE000 | (reg(dr)? << 9) | symbols.offset(label, pc, 9)?
        }
        Instruction::St { sr, ref label } => {
            0x3000 | (reg(sr)? << 9) | symbols.offset(label, pc, 9)?
        }
        Instruction::Sti { sr, ref label } => {
            0xB000 | (reg(sr)? << 9) | symbols.offset(label, pc, 9)?
        }
        Instruction::Str { sr, base_r, offset6 } => {
            0x7000 | (reg(sr)? << 9) | (reg(base_r)? << 6) | offset_bits(offset6, 6)?
        }
        Instruction::Br { n, z, p, ref label } => {
            let flags = ((n as u16) << 11) | ((z as u16) << 10) | ((p as u16) << 9);
            flags | symbols.offset(label, pc, 9)?
        }
        Instruction::Jmp { base_r } => 0xC000 | (reg(base_r)? << 6),
        Instruction::Jsr { ref label } => 0x4800 | symbols.offset(label, pc, 11)?,
        Instruction::Jsrr { base_r } => 0x4000 | (reg(base_r)? << 6),
        Instruction::Rti => 0x8000,
        Instruction::Trap { trapvect8 } => 0xF000 | trapvect8 as u16,
    })
}
