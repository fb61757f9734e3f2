//! A minimal system image: the six textbook trap handlers (spec §4.9).
//!
//! Each routine is built as a sequence of [`crate::assembler::ast::Instruction`]
//! values run through the assembler's own generator (pass 2), rather than
//! re-parsed assembly text, and installed via [`crate::loader::Loader`] with
//! its vector-table entry wired the same way a user program's `.ORIG`ed code
//! would be. Grounded on the textbook's `lc3os.asm` canonical routine
//! shapes: `GETC`/`OUT` poll a device register dereferenced through a
//! `.FILL`ed pointer word (so the PC-relative range of `LDI`/`STI` never
//! matters), and the higher-level routines (`PUTS`, `IN`, `PUTSP`, `HALT`)
//! call the others via `TRAP` rather than duplicating their bodies.

use thiserror::Error;

use crate::assembler::ast::{Instruction, LineContent, SourceLine};
use crate::assembler::{AssembleError, Generator, SymbolTable};
use crate::cpu::{Cpu, TRAP_VECTOR_BASE};
use crate::devices::control::MCR_ADDR;
use crate::devices::{DDR_ADDR, DSR_ADDR, KBDR_ADDR, KBSR_ADDR};
use crate::loader::{LoadError, Loader, ObjectCode};

/// x20
pub const TRAP_GETC: u8 = 0x20;
/// x21
pub const TRAP_OUT: u8 = 0x21;
/// x22
pub const TRAP_PUTS: u8 = 0x22;
/// x23
pub const TRAP_IN: u8 = 0x23;
/// x24
pub const TRAP_PUTSP: u8 = 0x24;
/// x25
pub const TRAP_HALT: u8 = 0x25;

// Generously spaced (each routine is well under 0x80 words, PUTSP's
// unrolled byte extraction being the largest) so none can collide.
const GETC_BASE: u16 = 0x0300;
const OUT_BASE: u16 = 0x0380;
const PUTS_BASE: u16 = 0x0400;
const IN_BASE: u16 = 0x0480;
const PUTSP_BASE: u16 = 0x0500;
const HALT_BASE: u16 = 0x0600;

#[derive(Debug, Error)]
pub enum BiosError {
    #[error("internal error assembling a trap routine: {0}")]
    Assemble(#[from] AssembleError),
    #[error("failed to install a trap routine: {0}")]
    Load(#[from] LoadError),
}

/// The assembled trap routines, keyed by the vector they install under.
pub struct SystemImage {
    routines: Vec<(u8, ObjectCode)>,
}

impl SystemImage {
    /// Build the full set of textbook trap routines.
    pub fn build() -> Result<Self, BiosError> {
        let routines = vec![
            (TRAP_GETC, assemble_routine(GETC_BASE, getc_routine())?),
            (TRAP_OUT, assemble_routine(OUT_BASE, out_routine())?),
            (TRAP_PUTS, assemble_routine(PUTS_BASE, puts_routine())?),
            (TRAP_IN, assemble_routine(IN_BASE, in_routine())?),
            (TRAP_PUTSP, assemble_routine(PUTSP_BASE, putsp_routine())?),
            (TRAP_HALT, assemble_routine(HALT_BASE, halt_routine())?),
        ];
        Ok(Self { routines })
    }

    /// Install every routine into `cpu`'s memory and wire its trap vector.
    pub fn load_image(&self, cpu: &mut Cpu) -> Result<(), BiosError> {
        let mut loader = Loader::new(cpu.memory_mut());
        for (vector, obj) in &self.routines {
            let vector_addr = TRAP_VECTOR_BASE + *vector as u16;
            loader.load_vector(vector_addr, obj)?;
        }
        Ok(())
    }
}

enum RoutineLine {
    Instruction(Instruction),
    Fill(i32),
    Stringz(String),
}

impl RoutineLine {
    fn word_count(&self) -> u16 {
        match self {
            RoutineLine::Instruction(_) | RoutineLine::Fill(_) => 1,
            RoutineLine::Stringz(s) => s.chars().count() as u16 + 1,
        }
    }
}

type Entry = (Option<String>, RoutineLine);

fn instr(i: Instruction) -> RoutineLine {
    RoutineLine::Instruction(i)
}

fn assemble_routine(base: u16, entries: Vec<Entry>) -> Result<ObjectCode, AssembleError> {
    let mut symbols = SymbolTable::new();
    let mut addr = base;
    for (label, line) in &entries {
        if let Some(name) = label {
            symbols.define(name, addr);
        }
        addr = addr.wrapping_add(line.word_count());
    }

    let mut lines = vec![SourceLine {
        label: None,
        content: LineContent::Orig(base),
        line: 0,
        addr: base,
    }];
    addr = base;
    for (i, (_, line)) in entries.into_iter().enumerate() {
        let content = match line {
            RoutineLine::Instruction(instr) => LineContent::Instruction(instr),
            RoutineLine::Fill(v) => LineContent::FillImmediate(v),
            RoutineLine::Stringz(s) => LineContent::Stringz(s),
        };
        let word_count = content.word_count();
        lines.push(SourceLine {
            label: None,
            content,
            line: i + 1,
            addr,
        });
        addr = addr.wrapping_add(word_count);
    }

    Generator::new(&lines).generate(&symbols)
}

/// Unrolled MSB-first bit extraction: shifts `working` left one bit per
/// iteration and tests the bit it exposes (the top bit, refreshed via a
/// no-op `ADD working, working, #0` before each shift) to rebuild it, high
/// bit first, in `accum`. LC-3 has no shift-right instruction, so this is
/// the textbook way to pull a byte out of the top half of a word.
fn push_extract_high_byte(entries: &mut Vec<Entry>, label_prefix: &str, working: u8, accum: u8) {
    for i in 0..8 {
        let skip = format!("{label_prefix}_SKIP{i}");
        entries.push((
            None,
            instr(Instruction::AddReg { dr: accum, sr1: accum, sr2: accum }),
        ));
        entries.push((
            None,
            instr(Instruction::AddImm { dr: working, sr1: working, imm5: 0 }),
        ));
        entries.push((
            None,
            instr(Instruction::Br { n: false, z: true, p: true, label: skip.clone() }),
        ));
        entries.push((None, instr(Instruction::AddImm { dr: accum, sr1: accum, imm5: 1 })));
        entries.push((
            Some(skip),
            instr(Instruction::AddReg { dr: working, sr1: working, sr2: working }),
        ));
    }
}

fn getc_routine() -> Vec<Entry> {
    vec![
        (
            Some("GETC".into()),
            instr(Instruction::Ldi { dr: 0, label: "GETC_KBSR_PTR".into() }),
        ),
        (
            None,
            instr(Instruction::Br { n: false, z: true, p: true, label: "GETC".into() }),
        ),
        (None, instr(Instruction::Ldi { dr: 0, label: "GETC_KBDR_PTR".into() })),
        (None, instr(Instruction::Rti)),
        (Some("GETC_KBSR_PTR".into()), RoutineLine::Fill(KBSR_ADDR as i32)),
        (Some("GETC_KBDR_PTR".into()), RoutineLine::Fill(KBDR_ADDR as i32)),
    ]
}

fn out_routine() -> Vec<Entry> {
    vec![
        (Some("OUT".into()), instr(Instruction::St { sr: 1, label: "OUT_R1".into() })),
        (
            Some("OUT_POLL".into()),
            instr(Instruction::Ldi { dr: 1, label: "OUT_DSR_PTR".into() }),
        ),
        (
            None,
            instr(Instruction::Br { n: false, z: true, p: true, label: "OUT_POLL".into() }),
        ),
        (None, instr(Instruction::Sti { sr: 0, label: "OUT_DDR_PTR".into() })),
        (None, instr(Instruction::Ld { dr: 1, label: "OUT_R1".into() })),
        (None, instr(Instruction::Rti)),
        (Some("OUT_DSR_PTR".into()), RoutineLine::Fill(DSR_ADDR as i32)),
        (Some("OUT_DDR_PTR".into()), RoutineLine::Fill(DDR_ADDR as i32)),
        (Some("OUT_R1".into()), RoutineLine::Fill(0)),
    ]
}

fn puts_routine() -> Vec<Entry> {
    vec![
        (Some("PUTS".into()), instr(Instruction::St { sr: 1, label: "PUTS_R1".into() })),
        (None, instr(Instruction::St { sr: 2, label: "PUTS_R2".into() })),
        (None, instr(Instruction::AddImm { dr: 2, sr1: 0, imm5: 0 })),
        (
            Some("PUTS_LOOP".into()),
            instr(Instruction::Ldr { dr: 0, base_r: 2, offset6: 0 }),
        ),
        (
            None,
            instr(Instruction::Br { n: false, z: true, p: false, label: "PUTS_DONE".into() }),
        ),
        (None, instr(Instruction::Trap { trapvect8: TRAP_OUT })),
        (None, instr(Instruction::AddImm { dr: 2, sr1: 2, imm5: 1 })),
        (
            None,
            instr(Instruction::Br { n: true, z: true, p: true, label: "PUTS_LOOP".into() }),
        ),
        (Some("PUTS_DONE".into()), instr(Instruction::Ld { dr: 1, label: "PUTS_R1".into() })),
        (None, instr(Instruction::Ld { dr: 2, label: "PUTS_R2".into() })),
        (None, instr(Instruction::Rti)),
        (Some("PUTS_R1".into()), RoutineLine::Fill(0)),
        (Some("PUTS_R2".into()), RoutineLine::Fill(0)),
    ]
}

fn in_routine() -> Vec<Entry> {
    vec![
        (Some("IN".into()), instr(Instruction::St { sr: 1, label: "IN_R1".into() })),
        (None, instr(Instruction::Lea { dr: 0, label: "IN_PROMPT".into() })),
        (None, instr(Instruction::Trap { trapvect8: TRAP_PUTS })),
        (None, instr(Instruction::Trap { trapvect8: TRAP_GETC })),
        (None, instr(Instruction::Trap { trapvect8: TRAP_OUT })),
        (None, instr(Instruction::Ld { dr: 1, label: "IN_R1".into() })),
        (None, instr(Instruction::Rti)),
        (
            Some("IN_PROMPT".into()),
            RoutineLine::Stringz("Input a character> ".into()),
        ),
        (Some("IN_R1".into()), RoutineLine::Fill(0)),
    ]
}

fn putsp_routine() -> Vec<Entry> {
    let mut entries = vec![
        (Some("PUTSP".into()), instr(Instruction::St { sr: 1, label: "PUTSP_R1".into() })),
        (None, instr(Instruction::St { sr: 2, label: "PUTSP_R2".into() })),
        (None, instr(Instruction::St { sr: 3, label: "PUTSP_R3".into() })),
        (None, instr(Instruction::St { sr: 4, label: "PUTSP_R4".into() })),
        (None, instr(Instruction::AddImm { dr: 2, sr1: 0, imm5: 0 })),
        (
            Some("PUTSP_LOOP".into()),
            instr(Instruction::Ldr { dr: 3, base_r: 2, offset6: 0 }),
        ),
        (
            None,
            instr(Instruction::Br { n: false, z: true, p: false, label: "PUTSP_DONE".into() }),
        ),
        // low byte: the device only looks at the low 8 bits, so no masking needed.
        (None, instr(Instruction::AddImm { dr: 0, sr1: 3, imm5: 0 })),
        (None, instr(Instruction::Trap { trapvect8: TRAP_OUT })),
        // high byte, extracted bit by bit into R4, with R1 as the working copy.
        (None, instr(Instruction::AndImm { dr: 4, sr1: 4, imm5: 0 })),
        (None, instr(Instruction::AddImm { dr: 1, sr1: 3, imm5: 0 })),
    ];
    push_extract_high_byte(&mut entries, "PUTSP_HI", 1, 4);
    entries.extend([
        (
            None,
            instr(Instruction::Br { n: false, z: true, p: false, label: "PUTSP_NEXT".into() }),
        ),
        (None, instr(Instruction::AddImm { dr: 0, sr1: 4, imm5: 0 })),
        (None, instr(Instruction::Trap { trapvect8: TRAP_OUT })),
        (Some("PUTSP_NEXT".into()), instr(Instruction::AddImm { dr: 2, sr1: 2, imm5: 1 })),
        (
            None,
            instr(Instruction::Br { n: true, z: true, p: true, label: "PUTSP_LOOP".into() }),
        ),
        (Some("PUTSP_DONE".into()), instr(Instruction::Ld { dr: 1, label: "PUTSP_R1".into() })),
        (None, instr(Instruction::Ld { dr: 2, label: "PUTSP_R2".into() })),
        (None, instr(Instruction::Ld { dr: 3, label: "PUTSP_R3".into() })),
        (None, instr(Instruction::Ld { dr: 4, label: "PUTSP_R4".into() })),
        (None, instr(Instruction::Rti)),
        (Some("PUTSP_R1".into()), RoutineLine::Fill(0)),
        (Some("PUTSP_R2".into()), RoutineLine::Fill(0)),
        (Some("PUTSP_R3".into()), RoutineLine::Fill(0)),
        (Some("PUTSP_R4".into()), RoutineLine::Fill(0)),
    ]);
    entries
}

fn halt_routine() -> Vec<Entry> {
    vec![
        (Some("HALT".into()), instr(Instruction::Lea { dr: 0, label: "HALT_MSG".into() })),
        (None, instr(Instruction::Trap { trapvect8: TRAP_PUTS })),
        (None, instr(Instruction::AndImm { dr: 1, sr1: 1, imm5: 0 })),
        (None, instr(Instruction::Sti { sr: 1, label: "HALT_MCR_PTR".into() })),
        (None, instr(Instruction::Rti)),
        (
            Some("HALT_MSG".into()),
            RoutineLine::Stringz("\n\nMACHINE HALTED!\n".into()),
        ),
        (Some("HALT_MCR_PTR".into()), RoutineLine::Fill(MCR_ADDR as i32)),
    ]
}
