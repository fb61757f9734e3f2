//! Pass 1: lexes source line by line, building a symbol table and an
//! ordered syntax list (spec §4.7). Every error is collected rather than
//! aborting at the first one, so a caller sees the whole picture at once.

use std::collections::HashMap;

use super::ast::{Instruction, LineContent, SourceLine};
use super::lexer::{parse_literal, tokenize_line, Token};
use super::{AssembleError, OffsetRangeError, SymbolError, SyntaxError};
use crate::word::fits_signed;

/// Label → address, case-insensitive (spec §3).
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: HashMap<String, u16>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `addr`. Returns `false` if `name` was already bound
    /// (the caller turns that into a [`SyntaxError::DuplicateLabel`]).
    pub fn define(&mut self, name: &str, addr: u16) -> bool {
        self.symbols
            .insert(name.to_ascii_uppercase(), addr)
            .is_none()
    }

    pub fn lookup(&self, name: &str) -> Option<u16> {
        self.symbols.get(&name.to_ascii_uppercase()).copied()
    }

    /// `(addr(label) - pc) mod 2^n`, returned in the low `n` bits, when the
    /// signed delta fits `[-2^(n-1), 2^(n-1))` (spec §8's
    /// `symbols.offset(L, pc, n)` invariant). The `n = 1` boundary case
    /// (an Open Question in spec §9) resolves to `Ok(0)` only when
    /// `addr(label) == pc`, since 0 is the only value a signed 1-bit field
    /// can represent; any other delta at `n = 1` is out of range.
    pub fn offset(&self, label: &str, pc: u16, bits: u8) -> Result<u16, AssembleError> {
        let target = self.lookup(label).ok_or_else(|| {
            AssembleError::Symbol(SymbolError {
                name: label.to_string(),
            })
        })?;
        let delta = target as i32 - pc as i32;
        if bits == 1 {
            return if delta == 0 {
                Ok(0)
            } else {
                Err(out_of_range(delta, bits))
            };
        }
        if !fits_signed(delta, bits) {
            return Err(out_of_range(delta, bits));
        }
        Ok((delta as u16) & mask(bits))
    }
}

fn mask(bits: u8) -> u16 {
    (1u16 << bits) - 1
}

fn out_of_range(delta: i32, bits: u8) -> AssembleError {
    AssembleError::OffsetRange(OffsetRangeError {
        offset: delta as u16,
        range: 1u32 << bits,
    })
}

pub struct Parser;

impl Parser {
    /// Parse a whole source file, returning whatever symbol table and
    /// syntax list could be built plus every accumulated error.
    pub fn parse(source: &str) -> (SymbolTable, Vec<SourceLine>, Vec<SyntaxError>) {
        let mut symbols = SymbolTable::new();
        let mut lines = Vec::new();
        let mut errors = Vec::new();
        let mut pc: Option<u16> = None;

        for (idx, raw_line) in source.lines().enumerate() {
            let line_no = idx + 1;
            let tokens = match tokenize_line(raw_line, line_no) {
                Ok(t) => t,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            // Commas are only operand separators; nothing downstream cares
            // about their position once tokens are split into a keyword and
            // an operand list.
            let tokens: Vec<Token> = tokens.into_iter().filter(|t| *t != Token::Comma).collect();
            if tokens.is_empty() {
                continue;
            }

            let (label, rest) = split_label(&tokens);
            if rest.is_empty() {
                if let (Some(label), Some(addr)) = (&label, pc) {
                    if !symbols.define(label, addr) {
                        errors.push(SyntaxError::DuplicateLabel {
                            line: line_no,
                            name: label.clone(),
                        });
                    }
                }
                continue;
            }

            let keyword = match &rest[0] {
                Token::Word(w) => w.clone(),
                other => {
                    errors.push(SyntaxError::InvalidOpcode {
                        line: line_no,
                        text: format!("{other:?}"),
                    });
                    continue;
                }
            };
            let operands = &rest[1..];

            match build_content(&keyword, operands, line_no, &mut pc) {
                Ok(content) => {
                    let addr = pc.unwrap_or(0);
                    if let Some(label) = &label {
                        if !symbols.define(label, addr) {
                            errors.push(SyntaxError::DuplicateLabel {
                                line: line_no,
                                name: label.clone(),
                            });
                        }
                    }
                    let advance = content.word_count();
                    lines.push(SourceLine {
                        label,
                        content,
                        line: line_no,
                        addr,
                    });
                    if let Some(p) = pc.as_mut() {
                        *p = p.wrapping_add(advance);
                    }
                }
                Err(e) => errors.push(e),
            }
        }

        (symbols, lines, errors)
    }
}

fn split_label(tokens: &[Token]) -> (Option<String>, &[Token]) {
    match tokens.first() {
        Some(Token::Label(name)) => (Some(name.clone()), &tokens[1..]),
        Some(Token::Word(w)) if !is_keyword(w) => (Some(w.clone()), &tokens[1..]),
        _ => (None, tokens),
    }
}

fn is_keyword(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    if br_flags(&upper).is_some() {
        return true;
    }
    matches!(
        upper.as_str(),
        "ADD"
            | "AND"
            | "NOT"
            | "LD"
            | "LDI"
            | "LDR"
            | "LEA"
            | "ST"
            | "STI"
            | "STR"
            | "JMP"
            | "JSR"
            | "JSRR"
            | "RET"
            | "RTI"
            | "TRAP"
            | "GETC"
            | "OUT"
            | "PUTS"
            | "IN"
            | "PUTSP"
            | "HALT"
            | ".ORIG"
            | ".END"
            | ".FILL"
            | ".DW"
            | ".BLKW"
            | ".STRINGZ"
    )
}

fn br_flags(upper: &str) -> Option<(bool, bool, bool)> {
    if !upper.starts_with("BR") {
        return None;
    }
    let suffix = &upper[2..];
    if suffix.is_empty() {
        return Some((true, true, true));
    }
    let (mut n, mut z, mut p) = (false, false, false);
    for c in suffix.chars() {
        match c {
            'N' => n = true,
            'Z' => z = true,
            'P' => p = true,
            _ => return None,
        }
    }
    Some((n, z, p))
}

fn build_content(
    keyword: &str,
    operands: &[Token],
    line_no: usize,
    pc: &mut Option<u16>,
) -> Result<LineContent, SyntaxError> {
    let upper = keyword.to_ascii_uppercase();

    if upper == ".ORIG" {
        let lit = require_one_literal(operands, line_no, &upper)?;
        let addr = u16::try_from(lit).map_err(|_| SyntaxError::UnparseableLiteral {
            line: line_no,
            text: upper.clone(),
        })?;
        *pc = Some(addr);
        return Ok(LineContent::Orig(addr));
    }
    if upper == ".END" {
        require_operand_count(operands, 0, line_no, &upper)?;
        return Ok(LineContent::End);
    }
    if upper == ".FILL" || upper == ".DW" {
        require_operand_count(operands, 1, line_no, &upper)?;
        return Ok(match &operands[0] {
            Token::Immediate(v) => LineContent::FillImmediate(*v),
            Token::Word(w) => match parse_literal(w, line_no) {
                Ok(v) => LineContent::FillImmediate(v),
                Err(_) => LineContent::FillLabel(w.clone()),
            },
            _ => {
                return Err(SyntaxError::WrongOperandCount {
                    line: line_no,
                    mnemonic: upper,
                })
            }
        });
    }
    if upper == ".BLKW" {
        let lit = require_one_literal(operands, line_no, &upper)?;
        let n = u16::try_from(lit).map_err(|_| SyntaxError::UnparseableLiteral {
            line: line_no,
            text: upper.clone(),
        })?;
        return Ok(LineContent::Blkw(n));
    }
    if upper == ".STRINGZ" {
        require_operand_count(operands, 1, line_no, &upper)?;
        return Ok(match &operands[0] {
            Token::StringLit(s) => LineContent::Stringz(s.clone()),
            _ => {
                return Err(SyntaxError::WrongOperandCount {
                    line: line_no,
                    mnemonic: upper,
                })
            }
        });
    }

    build_instruction(&upper, operands, line_no).map(LineContent::Instruction)
}

fn build_instruction(
    upper: &str,
    operands: &[Token],
    line_no: usize,
) -> Result<Instruction, SyntaxError> {
    if let Some((n, z, p)) = br_flags(upper) {
        require_operand_count(operands, 1, line_no, upper)?;
        let label = as_symbol(&operands[0], line_no, upper)?;
        return Ok(Instruction::Br { n, z, p, label });
    }

    match upper {
        "ADD" | "AND" => {
            require_operand_count(operands, 3, line_no, upper)?;
            let dr = as_register(&operands[0], line_no, upper)?;
            let sr1 = as_register(&operands[1], line_no, upper)?;
            match &operands[2] {
                Token::Register(sr2) => Ok(if upper == "ADD" {
                    Instruction::AddReg { dr, sr1, sr2: *sr2 }
                } else {
                    Instruction::AndReg { dr, sr1, sr2: *sr2 }
                }),
                Token::Immediate(v) => Ok(if upper == "ADD" {
                    Instruction::AddImm { dr, sr1, imm5: *v }
                } else {
                    Instruction::AndImm { dr, sr1, imm5: *v }
                }),
                Token::Word(w) => match parse_literal(w, line_no) {
                    Ok(imm5) => Ok(if upper == "ADD" {
                        Instruction::AddImm { dr, sr1, imm5 }
                    } else {
                        Instruction::AndImm { dr, sr1, imm5 }
                    }),
                    Err(_) => Ok(if upper == "ADD" {
                        Instruction::AddImmLabel { dr, sr1, label: w.clone() }
                    } else {
                        Instruction::AndImmLabel { dr, sr1, label: w.clone() }
                    }),
                },
                _ => Err(SyntaxError::WrongOperandCount {
                    line: line_no,
                    mnemonic: upper.to_string(),
                }),
            }
        }
        "NOT" => {
            require_operand_count(operands, 2, line_no, upper)?;
            Ok(Instruction::Not {
                dr: as_register(&operands[0], line_no, upper)?,
                sr: as_register(&operands[1], line_no, upper)?,
            })
        }
        "LD" | "LDI" | "LEA" | "ST" | "STI" => {
            require_operand_count(operands, 2, line_no, upper)?;
            let r = as_register(&operands[0], line_no, upper)?;
            let label = as_symbol(&operands[1], line_no, upper)?;
            Ok(match upper {
                "LD" => Instruction::Ld { dr: r, label },
                "LDI" => Instruction::Ldi { dr: r, label },
                "LEA" => Instruction::Lea { dr: r, label },
                "ST" => Instruction::St { sr: r, label },
                _ => Instruction::Sti { sr: r, label },
            })
        }
        "LDR" | "STR" => {
            require_operand_count(operands, 3, line_no, upper)?;
            let r = as_register(&operands[0], line_no, upper)?;
            let base_r = as_register(&operands[1], line_no, upper)?;
            let offset6 = operand_as_literal(&operands[2], line_no, upper)?;
            Ok(if upper == "LDR" {
                Instruction::Ldr { dr: r, base_r, offset6 }
            } else {
                Instruction::Str { sr: r, base_r, offset6 }
            })
        }
        "JMP" => {
            require_operand_count(operands, 1, line_no, upper)?;
            Ok(Instruction::Jmp {
                base_r: as_register(&operands[0], line_no, upper)?,
            })
        }
        "RET" => {
            require_operand_count(operands, 0, line_no, upper)?;
            Ok(Instruction::Jmp { base_r: 7 })
        }
        "JSR" => {
            require_operand_count(operands, 1, line_no, upper)?;
            Ok(Instruction::Jsr {
                label: as_symbol(&operands[0], line_no, upper)?,
            })
        }
        "JSRR" => {
            require_operand_count(operands, 1, line_no, upper)?;
            Ok(Instruction::Jsrr {
                base_r: as_register(&operands[0], line_no, upper)?,
            })
        }
        "RTI" => {
            require_operand_count(operands, 0, line_no, upper)?;
            Ok(Instruction::Rti)
        }
        "TRAP" => {
            let lit = require_one_literal(operands, line_no, upper)?;
            let vector = u8::try_from(lit).map_err(|_| SyntaxError::UnparseableLiteral {
                line: line_no,
                text: upper.to_string(),
            })?;
            Ok(Instruction::Trap { trapvect8: vector })
        }
        "GETC" => trap_pseudo(operands, line_no, upper, 0x20),
        "OUT" => trap_pseudo(operands, line_no, upper, 0x21),
        "PUTS" => trap_pseudo(operands, line_no, upper, 0x22),
        "IN" => trap_pseudo(operands, line_no, upper, 0x23),
        "PUTSP" => trap_pseudo(operands, line_no, upper, 0x24),
        "HALT" => trap_pseudo(operands, line_no, upper, 0x25),
        _ => Err(SyntaxError::InvalidOpcode {
            line: line_no,
            text: upper.to_string(),
        }),
    }
}

fn trap_pseudo(
    operands: &[Token],
    line_no: usize,
    mnemonic: &str,
    vector: u8,
) -> Result<Instruction, SyntaxError> {
    require_operand_count(operands, 0, line_no, mnemonic)?;
    Ok(Instruction::Trap { trapvect8: vector })
}

fn require_operand_count(
    operands: &[Token],
    n: usize,
    line_no: usize,
    mnemonic: &str,
) -> Result<(), SyntaxError> {
    if operands.len() != n {
        return Err(SyntaxError::WrongOperandCount {
            line: line_no,
            mnemonic: mnemonic.to_string(),
        });
    }
    Ok(())
}

fn require_one_literal(operands: &[Token], line_no: usize, mnemonic: &str) -> Result<i32, SyntaxError> {
    require_operand_count(operands, 1, line_no, mnemonic)?;
    operand_as_literal(&operands[0], line_no, mnemonic)
}

fn as_register(tok: &Token, line_no: usize, mnemonic: &str) -> Result<u8, SyntaxError> {
    match tok {
        Token::Register(r) => Ok(*r),
        _ => Err(SyntaxError::WrongOperandCount {
            line: line_no,
            mnemonic: mnemonic.to_string(),
        }),
    }
}

fn as_symbol(tok: &Token, line_no: usize, mnemonic: &str) -> Result<String, SyntaxError> {
    match tok {
        Token::Word(w) => Ok(w.clone()),
        _ => Err(SyntaxError::WrongOperandCount {
            line: line_no,
            mnemonic: mnemonic.to_string(),
        }),
    }
}

fn operand_as_literal(tok: &Token, line_no: usize, mnemonic: &str) -> Result<i32, SyntaxError> {
    match tok {
        Token::Immediate(v) => Ok(*v),
        Token::Word(w) => parse_literal(w, line_no),
        _ => Err(SyntaxError::WrongOperandCount {
            line: line_no,
            mnemonic: mnemonic.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_program_and_builds_symbol_table() {
        let (symbols, lines, errors) = Parser::parse(".ORIG x3000\nLOOP AND R3,R4,R6\nBR LOOP\n.END\n");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(symbols.lookup("LOOP"), Some(0x3001));
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].content, LineContent::Orig(0x3000));
        assert_eq!(lines[3].content, LineContent::End);
    }

    #[test]
    fn duplicate_label_is_reported_but_parsing_continues() {
        let (_, lines, errors) = Parser::parse(".ORIG x3000\nA AND R0,R0,#0\nA AND R1,R1,#0\n.END\n");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], SyntaxError::DuplicateLabel { .. }));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn stringz_directive_tracks_word_count() {
        let (_, lines, errors) = Parser::parse(".ORIG x3000\n.STRINGZ \"Hi\"\n.END\n");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(lines[1].content, LineContent::Stringz("Hi".into()));
        assert_eq!(lines[1].content.word_count(), 3);
    }

    #[test]
    fn pseudo_ops_desugar_to_trap_and_jmp() {
        let (_, lines, errors) = Parser::parse(".ORIG x3000\nGETC\nHALT\nRET\n.END\n");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(
            lines[1].content,
            LineContent::Instruction(Instruction::Trap { trapvect8: 0x20 })
        );
        assert_eq!(
            lines[2].content,
            LineContent::Instruction(Instruction::Trap { trapvect8: 0x25 })
        );
        assert_eq!(
            lines[3].content,
            LineContent::Instruction(Instruction::Jmp { base_r: 7 })
        );
    }

    #[test]
    fn symbol_offset_matches_spec_scenario_two() {
        let mut symbols = SymbolTable::new();
        symbols.define("LABEL", 0x3007);
        assert_eq!(symbols.offset("LABEL", 0x3000, 5).unwrap(), 7);
    }

    #[test]
    fn and_with_symbolic_third_operand_desugars_to_label_variant() {
        let (_, lines, errors) = Parser::parse(".ORIG x3000\nAND R0,R7,LABEL\nLABEL AND R0,R0,#0\n.END\n");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(
            lines[1].content,
            LineContent::Instruction(Instruction::AndImmLabel {
                dr: 0,
                sr1: 7,
                label: "LABEL".into()
            })
        );
    }

    #[test]
    fn symbol_offset_out_of_range_matches_spec_scenario_three() {
        let mut symbols = SymbolTable::new();
        symbols.define("LONG", 0x0000);
        let err = symbols.offset("LONG", 0x3000, 9).unwrap_err();
        assert_eq!(
            err,
            AssembleError::OffsetRange(OffsetRangeError {
                offset: 0xD000,
                range: 512
            })
        );
    }

    #[test]
    fn one_bit_offset_boundary_allows_only_zero_delta() {
        let mut symbols = SymbolTable::new();
        symbols.define("HERE", 0x3000);
        assert_eq!(symbols.offset("HERE", 0x3000, 1).unwrap(), 0);
        symbols.define("THERE", 0x3001);
        assert!(symbols.offset("THERE", 0x3000, 1).is_err());
    }
}
