//! Tokenizes a single line of source text.
//!
//! Grounded on `adhirajagarwala-lc3-assembler`'s lexer, simplified to a
//! line-oriented scanner: the parser resolves labels and mnemonics line by
//! line rather than off a whole-file token stream.

use super::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A bare word: mnemonic, directive (dot-prefixed), or symbol reference.
    /// The parser disambiguates by position and by matching against the
    /// known mnemonic/directive set.
    Word(String),
    /// An explicitly colon-terminated label.
    Label(String),
    Register(u8),
    Immediate(i32),
    StringLit(String),
    Comma,
}

/// Tokenize one line, after stripping any `;` comment.
pub fn tokenize_line(line: &str, line_no: usize) -> Result<Vec<Token>, SyntaxError> {
    let code = strip_comment(line);
    let chars: Vec<char> = code.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == ',' {
            tokens.push(Token::Comma);
            i += 1;
            continue;
        }
        if c == '"' {
            let (lit, consumed) = read_string(&chars[i..], line_no)?;
            tokens.push(Token::StringLit(lit));
            i += consumed;
            continue;
        }
        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() && chars[i] != ',' {
            i += 1;
        }
        let word: String = chars[start..i].iter().collect();
        tokens.push(classify_word(&word, line_no)?);
    }
    Ok(tokens)
}

fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    for (idx, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            ';' if !in_string => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn read_string(chars: &[char], line_no: usize) -> Result<(String, usize), SyntaxError> {
    let mut out = String::new();
    let mut i = 1; // skip opening quote
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((out, i + 1)),
            '\\' if i + 1 < chars.len() && chars[i + 1] == '"' => {
                out.push('"');
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(SyntaxError::UnterminatedString { line: line_no })
}

fn classify_word(word: &str, line_no: usize) -> Result<Token, SyntaxError> {
    if let Some(stripped) = word.strip_suffix(':') {
        return Ok(Token::Label(stripped.to_string()));
    }
    if let Some(reg) = parse_register(word) {
        return Ok(Token::Register(reg));
    }
    if let Some(rest) = word.strip_prefix('#') {
        return Ok(Token::Immediate(parse_literal(rest, line_no)?));
    }
    Ok(Token::Word(word.to_string()))
}

fn parse_register(word: &str) -> Option<u8> {
    let bytes = word.as_bytes();
    if bytes.len() == 2 && (bytes[0] == b'R' || bytes[0] == b'r') && bytes[1].is_ascii_digit() {
        let n = bytes[1] - b'0';
        if n <= 7 {
            return Some(n);
        }
    }
    None
}

/// Parse a bare numeric literal (no leading `#`): `[-]decimal`,
/// `[-]x<hex>`, `[-]o<octal>`, `[-]b<binary>`; underscores allowed as digit
/// separators (spec §6 grammar).
pub fn parse_literal(word: &str, line_no: usize) -> Result<i32, SyntaxError> {
    let (negative, rest) = match word.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, word),
    };
    let cleaned: String = rest.chars().filter(|c| *c != '_').collect();
    let err = || SyntaxError::UnparseableLiteral {
        line: line_no,
        text: word.to_string(),
    };
    let mut chars = cleaned.chars();
    let value = match chars.next() {
        Some('x') | Some('X') => i64::from_str_radix(chars.as_str(), 16),
        Some('o') | Some('O') => i64::from_str_radix(chars.as_str(), 8),
        Some('b') | Some('B') => i64::from_str_radix(chars.as_str(), 2),
        _ => cleaned.parse::<i64>(),
    }
    .map_err(|_| err())?;
    let value = if negative { -value } else { value };
    i32::try_from(value).map_err(|_| err())
}
