//! Tokenizer for CKSM body and HKSM header text.
//!
//! Strips `//` comments, splits on whitespace/punctuation, and recognizes
//! operator glyphs via `instr::operator::match_operator` so multi-character
//! glyphs (`==`, `>=`, `&&`, …) aren't split into single characters.

use anyhow::{bail, Result};

use crate::instr::operator::match_operator;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i32),
    Hex(u32),
    Float(f32),
    Str(String),
    Op(String),
    Punct(char),
    Arrow,
    Eq,
}

/// Strips `//` line comments and splits into tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut out = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '-' && chars.get(i + 1) == Some(&'>') {
            out.push(Token::Arrow);
            i += 2;
            continue;
        }
        if c == '"' {
            let (s, consumed) = read_string(&chars[i..])?;
            out.push(Token::Str(s));
            i += consumed;
            continue;
        }
        if c == '0' && matches!(chars.get(i + 1), Some('x') | Some('X')) {
            let start = i;
            i += 2;
            while i < chars.len() && chars[i].is_ascii_hexdigit() {
                i += 1;
            }
            let digits: String = chars[start + 2..i].iter().collect();
            out.push(Token::Hex(u32::from_str_radix(&digits, 16)?));
            continue;
        }
        if c == '.' && chars.get(i + 1) == Some(&'.') && chars.get(i + 2) == Some(&'.') {
            out.push(Token::Op("...".to_string()));
            i += 3;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            let mut is_float = false;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                if chars[i] == '.' {
                    is_float = true;
                }
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if is_float {
                out.push(Token::Float(text.parse()?));
            } else {
                out.push(Token::Int(text.parse()?));
            }
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            out.push(match text.as_str() {
                "true" | "false" => Token::Ident(text),
                _ => Token::Ident(text),
            });
            continue;
        }
        if "(){}[],:;".contains(c) {
            out.push(Token::Punct(c));
            i += 1;
            continue;
        }
        if c == '=' && chars.get(i + 1) != Some(&'=') {
            out.push(Token::Eq);
            i += 1;
            continue;
        }
        let rest: String = chars[i..].iter().collect();
        if let Some((glyph, len)) = match_operator(&rest) {
            out.push(Token::Op(glyph.to_string()));
            i += len;
            continue;
        }
        bail!("unexpected character {c:?} at byte offset {i}");
    }
    Ok(out)
}

fn read_string(chars: &[char]) -> Result<(String, usize)> {
    let mut out = String::new();
    let mut i = 1; // skip opening quote
    loop {
        let Some(&c) = chars.get(i) else { bail!("unterminated string literal") };
        match c {
            '"' => {
                i += 1;
                break;
            }
            '\\' => {
                let next = *chars.get(i + 1).ok_or_else(|| anyhow::anyhow!("dangling escape in string literal"))?;
                out.push(match next {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    '\\' => '\\',
                    '"' => '"',
                    other => other,
                });
                i += 2;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    Ok((out, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_assignment_statement() {
        let tokens = tokenize("x = 5 + 2;").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("x".to_string()),
                Token::Eq,
                Token::Int(5),
                Token::Op("+".to_string()),
                Token::Int(2),
                Token::Punct(';'),
            ]
        );
    }

    #[test]
    fn strips_line_comments() {
        let tokens = tokenize("noop; // trailing comment\nreturn;").unwrap();
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn reads_multi_char_operators_greedily() {
        let tokens = tokenize("a >= b").unwrap();
        assert_eq!(tokens[1], Token::Op(">=".to_string()));
    }

    #[test]
    fn reads_escaped_string() {
        let tokens = tokenize("\"a\\\"b\\nc\"").unwrap();
        assert_eq!(tokens[0], Token::Str("a\"b\nc".to_string()));
    }

    #[test]
    fn reads_case_range_ellipsis() {
        let tokens = tokenize("case 1 ... 5:").unwrap();
        assert_eq!(tokens[2], Token::Op("...".to_string()));
    }
}
