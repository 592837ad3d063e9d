//! Operator glyph tokenizing, shared by the assembler's lexer.
//!
//! The operator table itself (glyph <-> opcode, version-keyed) lives in
//! `version::OPERATOR_GLYPHS`; this module only adds the longest-match
//! rule needed to split a raw character stream into glyphs (`==` must
//! not be read as two `=` tokens, etc).

use crate::version::OPERATOR_GLYPHS;

/// Attempts to match the longest operator glyph at the start of `input`,
/// returning the matched glyph and its byte length.
pub fn match_operator(input: &str) -> Option<(&'static str, usize)> {
    let mut best: Option<&'static str> = None;
    for &glyph in OPERATOR_GLYPHS {
        if input.starts_with(glyph) && best.map(|b| glyph.len() > b.len()).unwrap_or(true) {
            best = Some(glyph);
        }
    }
    best.map(|g| (g, g.len()))
}

/// Operators that may appear in unary position (`++x`, `--x`, or the
/// textual `x++`/`x--` rendering handled in `instr::assignment`).
pub fn is_increment_glyph(glyph: &str) -> bool {
    glyph == "++" || glyph == "--"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_match_wins_over_prefix() {
        assert_eq!(match_operator("=="), Some(("==", 2)));
        assert_eq!(match_operator(">=x"), Some((">=", 2)));
        assert_eq!(match_operator(">x"), Some((">", 1)));
    }

    #[test]
    fn no_match_returns_none() {
        assert_eq!(match_operator("x"), None);
    }
}
