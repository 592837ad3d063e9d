//! A single error taxonomy shared by both passes, surfaced through
//! `anyhow::Result` everywhere rather than a `thiserror` hierarchy — the
//! teacher crate never reaches for one either.

use std::fmt;

/// The three documented fatal error families. Warnings (unknown opcode
/// during disassembly) are not represented here: they are non-fatal and
/// handled inline by emitting a placeholder instead of returning an error.
#[derive(Debug, Clone)]
pub enum KsmError {
    Format(String),
    Symbol { message: String, line: Option<usize> },
    Structural(String),
}

impl fmt::Display for KsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KsmError::Format(msg) => write!(f, "format error: {msg}"),
            KsmError::Symbol { message, line: Some(line) } => {
                write!(f, "symbol error at line {line}: {message}")
            }
            KsmError::Symbol { message, line: None } => write!(f, "symbol error: {message}"),
            KsmError::Structural(msg) => write!(f, "structural error: {msg}"),
        }
    }
}

impl std::error::Error for KsmError {}

impl KsmError {
    pub fn format(message: impl Into<String>) -> Self {
        KsmError::Format(message.into())
    }

    pub fn symbol(message: impl Into<String>, line: Option<usize>) -> Self {
        KsmError::Symbol { message: message.into(), line }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        KsmError::Structural(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_error_includes_line() {
        let err = KsmError::symbol("unknown name foo", Some(12));
        assert_eq!(err.to_string(), "symbol error at line 12: unknown name foo");
    }
}
