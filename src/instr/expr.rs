//! Expressions: flat RPN operand streams terminated by a sentinel.

use anyhow::Result;

use super::{decode_one, Instruction};
use crate::symbols::Tables;
use crate::version::KsmVersion;
use crate::word::{WordRead, WordWriter};

pub type Expression = Vec<Instruction>;

/// Which sentinel instruction terminates a given operand stream. Distinct
/// opcodes, used in distinct syntactic positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    CloseExpression,
    CloseCallArguments,
    CloseFunctionArguments,
}

impl Terminator {
    fn matches(self, instr: &Instruction) -> bool {
        matches!(
            (self, instr),
            (Terminator::CloseExpression, Instruction::CloseExpression)
                | (Terminator::CloseCallArguments, Instruction::CloseCallArguments)
                | (Terminator::CloseFunctionArguments, Instruction::CloseFunctionArguments)
        )
    }

    fn sentinel(self) -> Instruction {
        match self {
            Terminator::CloseExpression => Instruction::CloseExpression,
            Terminator::CloseCallArguments => Instruction::CloseCallArguments,
            Terminator::CloseFunctionArguments => Instruction::CloseFunctionArguments,
        }
    }
}

/// Decodes operand instructions until the given terminator sentinel is
/// hit (consumed, not included in the result).
pub fn decode_expression(
    reader: &mut impl WordRead,
    version: KsmVersion,
    tables: &mut Tables,
    terminator: Terminator,
) -> Result<Expression> {
    let mut out = Vec::new();
    loop {
        let instr = decode_one(reader, version, tables)?;
        if terminator.matches(&instr) {
            break;
        }
        out.push(instr);
    }
    Ok(out)
}

/// Encodes each operand, then the appropriate sentinel.
pub fn encode_expression(
    expr: &Expression,
    writer: &mut WordWriter,
    tables: &mut Tables,
    version: KsmVersion,
    terminator: Terminator,
) -> Result<()> {
    for instr in expr {
        super::encode_one(instr, writer, tables, version)?;
    }
    super::encode_one(&terminator.sentinel(), writer, tables, version)
}

/// Renders an expression as space-separated infix text; parenthesis
/// operators carry their own grouping, so no re-parsing to a tree is
/// necessary to go from RPN to readable infix-like source.
pub fn emit_expression_text(expr: &Expression) -> String {
    expr.iter().map(super::emit_text).collect::<Vec<_>>().join(" ")
}
