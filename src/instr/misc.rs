//! Leftover leaf opcodes that don't fit the control/call/assignment/array
//! groupings: casts, type introspection, string formatting, the
//! expression-close sentinel, and the five unidentified opcodes preserved
//! byte-exact per spec §9's open questions.

use anyhow::Result;

use super::expr::{decode_expression, Terminator};
use super::{Instruction, Opcode};
use crate::symbols::Tables;
use crate::version::KsmVersion;
use crate::word::{WordRead, WordWriter};

fn function_name(tables: &Tables, id: u32) -> String {
    tables.function_by_id(id).map(|f| f.name.clone()).unwrap_or_else(|| format!("func_{id:x}"))
}

fn single_operand(reader: &mut impl WordRead, version: KsmVersion, tables: &mut Tables) -> Result<Instruction> {
    let mut expr = decode_expression(reader, version, tables, Terminator::CloseExpression)?;
    Ok(if expr.len() == 1 { expr.pop().unwrap() } else { Instruction::Operator(super::emit_expression_text(&expr)) })
}

pub fn decode(
    op: Opcode,
    disable_expr: bool,
    reader: &mut impl WordRead,
    version: KsmVersion,
    tables: &mut Tables,
) -> Result<Option<Instruction>> {
    Ok(Some(match op {
        Opcode::CloseExpression => Instruction::CloseExpression,
        Opcode::SleepUntilComplete => {
            let id = reader.next()?.value;
            Instruction::SleepUntilComplete { name: function_name(tables, id) }
        }
        Opcode::SleepWhile => {
            let condition = if disable_expr { super::decode_one(reader, version, tables)? } else { single_operand(reader, version, tables)? };
            Instruction::SleepWhile { condition: Box::new(condition) }
        }
        Opcode::Assert => {
            let condition = if disable_expr { super::decode_one(reader, version, tables)? } else { single_operand(reader, version, tables)? };
            Instruction::Assert { condition: Box::new(condition) }
        }
        Opcode::CastToInteger => {
            let value = single_operand(reader, version, tables)?;
            Instruction::CastToInteger { value: Box::new(value) }
        }
        Opcode::CastToFloatingPoint => {
            let value = single_operand(reader, version, tables)?;
            Instruction::CastToFloatingPoint { value: Box::new(value) }
        }
        Opcode::GetDataType => {
            let value = single_operand(reader, version, tables)?;
            Instruction::GetDataType { value: Box::new(value) }
        }
        Opcode::FormatString => {
            let format = single_operand(reader, version, tables)?;
            let args = decode_expression(reader, version, tables, Terminator::CloseCallArguments)?;
            Instruction::FormatString { format: Box::new(format), args }
        }
        Opcode::Unidentified57 => Instruction::Unidentified57,
        Opcode::Unidentified5b => Instruction::Unidentified5b,
        Opcode::Unidentified76 => Instruction::Unidentified76,
        Opcode::Unidentified7c => Instruction::Unidentified7c,
        Opcode::Unidentified7d => Instruction::Unidentified7d,
        _ => return Ok(None),
    }))
}

pub fn encode(instr: &Instruction, writer: &mut WordWriter, tables: &mut Tables, version: KsmVersion) -> Result<bool> {
    macro_rules! op {
        ($o:expr) => {
            writer.push($o.id(version).ok_or_else(|| anyhow::anyhow!("opcode not available in this version"))?)
        };
    }
    match instr {
        Instruction::CloseExpression => {
            op!(Opcode::CloseExpression);
        }
        Instruction::SleepUntilComplete { name } => {
            op!(Opcode::SleepUntilComplete);
            let id = tables.declare_function(name.clone(), true)?;
            writer.push(id);
        }
        Instruction::SleepWhile { condition } => {
            op!(Opcode::SleepWhile);
            super::encode_one(condition, writer, tables, version)?;
            writer.push(Opcode::CloseExpression.id(version).unwrap());
        }
        Instruction::Assert { condition } => {
            op!(Opcode::Assert);
            super::encode_one(condition, writer, tables, version)?;
            writer.push(Opcode::CloseExpression.id(version).unwrap());
        }
        Instruction::CastToInteger { value } => {
            op!(Opcode::CastToInteger);
            super::encode_one(value, writer, tables, version)?;
            writer.push(Opcode::CloseExpression.id(version).unwrap());
        }
        Instruction::CastToFloatingPoint { value } => {
            op!(Opcode::CastToFloatingPoint);
            super::encode_one(value, writer, tables, version)?;
            writer.push(Opcode::CloseExpression.id(version).unwrap());
        }
        Instruction::GetDataType { value } => {
            op!(Opcode::GetDataType);
            super::encode_one(value, writer, tables, version)?;
            writer.push(Opcode::CloseExpression.id(version).unwrap());
        }
        Instruction::FormatString { format, args } => {
            op!(Opcode::FormatString);
            super::encode_one(format, writer, tables, version)?;
            writer.push(Opcode::CloseExpression.id(version).unwrap());
            for a in args {
                super::encode_one(a, writer, tables, version)?;
            }
            writer.push(Opcode::CloseCallArguments.id(version).unwrap());
        }
        Instruction::Unidentified57 => op!(Opcode::Unidentified57),
        Instruction::Unidentified5b => op!(Opcode::Unidentified5b),
        Instruction::Unidentified76 => op!(Opcode::Unidentified76),
        Instruction::Unidentified7c => op!(Opcode::Unidentified7c),
        Instruction::Unidentified7d => op!(Opcode::Unidentified7d),
        _ => return Ok(false),
    }
    Ok(true)
}

pub fn emit(instr: &Instruction) -> Option<String> {
    Some(match instr {
        Instruction::CloseExpression => String::new(),
        Instruction::SleepUntilComplete { name } => format!("sleep_until_complete {name};"),
        Instruction::SleepWhile { condition } => format!("sleep_while {};", super::emit_text(condition)),
        Instruction::Assert { condition } => format!("assert {};", super::emit_text(condition)),
        Instruction::CastToInteger { value } => format!("int({})", super::emit_text(value)),
        Instruction::CastToFloatingPoint { value } => format!("float({})", super::emit_text(value)),
        Instruction::GetDataType { value } => format!("type({})", super::emit_text(value)),
        Instruction::FormatString { format, args } => {
            format!("format({}, {})", super::emit_text(format), super::emit_expression_text(args))
        }
        Instruction::Unidentified57 => "unidentified_57;".to_string(),
        Instruction::Unidentified5b => "unidentified_5b;".to_string(),
        Instruction::Unidentified76 => "unidentified_76;".to_string(),
        Instruction::Unidentified7c => "unidentified_7c;".to_string(),
        Instruction::Unidentified7d => "unidentified_7d;".to_string(),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cast_to_integer_emits_builtin_call() {
        let instr = Instruction::CastToInteger { value: Box::new(Instruction::FloatLiteral(1.5)) };
        assert_eq!(emit(&instr).unwrap(), "int(1.5)");
    }

    #[test]
    fn unidentified_opcodes_preserve_their_own_keyword() {
        assert_eq!(emit(&Instruction::Unidentified57).unwrap(), "unidentified_57;");
    }
}
