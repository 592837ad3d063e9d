//! Assignment forms: plain value assignment (with its two textual special
//! cases — direct call-return flow and unary increment/decrement),
//! function-reference assignment, and array-reference assignment.

use anyhow::Result;

use super::expr::{decode_expression, Terminator};
use super::{Instruction, Opcode};
use crate::symbols::Tables;
use crate::version::KsmVersion;
use crate::word::{WordRead, WordWriter};

fn function_name(tables: &Tables, id: u32) -> String {
    tables.function_by_id(id).map(|f| f.name.clone()).unwrap_or_else(|| format!("func_{id:x}"))
}

fn array_name(tables: &Tables, id: u32) -> String {
    tables.lookup_array_by_id(id).map(|a| a.name.clone()).unwrap_or_else(|| format!("arr_{id:x}"))
}

/// Unary increment/decrement is spelled, in the bytecode, as the target
/// pushed again followed by the `++`/`--` operator; detected here so the
/// text form can collapse it to `x++;` instead of `x = x++;`.
fn is_self_increment(target: &Instruction, value_expr: &[Instruction]) -> Option<String> {
    if let [operand, Instruction::Operator(op)] = value_expr {
        if (op == "++" || op == "--") && operand == target {
            return Some(op.clone());
        }
    }
    None
}

pub fn decode(
    op: Opcode,
    _disable_expr: bool,
    reader: &mut impl WordRead,
    version: KsmVersion,
    tables: &mut Tables,
) -> Result<Option<Instruction>> {
    Ok(Some(match op {
        Opcode::Assignment => {
            let target = super::decode_one(reader, version, tables)?;
            let mut value_expr = decode_expression(reader, version, tables, Terminator::CloseExpression)?;

            let value = if let Some(op) = is_self_increment(&target, &value_expr) {
                Instruction::Operator(op)
            } else if matches!(value_expr.first(), Some(Instruction::GetNextFunctionReturn)) {
                // the call's return value flows straight into the assignee;
                // the sentinel itself carries no information in text form,
                // so drop it and keep the call that follows it.
                value_expr.remove(0);
                if value_expr.len() == 1 {
                    value_expr.pop().unwrap()
                } else {
                    Instruction::Operator(super::emit_expression_text(&value_expr))
                }
            } else if value_expr.len() == 1 {
                value_expr.pop().unwrap()
            } else {
                Instruction::Operator(super::emit_expression_text(&value_expr))
            };
            Instruction::Assignment { target: Box::new(target), value: Box::new(value) }
        }
        Opcode::FunctionAssignment => {
            let target = super::decode_one(reader, version, tables)?;
            let id = reader.next()?.value;
            Instruction::FunctionAssignment { target: Box::new(target), function: function_name(tables, id) }
        }
        Opcode::AssignmentReferenceArray => {
            let target = super::decode_one(reader, version, tables)?;
            let id = reader.next()?.value;
            Instruction::AssignmentReferenceArray { target: Box::new(target), array: array_name(tables, id) }
        }
        _ => return Ok(None),
    }))
}

pub fn encode(instr: &Instruction, writer: &mut WordWriter, tables: &mut Tables, version: KsmVersion) -> Result<bool> {
    match instr {
        Instruction::Assignment { target, value } => {
            writer.push(Opcode::Assignment.id(version).unwrap());
            super::encode_one(target, writer, tables, version)?;
            match value.as_ref() {
                Instruction::Operator(op) if op == "++" || op == "--" => {
                    super::encode_one(target, writer, tables, version)?;
                    super::encode_one(&Instruction::Operator(op.clone()), writer, tables, version)?;
                }
                Instruction::Call { .. } | Instruction::ThreadCall { .. } | Instruction::ThreadCallChild { .. } => {
                    super::encode_one(&Instruction::GetNextFunctionReturn, writer, tables, version)?;
                    super::encode_one(value, writer, tables, version)?;
                }
                other => super::encode_one(other, writer, tables, version)?,
            }
            writer.push(Opcode::CloseExpression.id(version).unwrap());
        }
        Instruction::FunctionAssignment { target, function } => {
            writer.push(Opcode::FunctionAssignment.id(version).unwrap());
            super::encode_one(target, writer, tables, version)?;
            let id = tables.declare_function(function.clone(), true)?;
            writer.push(id);
        }
        Instruction::AssignmentReferenceArray { target, array } => {
            writer.push(Opcode::AssignmentReferenceArray.id(version).unwrap());
            super::encode_one(target, writer, tables, version)?;
            let id = tables.lookup_array_by_name(array).map(|a| a.identifier).unwrap_or(0);
            writer.push(id);
        }
        _ => return Ok(false),
    }
    Ok(true)
}

pub fn emit(instr: &Instruction) -> Option<String> {
    Some(match instr {
        Instruction::Assignment { target, value } => match value.as_ref() {
            Instruction::Operator(op) if op == "++" || op == "--" => {
                format!("{}{op};", super::emit_text(target))
            }
            other => format!("{} = {};", super::emit_text(target), super::emit_text(other)),
        },
        Instruction::FunctionAssignment { target, function } => {
            format!("{} = {function};", super::emit_text(target))
        }
        Instruction::AssignmentReferenceArray { target, array } => {
            format!("{} = {array};", super::emit_text(target))
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_increment_collapses_to_plusplus() {
        let target = Instruction::VariableRef("x".to_string());
        let expr = vec![target.clone(), Instruction::Operator("++".to_string())];
        assert_eq!(is_self_increment(&target, &expr), Some("++".to_string()));
    }

    #[test]
    fn assignment_emits_infix_form() {
        let instr = Instruction::Assignment {
            target: Box::new(Instruction::VariableRef("x".to_string())),
            value: Box::new(Instruction::IntLiteral(5)),
        };
        assert_eq!(emit(&instr).unwrap(), "x = 5;");
    }

    #[test]
    fn increment_emits_postfix_form() {
        let instr = Instruction::Assignment {
            target: Box::new(Instruction::VariableRef("x".to_string())),
            value: Box::new(Instruction::Operator("++".to_string())),
        };
        assert_eq!(emit(&instr).unwrap(), "x++;");
    }

    #[test]
    fn decoding_a_call_return_assignment_keeps_the_call_not_the_sentinel() {
        use crate::ident;
        use crate::version::KsmVersion;
        use crate::word::{WordCursor, WordWriter};
        use crate::symbols::Tables;

        let mut tables = Tables::new(KsmVersion::V1_3_0, ident::DEFAULT_SLOT_OFFSET);
        let fid = tables.declare_function("g", true).unwrap();
        tables.declare_static("x", crate::symbols::DataType::None);
        let xid = tables.lookup_variable_by_name("x").unwrap();

        let mut w = WordWriter::new();
        w.push(Opcode::Assignment.id(KsmVersion::V1_3_0).unwrap());
        w.push(xid);
        w.push(Opcode::GetNextFunctionReturn.id(KsmVersion::V1_3_0).unwrap());
        w.push(Opcode::Call.id(KsmVersion::V1_3_0).unwrap());
        w.push(fid);
        w.push(Opcode::CloseCallArguments.id(KsmVersion::V1_3_0).unwrap());
        w.push(Opcode::CloseExpression.id(KsmVersion::V1_3_0).unwrap());
        let words = w.into_words();

        let mut reader = WordCursor::new(&words);
        let instr = super::super::decode_one(&mut reader, KsmVersion::V1_3_0, &mut tables).unwrap();
        match &instr {
            Instruction::Assignment { value, .. } => match value.as_ref() {
                Instruction::Call { name, .. } => assert_eq!(name, "g"),
                other => panic!("expected the call to survive decode, got {other:?}"),
            },
            other => panic!("unexpected instruction {other:?}"),
        }
        assert_eq!(super::super::emit_text(&instr), "x = g();");
    }
}
