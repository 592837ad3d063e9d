//! Array access and the four array-open/close forms.
//!
//! Array *contents* live in the arrays section and are parsed into
//! `Tables` before the instruction stream is decoded (see
//! `symbols::tables::Tables::add_global_array`/`Function::add_local_array`);
//! the opener instructions in the code stream only reference an array by
//! identifier and, for primitive element types, copy its already-loaded
//! values into the instruction for rendering.

use anyhow::Result;

use super::expr::{decode_expression, Terminator};
use super::{Instruction, Opcode};
use crate::symbols::{Array, ArrayValue, Tables};
use crate::version::KsmVersion;
use crate::word::{WordRead, WordWriter};

fn array_name(tables: &Tables, id: u32) -> String {
    tables.lookup_array_by_id(id).map(|a| a.name.clone()).unwrap_or_else(|| format!("arr_{id:x}"))
}

fn array_by_name<'a>(tables: &'a Tables, name: &str) -> Option<&'a Array> {
    tables.lookup_array_by_name(name)
}

fn int_values(array: Option<&Array>) -> Vec<i32> {
    array
        .map(|a| a.values.iter().filter_map(|v| if let ArrayValue::Int(i) = v { Some(*i) } else { None }).collect())
        .unwrap_or_default()
}

fn float_values(array: Option<&Array>) -> Vec<f32> {
    array
        .map(|a| a.values.iter().filter_map(|v| if let ArrayValue::Float(f) = v { Some(*f) } else { None }).collect())
        .unwrap_or_default()
}

fn bool_values(array: Option<&Array>) -> Vec<bool> {
    array
        .map(|a| a.values.iter().filter_map(|v| if let ArrayValue::Bool(b) = v { Some(*b) } else { None }).collect())
        .unwrap_or_default()
}

/// Reads one array operand: an expression terminated by `CloseExpression`,
/// collapsed to a single instruction (same shape as `control::single_condition`).
fn single_operand(reader: &mut impl WordRead, version: KsmVersion, tables: &mut Tables) -> Result<Instruction> {
    let mut expr = decode_expression(reader, version, tables, Terminator::CloseExpression)?;
    Ok(if expr.len() == 1 { expr.pop().unwrap() } else { Instruction::Operator(super::emit_expression_text(&expr)) })
}

pub fn decode(
    op: Opcode,
    _disable_expr: bool,
    reader: &mut impl WordRead,
    version: KsmVersion,
    tables: &mut Tables,
) -> Result<Option<Instruction>> {
    Ok(Some(match op {
        Opcode::VariableArrayOpen => {
            let id = reader.next()?.value;
            let name = array_name(tables, id);
            let length = array_by_name(tables, &name).map(|a| a.length).unwrap_or(0);
            Instruction::VariableArrayOpen { name, length }
        }
        Opcode::IntArrayOpen => {
            let id = reader.next()?.value;
            let name = array_name(tables, id);
            let values = int_values(array_by_name(tables, &name));
            Instruction::IntArrayOpen { name, values }
        }
        Opcode::FloatArrayOpen => {
            let id = reader.next()?.value;
            let name = array_name(tables, id);
            let values = float_values(array_by_name(tables, &name));
            Instruction::FloatArrayOpen { name, values }
        }
        Opcode::BoolArrayOpen => {
            let id = reader.next()?.value;
            let name = array_name(tables, id);
            let values = bool_values(array_by_name(tables, &name));
            Instruction::BoolArrayOpen { name, values }
        }
        Opcode::ArrayClose => Instruction::ArrayClose,
        Opcode::ReadArrayEntry => {
            let id = reader.next()?.value;
            let index = single_operand(reader, version, tables)?;
            Instruction::ReadArrayEntry { array: array_name(tables, id), index: Box::new(index) }
        }
        Opcode::ArrayAssignment => {
            let id = reader.next()?.value;
            let index = single_operand(reader, version, tables)?;
            let value = single_operand(reader, version, tables)?;
            Instruction::ArrayAssignment { array: array_name(tables, id), index: Box::new(index), value: Box::new(value) }
        }
        Opcode::ArrayCopy1 => {
            let dest = reader.next()?.value;
            let source = reader.next()?.value;
            Instruction::ArrayCopy1 { dest: array_name(tables, dest), source: array_name(tables, source) }
        }
        Opcode::ArrayCopy2 => {
            let dest = reader.next()?.value;
            let source = reader.next()?.value;
            let count = single_operand(reader, version, tables)?;
            Instruction::ArrayCopy2 { dest: array_name(tables, dest), source: array_name(tables, source), count: Box::new(count) }
        }
        Opcode::ArrayCopy3 => {
            let dest = reader.next()?.value;
            let dest_index = single_operand(reader, version, tables)?;
            let source = reader.next()?.value;
            let source_index = single_operand(reader, version, tables)?;
            let count = single_operand(reader, version, tables)?;
            Instruction::ArrayCopy3 {
                dest: array_name(tables, dest),
                dest_index: Box::new(dest_index),
                source: array_name(tables, source),
                source_index: Box::new(source_index),
                count: Box::new(count),
            }
        }
        Opcode::ArrayAssign1 => {
            let id = reader.next()?.value;
            let value = single_operand(reader, version, tables)?;
            Instruction::ArrayAssign1 { array: array_name(tables, id), value: Box::new(value) }
        }
        Opcode::ArrayAssign2 => {
            let id = reader.next()?.value;
            let start = single_operand(reader, version, tables)?;
            let value = single_operand(reader, version, tables)?;
            Instruction::ArrayAssign2 { array: array_name(tables, id), start: Box::new(start), value: Box::new(value) }
        }
        Opcode::ArrayAssign3 => {
            let id = reader.next()?.value;
            let start = single_operand(reader, version, tables)?;
            let count = single_operand(reader, version, tables)?;
            let value = single_operand(reader, version, tables)?;
            Instruction::ArrayAssign3 {
                array: array_name(tables, id),
                start: Box::new(start),
                count: Box::new(count),
                value: Box::new(value),
            }
        }
        Opcode::ArrayGetIndex => {
            let id = reader.next()?.value;
            let value = single_operand(reader, version, tables)?;
            Instruction::ArrayGetIndex { array: array_name(tables, id), value: Box::new(value) }
        }
        Opcode::GetArrayLength => {
            let id = reader.next()?.value;
            Instruction::GetArrayLength { array: array_name(tables, id) }
        }
        Opcode::VariableReferenceReadArrayEntry => {
            let array = super::decode_one(reader, version, tables)?;
            let index = single_operand(reader, version, tables)?;
            Instruction::VariableReferenceReadArrayEntry { array: Box::new(array), index: Box::new(index) }
        }
        Opcode::VariableReferenceArrayAssignment => {
            let array = super::decode_one(reader, version, tables)?;
            let index = single_operand(reader, version, tables)?;
            let value = single_operand(reader, version, tables)?;
            Instruction::VariableReferenceArrayAssignment {
                array: Box::new(array),
                index: Box::new(index),
                value: Box::new(value),
            }
        }
        Opcode::VariableReferenceArrayCopy1 => {
            let dest = super::decode_one(reader, version, tables)?;
            let source = super::decode_one(reader, version, tables)?;
            Instruction::VariableReferenceArrayCopy1 { dest: Box::new(dest), source: Box::new(source) }
        }
        Opcode::VariableReferenceArrayCopy2 => {
            let dest = super::decode_one(reader, version, tables)?;
            let source = super::decode_one(reader, version, tables)?;
            let count = single_operand(reader, version, tables)?;
            Instruction::VariableReferenceArrayCopy2 { dest: Box::new(dest), source: Box::new(source), count: Box::new(count) }
        }
        Opcode::VariableReferenceArrayCopy3 => {
            let dest = super::decode_one(reader, version, tables)?;
            let dest_index = single_operand(reader, version, tables)?;
            let source = super::decode_one(reader, version, tables)?;
            let source_index = single_operand(reader, version, tables)?;
            let count = single_operand(reader, version, tables)?;
            Instruction::VariableReferenceArrayCopy3 {
                dest: Box::new(dest),
                dest_index: Box::new(dest_index),
                source: Box::new(source),
                source_index: Box::new(source_index),
                count: Box::new(count),
            }
        }
        Opcode::VariableReferenceArrayGetIndex => {
            let array = super::decode_one(reader, version, tables)?;
            let value = single_operand(reader, version, tables)?;
            Instruction::VariableReferenceArrayGetIndex { array: Box::new(array), value: Box::new(value) }
        }
        Opcode::GetVariableReferenceArrayLength => {
            let array = super::decode_one(reader, version, tables)?;
            Instruction::GetVariableReferenceArrayLength { array: Box::new(array) }
        }
        _ => return Ok(None),
    }))
}

pub fn encode(instr: &Instruction, writer: &mut WordWriter, tables: &mut Tables, version: KsmVersion) -> Result<bool> {
    macro_rules! op {
        ($o:expr) => {
            writer.push($o.id(version).ok_or_else(|| anyhow::anyhow!("opcode not available in this version"))?)
        };
    }
    macro_rules! close_expr {
        () => {
            writer.push(Opcode::CloseExpression.id(version).unwrap())
        };
    }
    macro_rules! array_id {
        ($name:expr) => {
            tables.lookup_array_by_name($name).map(|a| a.identifier).unwrap_or(0)
        };
    }
    match instr {
        Instruction::ArrayClose => {
            op!(Opcode::ArrayClose);
        }
        Instruction::VariableArrayOpen { name, .. }
        | Instruction::IntArrayOpen { name, .. }
        | Instruction::FloatArrayOpen { name, .. }
        | Instruction::BoolArrayOpen { name, .. } => {
            let op = match instr {
                Instruction::VariableArrayOpen { .. } => Opcode::VariableArrayOpen,
                Instruction::IntArrayOpen { .. } => Opcode::IntArrayOpen,
                Instruction::FloatArrayOpen { .. } => Opcode::FloatArrayOpen,
                _ => Opcode::BoolArrayOpen,
            };
            writer.push(op.id(version).unwrap());
            writer.push(array_id!(name));
        }
        Instruction::ReadArrayEntry { array, index } => {
            op!(Opcode::ReadArrayEntry);
            writer.push(array_id!(array));
            super::encode_one(index, writer, tables, version)?;
            close_expr!();
        }
        Instruction::ArrayAssignment { array, index, value } => {
            op!(Opcode::ArrayAssignment);
            writer.push(array_id!(array));
            super::encode_one(index, writer, tables, version)?;
            close_expr!();
            super::encode_one(value, writer, tables, version)?;
            close_expr!();
        }
        Instruction::ArrayCopy1 { dest, source } => {
            op!(Opcode::ArrayCopy1);
            writer.push(array_id!(dest));
            writer.push(array_id!(source));
        }
        Instruction::ArrayCopy2 { dest, source, count } => {
            op!(Opcode::ArrayCopy2);
            writer.push(array_id!(dest));
            writer.push(array_id!(source));
            super::encode_one(count, writer, tables, version)?;
            close_expr!();
        }
        Instruction::ArrayCopy3 { dest, dest_index, source, source_index, count } => {
            op!(Opcode::ArrayCopy3);
            writer.push(array_id!(dest));
            super::encode_one(dest_index, writer, tables, version)?;
            close_expr!();
            writer.push(array_id!(source));
            super::encode_one(source_index, writer, tables, version)?;
            close_expr!();
            super::encode_one(count, writer, tables, version)?;
            close_expr!();
        }
        Instruction::ArrayAssign1 { array, value } => {
            op!(Opcode::ArrayAssign1);
            writer.push(array_id!(array));
            super::encode_one(value, writer, tables, version)?;
            close_expr!();
        }
        Instruction::ArrayAssign2 { array, start, value } => {
            op!(Opcode::ArrayAssign2);
            writer.push(array_id!(array));
            super::encode_one(start, writer, tables, version)?;
            close_expr!();
            super::encode_one(value, writer, tables, version)?;
            close_expr!();
        }
        Instruction::ArrayAssign3 { array, start, count, value } => {
            op!(Opcode::ArrayAssign3);
            writer.push(array_id!(array));
            super::encode_one(start, writer, tables, version)?;
            close_expr!();
            super::encode_one(count, writer, tables, version)?;
            close_expr!();
            super::encode_one(value, writer, tables, version)?;
            close_expr!();
        }
        Instruction::ArrayGetIndex { array, value } => {
            op!(Opcode::ArrayGetIndex);
            writer.push(array_id!(array));
            super::encode_one(value, writer, tables, version)?;
            close_expr!();
        }
        Instruction::GetArrayLength { array } => {
            op!(Opcode::GetArrayLength);
            writer.push(array_id!(array));
        }
        Instruction::VariableReferenceReadArrayEntry { array, index } => {
            op!(Opcode::VariableReferenceReadArrayEntry);
            super::encode_one(array, writer, tables, version)?;
            super::encode_one(index, writer, tables, version)?;
            close_expr!();
        }
        Instruction::VariableReferenceArrayAssignment { array, index, value } => {
            op!(Opcode::VariableReferenceArrayAssignment);
            super::encode_one(array, writer, tables, version)?;
            super::encode_one(index, writer, tables, version)?;
            close_expr!();
            super::encode_one(value, writer, tables, version)?;
            close_expr!();
        }
        Instruction::VariableReferenceArrayCopy1 { dest, source } => {
            op!(Opcode::VariableReferenceArrayCopy1);
            super::encode_one(dest, writer, tables, version)?;
            super::encode_one(source, writer, tables, version)?;
        }
        Instruction::VariableReferenceArrayCopy2 { dest, source, count } => {
            op!(Opcode::VariableReferenceArrayCopy2);
            super::encode_one(dest, writer, tables, version)?;
            super::encode_one(source, writer, tables, version)?;
            super::encode_one(count, writer, tables, version)?;
            close_expr!();
        }
        Instruction::VariableReferenceArrayCopy3 { dest, dest_index, source, source_index, count } => {
            op!(Opcode::VariableReferenceArrayCopy3);
            super::encode_one(dest, writer, tables, version)?;
            super::encode_one(dest_index, writer, tables, version)?;
            close_expr!();
            super::encode_one(source, writer, tables, version)?;
            super::encode_one(source_index, writer, tables, version)?;
            close_expr!();
            super::encode_one(count, writer, tables, version)?;
            close_expr!();
        }
        Instruction::VariableReferenceArrayGetIndex { array, value } => {
            op!(Opcode::VariableReferenceArrayGetIndex);
            super::encode_one(array, writer, tables, version)?;
            super::encode_one(value, writer, tables, version)?;
            close_expr!();
        }
        Instruction::GetVariableReferenceArrayLength { array } => {
            op!(Opcode::GetVariableReferenceArrayLength);
            super::encode_one(array, writer, tables, version)?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

pub fn emit(instr: &Instruction) -> Option<String> {
    Some(match instr {
        // Array open/close is one statement in text even though the
        // binary form brackets it with a separate close sentinel; the
        // disassembler driver emits this line and then suppresses the
        // empty line `ArrayClose` produces.
        Instruction::VariableArrayOpen { name, length } => format!("var_array {name}[{length}];"),
        Instruction::IntArrayOpen { name, values } => {
            format!("int_array {name} = {{{}}};", values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "))
        }
        Instruction::FloatArrayOpen { name, values } => format!(
            "float_array {name} = {{{}}};",
            values.iter().map(|v| crate::word::format_float(*v)).collect::<Vec<_>>().join(", ")
        ),
        Instruction::BoolArrayOpen { name, values } => format!(
            "bool_array {name} = {{{}}};",
            values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
        ),
        Instruction::ArrayClose => String::new(),
        Instruction::ReadArrayEntry { array, index } => format!("{array}[{}]", super::emit_text(index)),
        Instruction::ArrayAssignment { array, index, value } => {
            format!("{array}[{}] = {};", super::emit_text(index), super::emit_text(value))
        }
        Instruction::ArrayCopy1 { dest, source } => format!("copy({dest}, {source});"),
        Instruction::ArrayCopy2 { dest, source, count } => {
            format!("copy({dest}, {source}, {});", super::emit_text(count))
        }
        Instruction::ArrayCopy3 { dest, dest_index, source, source_index, count } => format!(
            "copy({dest}, {}, {source}, {}, {});",
            super::emit_text(dest_index),
            super::emit_text(source_index),
            super::emit_text(count)
        ),
        Instruction::ArrayAssign1 { array, value } => format!("array_fill({array}, {});", super::emit_text(value)),
        Instruction::ArrayAssign2 { array, start, value } => {
            format!("array_fill({array}, {}, {});", super::emit_text(start), super::emit_text(value))
        }
        Instruction::ArrayAssign3 { array, start, count, value } => format!(
            "array_fill({array}, {}, {}, {});",
            super::emit_text(start),
            super::emit_text(count),
            super::emit_text(value)
        ),
        Instruction::ArrayGetIndex { array, value } => format!("index({array}, {})", super::emit_text(value)),
        Instruction::GetArrayLength { array } => format!("length({array})"),
        Instruction::VariableReferenceReadArrayEntry { array, index } => {
            format!("{}[{}]", super::emit_text(array), super::emit_text(index))
        }
        Instruction::VariableReferenceArrayAssignment { array, index, value } => format!(
            "{}[{}] = {};",
            super::emit_text(array),
            super::emit_text(index),
            super::emit_text(value)
        ),
        Instruction::VariableReferenceArrayCopy1 { dest, source } => {
            format!("copy({}, {});", super::emit_text(dest), super::emit_text(source))
        }
        Instruction::VariableReferenceArrayCopy2 { dest, source, count } => format!(
            "copy({}, {}, {});",
            super::emit_text(dest),
            super::emit_text(source),
            super::emit_text(count)
        ),
        Instruction::VariableReferenceArrayCopy3 { dest, dest_index, source, source_index, count } => format!(
            "copy({}, {}, {}, {}, {});",
            super::emit_text(dest),
            super::emit_text(dest_index),
            super::emit_text(source),
            super::emit_text(source_index),
            super::emit_text(count)
        ),
        Instruction::VariableReferenceArrayGetIndex { array, value } => {
            format!("index({}, {})", super::emit_text(array), super::emit_text(value))
        }
        Instruction::GetVariableReferenceArrayLength { array } => format!("length({})", super::emit_text(array)),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_array_entry_emits_index_syntax() {
        let instr = Instruction::ReadArrayEntry {
            array: "nums".to_string(),
            index: Box::new(Instruction::IntLiteral(2)),
        };
        assert_eq!(emit(&instr).unwrap(), "nums[2]");
    }

    #[test]
    fn get_array_length_emits_builtin() {
        let instr = Instruction::GetArrayLength { array: "nums".to_string() };
        assert_eq!(emit(&instr).unwrap(), "length(nums)");
    }
}
