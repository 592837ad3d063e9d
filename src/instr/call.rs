//! Calls: direct and variable-target, plain and threaded, plus the two
//! call-adjacent leaf opcodes (`GetNextFunctionReturn`, `GetArgumentCount`).
//!
//! Every call forces accumulator materialization for the enclosing
//! function (see `Tables::current_function_mut`/`Function::accumulator_id`);
//! that side effect is applied by the assembler when it parses a call, not
//! here — this module only covers the binary decode/encode/emit shape.

use anyhow::Result;

use super::expr::{decode_expression, encode_expression, Terminator};
use super::{Instruction, Opcode};
use crate::symbols::Tables;
use crate::version::KsmVersion;
use crate::word::{WordRead, WordWriter};

/// A call target word may name either a locally-defined function or an
/// import declared by the header (see SPEC_FULL §4.2 "Import allocation");
/// the `Call` family does not distinguish the two at the opcode level.
fn function_name(tables: &Tables, id: u32) -> String {
    if let Some(f) = tables.function_by_id(id) {
        return f.name.clone();
    }
    if let Some(&idx) = tables.imports_by_id.get(&id) {
        return tables.imports[idx].name.clone();
    }
    format!("func_{id:x}")
}

/// Resolves a call's target identifier: a name already declared as an
/// import (via a header `#import` directive) is a reference into the
/// import table and bumps its `timesUsed`; everything else is a function,
/// declared on first use.
fn resolve_call_target(tables: &mut Tables, name: &str) -> Result<u32> {
    if tables.imports_by_name.contains_key(name) {
        return Ok(tables.use_import(name, crate::symbols::ImportDataType::Function));
    }
    tables.declare_function(name, true)
}

/// Every call forces the enclosing function's accumulator local into
/// existence, whether or not the call's return value is actually used by
/// an assignment (see SPEC_FULL §3 "Accumulator").
fn materialize_accumulator(tables: &mut Tables) {
    if let Some(f) = tables.current_function_mut() {
        f.accumulator_id();
    }
}

pub fn decode(
    op: Opcode,
    _disable_expr: bool,
    reader: &mut impl WordRead,
    version: KsmVersion,
    tables: &mut Tables,
) -> Result<Option<Instruction>> {
    Ok(Some(match op {
        Opcode::Call => {
            let id = reader.next()?.value;
            let name = function_name(tables, id);
            let args = decode_expression(reader, version, tables, Terminator::CloseCallArguments)?;
            Instruction::Call { name, args, disable_expr: _disable_expr }
        }
        Opcode::ThreadCall | Opcode::ThreadCallChild => {
            let id = reader.next()?.value;
            let name = function_name(tables, id);
            let captures = decode_expression(reader, version, tables, Terminator::CloseFunctionArguments)?;
            let args = decode_expression(reader, version, tables, Terminator::CloseCallArguments)?;
            match op {
                Opcode::ThreadCall => Instruction::ThreadCall { name, captures, args },
                _ => Instruction::ThreadCallChild { name, captures, args },
            }
        }
        Opcode::VariableCall => {
            let target = super::decode_one(reader, version, tables)?;
            let args = decode_expression(reader, version, tables, Terminator::CloseCallArguments)?;
            Instruction::VariableCall { target: Box::new(target), args }
        }
        Opcode::VariableThreadCall | Opcode::VariableThreadCallChild => {
            let target = super::decode_one(reader, version, tables)?;
            let captures = decode_expression(reader, version, tables, Terminator::CloseFunctionArguments)?;
            let args = decode_expression(reader, version, tables, Terminator::CloseCallArguments)?;
            match op {
                Opcode::VariableThreadCall => {
                    Instruction::VariableThreadCall { target: Box::new(target), captures, args }
                }
                _ => Instruction::VariableThreadCallChild { target: Box::new(target), captures, args },
            }
        }
        Opcode::GetNextFunctionReturn => Instruction::GetNextFunctionReturn,
        Opcode::GetArgumentCount => Instruction::GetArgumentCount,
        Opcode::CloseCallArguments => Instruction::CloseCallArguments,
        _ => return Ok(None),
    }))
}

pub fn encode(instr: &Instruction, writer: &mut WordWriter, tables: &mut Tables, version: KsmVersion) -> Result<bool> {
    macro_rules! op {
        ($o:expr, $disable:expr) => {
            writer.push(
                $o.id(version).ok_or_else(|| anyhow::anyhow!("opcode not available in this version"))?
                    | if $disable { 0x100 } else { 0 },
            )
        };
    }
    match instr {
        Instruction::CloseCallArguments => {
            writer.push(Opcode::CloseCallArguments.id(version).unwrap());
        }
        Instruction::GetNextFunctionReturn => {
            writer.push(Opcode::GetNextFunctionReturn.id(version).unwrap());
        }
        Instruction::GetArgumentCount => {
            writer.push(Opcode::GetArgumentCount.id(version).unwrap());
        }
        Instruction::Call { name, args, disable_expr } => {
            materialize_accumulator(tables);
            op!(Opcode::Call, *disable_expr);
            let id = resolve_call_target(tables, name)?;
            writer.push(id);
            encode_expression(args, writer, tables, version, Terminator::CloseCallArguments)?;
        }
        Instruction::ThreadCall { name, captures, args } => {
            materialize_accumulator(tables);
            op!(Opcode::ThreadCall, false);
            let id = resolve_call_target(tables, name)?;
            writer.push(id);
            encode_expression(captures, writer, tables, version, Terminator::CloseFunctionArguments)?;
            encode_expression(args, writer, tables, version, Terminator::CloseCallArguments)?;
        }
        Instruction::ThreadCallChild { name, captures, args } => {
            materialize_accumulator(tables);
            op!(Opcode::ThreadCallChild, false);
            let id = resolve_call_target(tables, name)?;
            writer.push(id);
            encode_expression(captures, writer, tables, version, Terminator::CloseFunctionArguments)?;
            encode_expression(args, writer, tables, version, Terminator::CloseCallArguments)?;
        }
        Instruction::VariableCall { target, args } => {
            materialize_accumulator(tables);
            op!(Opcode::VariableCall, false);
            super::encode_one(target, writer, tables, version)?;
            encode_expression(args, writer, tables, version, Terminator::CloseCallArguments)?;
        }
        Instruction::VariableThreadCall { target, captures, args } => {
            materialize_accumulator(tables);
            op!(Opcode::VariableThreadCall, false);
            super::encode_one(target, writer, tables, version)?;
            encode_expression(captures, writer, tables, version, Terminator::CloseFunctionArguments)?;
            encode_expression(args, writer, tables, version, Terminator::CloseCallArguments)?;
        }
        Instruction::VariableThreadCallChild { target, captures, args } => {
            materialize_accumulator(tables);
            op!(Opcode::VariableThreadCallChild, false);
            super::encode_one(target, writer, tables, version)?;
            encode_expression(captures, writer, tables, version, Terminator::CloseFunctionArguments)?;
            encode_expression(args, writer, tables, version, Terminator::CloseCallArguments)?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

pub fn emit(instr: &Instruction) -> Option<String> {
    Some(match instr {
        Instruction::CloseCallArguments => String::new(),
        Instruction::GetNextFunctionReturn => String::new(),
        Instruction::GetArgumentCount => "arg_count".to_string(),
        Instruction::Call { name, args, disable_expr } => {
            let star = if *disable_expr { "*" } else { "" };
            format!("{name}{star}({})", super::emit_expression_text(args))
        }
        Instruction::ThreadCall { name, captures, args } => {
            format!("thread {name}[{}]({})", super::emit_expression_text(captures), super::emit_expression_text(args))
        }
        Instruction::ThreadCallChild { name, captures, args } => format!(
            "childthread {name}[{}]({})",
            super::emit_expression_text(captures),
            super::emit_expression_text(args)
        ),
        Instruction::VariableCall { target, args } => {
            format!("{}({})", super::emit_text(target), super::emit_expression_text(args))
        }
        Instruction::VariableThreadCall { target, captures, args } => format!(
            "thread {}[{}]({})",
            super::emit_text(target),
            super::emit_expression_text(captures),
            super::emit_expression_text(args)
        ),
        Instruction::VariableThreadCallChild { target, captures, args } => format!(
            "childthread {}[{}]({})",
            super::emit_text(target),
            super::emit_expression_text(captures),
            super::emit_expression_text(args)
        ),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{decode_one, encode_one};
    use crate::word::{WordCursor, WordWriter};

    #[test]
    fn call_round_trips_through_decode_encode() {
        let mut tables = Tables::new(KsmVersion::V1_3_0, crate::ident::DEFAULT_SLOT_OFFSET);
        tables.declare_function("g", true).unwrap();
        let fid = tables.functions[0].identifier;

        let mut w = WordWriter::new();
        w.push(Opcode::Call.id(KsmVersion::V1_3_0).unwrap());
        w.push(fid);
        w.push(Opcode::CloseCallArguments.id(KsmVersion::V1_3_0).unwrap());
        let words = w.into_words();

        let mut reader = WordCursor::new(&words);
        let instr = decode_one(&mut reader, KsmVersion::V1_3_0, &mut tables).unwrap();
        match &instr {
            Instruction::Call { name, args, .. } => {
                assert_eq!(name, "g");
                assert!(args.is_empty());
            }
            other => panic!("unexpected instruction {other:?}"),
        }

        let mut w2 = WordWriter::new();
        encode_one(&instr, &mut w2, &mut tables, KsmVersion::V1_3_0).unwrap();
        assert_eq!(w2.words()[0], Opcode::Call.id(KsmVersion::V1_3_0).unwrap());
    }

    #[test]
    fn encoding_a_call_materializes_the_enclosing_accumulator() {
        let mut tables = Tables::new(KsmVersion::V1_3_0, crate::ident::DEFAULT_SLOT_OFFSET);
        let fid = tables.declare_function("caller", true).unwrap();
        let idx = tables.functions_by_id[&fid];
        tables.push_function(idx);
        assert!(tables.current_function().unwrap().accumulator.is_none());

        let call = Instruction::Call { name: "g".to_string(), args: Vec::new(), disable_expr: false };
        let mut w = WordWriter::new();
        encode_one(&call, &mut w, &mut tables, KsmVersion::V1_3_0).unwrap();

        let accumulator = tables.current_function().unwrap().accumulator;
        assert_eq!(accumulator, Some(crate::ident::local_id(0)));

        // Idempotent: a second call in the same function doesn't reassign it.
        let mut w2 = WordWriter::new();
        encode_one(&call, &mut w2, &mut tables, KsmVersion::V1_3_0).unwrap();
        assert_eq!(tables.current_function().unwrap().accumulator, accumulator);
    }

    #[test]
    fn calling_a_declared_import_bumps_its_use_count_instead_of_declaring_a_function() {
        let mut tables = Tables::new(KsmVersion::V1_3_0, crate::ident::DEFAULT_SLOT_OFFSET);
        let id = tables.declare_import("imp", crate::symbols::ImportDataType::Function);
        assert_eq!(id, crate::ident::FIRST_IMPORT_ID);
        assert_eq!(tables.imports[0].times_used, 0);

        let call = Instruction::Call { name: "imp".to_string(), args: Vec::new(), disable_expr: false };
        for _ in 0..3 {
            let mut w = WordWriter::new();
            encode_one(&call, &mut w, &mut tables, KsmVersion::V1_3_0).unwrap();
            assert_eq!(w.words()[1], crate::ident::FIRST_IMPORT_ID);
        }
        assert_eq!(tables.imports.len(), 1, "must not fork a duplicate function entry");
        assert_eq!(tables.imports[0].times_used, 3);
        assert!(tables.functions.is_empty());
    }
}
