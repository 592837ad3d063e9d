//! The instruction model: a closed tagged union over every opcode, each
//! capable of up to five operations (decode, text-emit, text-parse,
//! encode, back-patch). See `opcode.rs` for the numeric tables and
//! `expr.rs` for the RPN expression container the operands of most
//! variants live in.

pub mod arrays;
pub mod assignment;
pub mod call;
pub mod control;
pub mod expr;
pub mod misc;
pub mod opcode;
pub mod operator;

pub use expr::{decode_expression, emit_expression_text, encode_expression, Expression, Terminator};
pub use opcode::Opcode;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::ident::{self, Scope};
use crate::symbols::Tables;
use crate::version::KsmVersion;
use crate::word::{WordRead, WordWriter};

/// One decoded instruction. Opcodes with no recognized mapping under the
/// active version decode to `Unknown` rather than failing, so a file with
/// opaque bytecode can still round-trip (see error.rs's warning policy).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Instruction {
    CloseExpression,
    CloseCallArguments,
    CloseFunctionArguments,

    EndFile,
    Noop,
    Return,
    Label { name: String },
    OpenFunction { name: String, is_public: bool, args: Expression },
    OpenThread { name: String, captures: Expression, label: Option<String> },
    OpenThreadChild { name: String, captures: Expression, label: Option<String> },
    CloseFunction,
    Goto { label: String },
    CaseGoto { label: String },
    If { condition: Box<Instruction> },
    ElseIf { condition: Box<Instruction> },
    Else,
    EndIf,
    Switch { value: Box<Instruction> },
    Case { value: Box<Instruction> },
    CaseRange { lower: Box<Instruction>, upper: Box<Instruction> },
    CaseDefault,
    BreakSwitch,
    EndSwitch,
    While { condition: Box<Instruction> },
    BreakWhile,
    ContinueWhile,
    EndWhile,
    DeleteVariable { name: String },
    IsChildThreadIncomplete { name: String },
    SleepFrames { count: Box<Instruction> },
    SleepMilliseconds { count: Box<Instruction> },
    SleepUntilComplete { name: String },
    SleepWhile { condition: Box<Instruction> },
    Assert { condition: Box<Instruction> },
    GlobalCodeOpen,
    GlobalCodeClose,

    Call { name: String, args: Expression, disable_expr: bool },
    ThreadCall { name: String, captures: Expression, args: Expression },
    ThreadCallChild { name: String, captures: Expression, args: Expression },
    VariableCall { target: Box<Instruction>, args: Expression },
    VariableThreadCall { target: Box<Instruction>, captures: Expression, args: Expression },
    VariableThreadCallChild { target: Box<Instruction>, captures: Expression, args: Expression },
    GetNextFunctionReturn,
    GetArgumentCount,

    Assignment { target: Box<Instruction>, value: Box<Instruction> },
    FunctionAssignment { target: Box<Instruction>, function: String },
    AssignmentReferenceArray { target: Box<Instruction>, array: String },

    VariableArrayOpen { name: String, length: u32 },
    IntArrayOpen { name: String, values: Vec<i32> },
    FloatArrayOpen { name: String, values: Vec<f32> },
    BoolArrayOpen { name: String, values: Vec<bool> },
    ArrayClose,
    ReadArrayEntry { array: String, index: Box<Instruction> },
    ArrayAssignment { array: String, index: Box<Instruction>, value: Box<Instruction> },
    ArrayCopy1 { dest: String, source: String },
    ArrayCopy2 { dest: String, source: String, count: Box<Instruction> },
    ArrayCopy3 {
        dest: String,
        dest_index: Box<Instruction>,
        source: String,
        source_index: Box<Instruction>,
        count: Box<Instruction>,
    },
    ArrayAssign1 { array: String, value: Box<Instruction> },
    ArrayAssign2 { array: String, start: Box<Instruction>, value: Box<Instruction> },
    ArrayAssign3 { array: String, start: Box<Instruction>, count: Box<Instruction>, value: Box<Instruction> },
    ArrayGetIndex { array: String, value: Box<Instruction> },
    GetArrayLength { array: String },
    VariableReferenceReadArrayEntry { array: Box<Instruction>, index: Box<Instruction> },
    VariableReferenceArrayAssignment { array: Box<Instruction>, index: Box<Instruction>, value: Box<Instruction> },
    VariableReferenceArrayCopy1 { dest: Box<Instruction>, source: Box<Instruction> },
    VariableReferenceArrayCopy2 { dest: Box<Instruction>, source: Box<Instruction>, count: Box<Instruction> },
    VariableReferenceArrayCopy3 {
        dest: Box<Instruction>,
        dest_index: Box<Instruction>,
        source: Box<Instruction>,
        source_index: Box<Instruction>,
        count: Box<Instruction>,
    },
    VariableReferenceArrayGetIndex { array: Box<Instruction>, value: Box<Instruction> },
    GetVariableReferenceArrayLength { array: Box<Instruction> },

    CastToInteger { value: Box<Instruction> },
    CastToFloatingPoint { value: Box<Instruction> },
    FormatString { format: Box<Instruction>, args: Expression },
    GetDataType { value: Box<Instruction> },

    Operator(String),

    IntLiteral(i32),
    FloatLiteral(f32),
    HexLiteral(u32),
    StringLiteral(String),
    BoolLiteral(bool),
    VariableRef(String),
    ImportRef(String),
    CalledFunctionRef(String),

    /// Preserved byte-exact, no higher-level meaning invented (open
    /// question, see DESIGN.md / SPEC_FULL §9).
    Unidentified57,
    Unidentified5b,
    Unidentified76,
    Unidentified7c,
    Unidentified7d,

    Unknown(u32),
}

/// Decodes the word at the reader's current position as one instruction,
/// applying the dispatch rule: called-function id, then variable
/// reference, then operator, then import reference, then opcode table,
/// falling back to `Unknown`.
pub fn decode_one(reader: &mut impl WordRead, version: KsmVersion, tables: &mut Tables) -> Result<Instruction> {
    let word = reader.peek()?.value;
    let raw_opcode = word & 0xFF;
    let disable_expr = (word & 0x100) != 0;

    if let Some(func) = tables.function_by_id(word) {
        reader.next()?;
        return Ok(Instruction::CalledFunctionRef(func.name.clone()));
    }
    if word & 0xFFFF_0000 != 0 {
        let ident = ident::Identifier::classify(word, version);
        reader.next()?;
        return match ident.scope {
            Scope::Import => Ok(Instruction::ImportRef(
                tables.imports_by_id.get(&word).map(|&i| tables.imports[i].name.clone()).unwrap_or_else(|| ident.alias()),
            )),
            _ => Ok(Instruction::VariableRef(variable_name_or_alias(tables, word, ident))),
        };
    }
    if let Some(glyph) = version.operator_glyph(raw_opcode) {
        reader.next()?;
        return Ok(Instruction::Operator(glyph.to_string()));
    }
    if raw_opcode > ident::MAX_OPCODE {
        reader.next()?;
        let ident = ident::Identifier::classify(word, version);
        return Ok(Instruction::ImportRef(
            tables.imports_by_id.get(&word).map(|&i| tables.imports[i].name.clone()).unwrap_or_else(|| ident.alias()),
        ));
    }

    let Some(op) = Opcode::from_id(raw_opcode, version) else {
        reader.next()?;
        return Ok(Instruction::Unknown(raw_opcode));
    };
    reader.next()?;

    use control::decode as control_decode;
    use call::decode as call_decode;
    use assignment::decode as assignment_decode;
    use arrays::decode as arrays_decode;
    use misc::decode as misc_decode;

    if let Some(i) = control_decode(op, disable_expr, reader, version, tables)? {
        return Ok(i);
    }
    if let Some(i) = call_decode(op, disable_expr, reader, version, tables)? {
        return Ok(i);
    }
    if let Some(i) = assignment_decode(op, disable_expr, reader, version, tables)? {
        return Ok(i);
    }
    if let Some(i) = arrays_decode(op, disable_expr, reader, version, tables)? {
        return Ok(i);
    }
    if let Some(i) = misc_decode(op, disable_expr, reader, version, tables)? {
        return Ok(i);
    }
    Err(anyhow!("opcode {op:?} matched but no category handled it"))
}

fn variable_name_or_alias(tables: &Tables, raw: u32, ident: ident::Identifier) -> String {
    if let Some(func) = tables.current_function() {
        if let Some(v) = func.declared_locals.iter().find(|v| v.identifier == Some(raw)) {
            return v.name.clone().unwrap_or_else(|| ident.alias());
        }
    }
    tables
        .global_vars_by_id
        .get(&raw)
        .and_then(|&i| tables.global_vars[i].name.clone())
        .unwrap_or_else(|| ident.alias())
}

pub fn encode_one(instr: &Instruction, writer: &mut WordWriter, tables: &mut Tables, version: KsmVersion) -> Result<()> {
    if control::encode(instr, writer, tables, version)? {
        return Ok(());
    }
    if call::encode(instr, writer, tables, version)? {
        return Ok(());
    }
    if assignment::encode(instr, writer, tables, version)? {
        return Ok(());
    }
    if arrays::encode(instr, writer, tables, version)? {
        return Ok(());
    }
    if misc::encode(instr, writer, tables, version)? {
        return Ok(());
    }
    match instr {
        Instruction::Operator(glyph) => {
            let op = version
                .operator_opcode(glyph)
                .ok_or_else(|| anyhow!("unknown operator glyph {glyph:?}"))?;
            writer.push(op);
            Ok(())
        }
        Instruction::Unknown(raw) => {
            writer.push(*raw);
            Ok(())
        }
        Instruction::VariableRef(name) => {
            let id = tables
                .lookup_variable_by_name(name)
                .unwrap_or_else(|| tables.declare_static(name.clone(), crate::symbols::DataType::None));
            writer.push(id);
            Ok(())
        }
        Instruction::ImportRef(name) => {
            let id = tables.use_import(name.clone(), crate::symbols::ImportDataType::Int);
            writer.push(id);
            Ok(())
        }
        Instruction::CalledFunctionRef(name) => {
            let id = tables.declare_function(name.clone(), true)?;
            writer.push(id);
            Ok(())
        }
        Instruction::IntLiteral(v) => {
            let id = tables.declare_const(crate::symbols::DataType::Int, crate::symbols::ConstValue::Int(*v));
            writer.push(id);
            Ok(())
        }
        Instruction::FloatLiteral(v) => {
            let id = tables.declare_const(crate::symbols::DataType::Float, crate::symbols::ConstValue::Float(*v));
            writer.push(id);
            Ok(())
        }
        Instruction::HexLiteral(v) => {
            let id = tables.declare_const(crate::symbols::DataType::Hex, crate::symbols::ConstValue::Int(*v as i32));
            writer.push(id);
            Ok(())
        }
        Instruction::StringLiteral(s) => {
            let id = tables.declare_const(crate::symbols::DataType::String, crate::symbols::ConstValue::Str(s.clone()));
            writer.push(id);
            Ok(())
        }
        Instruction::BoolLiteral(b) => {
            let id = tables.declare_const(crate::symbols::DataType::Bool, crate::symbols::ConstValue::Bool(*b));
            writer.push(id);
            Ok(())
        }
        other => Err(anyhow!("no encoder for instruction {other:?}")),
    }
}

/// Renders one instruction as CKSM text (used both standalone and as an
/// expression operand).
pub fn emit_text(instr: &Instruction) -> String {
    if let Some(s) = control::emit(instr) {
        return s;
    }
    if let Some(s) = call::emit(instr) {
        return s;
    }
    if let Some(s) = assignment::emit(instr) {
        return s;
    }
    if let Some(s) = arrays::emit(instr) {
        return s;
    }
    if let Some(s) = misc::emit(instr) {
        return s;
    }
    match instr {
        Instruction::Operator(glyph) => glyph.clone(),
        Instruction::IntLiteral(v) => v.to_string(),
        Instruction::FloatLiteral(v) => crate::word::format_float(*v),
        Instruction::HexLiteral(v) => format!("0x{v:X}"),
        Instruction::StringLiteral(s) => format!("\"{}\"", escape_string(s)),
        Instruction::BoolLiteral(b) => b.to_string(),
        Instruction::VariableRef(name) => name.clone(),
        Instruction::ImportRef(name) => name.clone(),
        Instruction::CalledFunctionRef(name) => name.clone(),
        Instruction::Unknown(raw) => format!("?0x{raw:X};"),
        other => format!("/* unrenderable: {other:?} */"),
    }
}

pub(crate) fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_opcode_renders_as_placeholder() {
        assert_eq!(emit_text(&Instruction::Unknown(0x63)), "?0x63;");
    }

    #[test]
    fn string_literal_escapes_quotes_and_newlines() {
        let s = Instruction::StringLiteral("a\"b\nc".to_string());
        assert_eq!(emit_text(&s), "\"a\\\"b\\nc\"");
    }
}
