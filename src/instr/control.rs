//! Control flow: functions, threads, labels/goto, if/switch/while, sleeps.

use anyhow::Result;

use super::expr::{decode_expression, encode_expression, Terminator};
use super::{Instruction, Opcode};
use crate::symbols::Tables;
use crate::version::KsmVersion;
use crate::word::{WordRead, WordWriter};

fn label_name(tables: &Tables, id: u32) -> String {
    if let Some(f) = tables.current_function() {
        if let Some(&idx) = f.labels_by_id.get(&id) {
            return f.labels[idx].alias.clone();
        }
    }
    format!("label_{id:x}")
}

fn function_name(tables: &Tables, id: u32) -> String {
    tables.function_by_id(id).map(|f| f.name.clone()).unwrap_or_else(|| format!("func_{id:x}"))
}

#[allow(clippy::too_many_lines)]
pub fn decode(
    op: Opcode,
    disable_expr: bool,
    reader: &mut impl WordRead,
    version: KsmVersion,
    tables: &mut Tables,
) -> Result<Option<Instruction>> {
    Ok(Some(match op {
        Opcode::EndFile => Instruction::EndFile,
        Opcode::Noop => Instruction::Noop,
        Opcode::Return => Instruction::Return,
        Opcode::Label => {
            let id = reader.next()?.value;
            Instruction::Label { name: label_name(tables, id) }
        }
        Opcode::OpenFunction | Opcode::OpenThread | Opcode::OpenThreadChild => {
            let id = reader.next()?.value;
            let name = function_name(tables, id);
            let captures_or_args = decode_expression(reader, version, tables, Terminator::CloseFunctionArguments)?;
            match op {
                Opcode::OpenFunction => {
                    let is_public = tables.function_by_id(id).map(|f| f.is_public).unwrap_or(true);
                    Instruction::OpenFunction { name, is_public, args: captures_or_args }
                }
                Opcode::OpenThread => Instruction::OpenThread { name, captures: captures_or_args, label: None },
                _ => Instruction::OpenThreadChild { name, captures: captures_or_args, label: None },
            }
        }
        Opcode::CloseFunction => Instruction::CloseFunction,
        Opcode::CloseFunctionArguments => Instruction::CloseFunctionArguments,
        Opcode::Goto => {
            // Unlike most opcodes, bit 8 is never meaningful here: both
            // `gotoInstruction.readFromKsm` and its `caseGotoInstruction`
            // subclass assert it is always clear. The two forms are
            // distinguished purely by opcode byte (0x0a vs 0x0b).
            let id = reader.next()?.value;
            Instruction::Goto { label: label_name(tables, id) }
        }
        Opcode::CaseGoto => {
            let id = reader.next()?.value;
            Instruction::CaseGoto { label: label_name(tables, id) }
        }
        Opcode::If => {
            let cond = single_condition(reader, version, tables, disable_expr)?;
            reader.next()?; // padding word, always zero
            let _target = reader.next()?; // back-patched jump target, value unused on decode
            reader.next()?; // padding word, always zero
            Instruction::If { condition: Box::new(cond) }
        }
        Opcode::ElseIf => {
            let cond = single_condition(reader, version, tables, disable_expr)?;
            let _skip = reader.next()?; // back-patched jump target, unused on decode
            Instruction::ElseIf { condition: Box::new(cond) }
        }
        Opcode::Else => {
            let _skip = reader.next()?; // back-patched jump target, unused on decode
            Instruction::Else
        }
        Opcode::EndIf => Instruction::EndIf,
        Opcode::Switch => {
            let value = super::decode_one(reader, version, tables)?;
            reader.next()?; // second jump slot, always discarded (see encode's comment)
            let _target = reader.next()?;
            Instruction::Switch { value: Box::new(value) }
        }
        Opcode::Case => {
            let value = super::decode_one(reader, version, tables)?;
            let _target = reader.next()?;
            Instruction::Case { value: Box::new(value) }
        }
        Opcode::CaseRange => {
            let lower = super::decode_one(reader, version, tables)?;
            let upper = super::decode_one(reader, version, tables)?;
            let _target = reader.next()?;
            Instruction::CaseRange { lower: Box::new(lower), upper: Box::new(upper) }
        }
        Opcode::CaseDefault => {
            reader.next()?; // padding word, always zero
            let _target = reader.next()?;
            Instruction::CaseDefault
        }
        Opcode::BreakSwitch => Instruction::BreakSwitch,
        Opcode::EndSwitch => Instruction::EndSwitch,
        Opcode::While => {
            let cond = if version.while_condition_is_expression() && !disable_expr {
                let mut expr = decode_expression(reader, version, tables, Terminator::CloseExpression)?;
                if expr.len() == 1 {
                    expr.pop().unwrap()
                } else {
                    Instruction::Unknown(0)
                }
            } else {
                super::decode_one(reader, version, tables)?
            };
            let _target = reader.next()?;
            Instruction::While { condition: Box::new(cond) }
        }
        Opcode::BreakWhile => Instruction::BreakWhile,
        Opcode::ContinueWhile => Instruction::ContinueWhile,
        Opcode::EndWhile => Instruction::EndWhile,
        Opcode::DeleteVariable => {
            let id = reader.next()?.value;
            Instruction::DeleteVariable { name: format!("var_{id:X}") }
        }
        Opcode::IsChildThreadIncomplete => {
            let id = reader.next()?.value;
            Instruction::IsChildThreadIncomplete { name: function_name(tables, id) }
        }
        Opcode::SleepFrames => {
            let count = single_condition(reader, version, tables, disable_expr)?;
            Instruction::SleepFrames { count: Box::new(count) }
        }
        Opcode::SleepMilliseconds => {
            let count = single_condition(reader, version, tables, disable_expr)?;
            Instruction::SleepMilliseconds { count: Box::new(count) }
        }
        Opcode::GlobalCodeOpen => Instruction::GlobalCodeOpen,
        Opcode::GlobalCodeClose => Instruction::GlobalCodeClose,
        _ => return Ok(None),
    }))
}

/// Reads one operand, either as a full expression (collapsed, since a
/// condition/count position holds exactly one value) or as a single raw
/// instruction when the expression bit is disabled.
fn single_condition(
    reader: &mut impl WordRead,
    version: KsmVersion,
    tables: &mut Tables,
    disable_expr: bool,
) -> Result<Instruction> {
    if disable_expr {
        super::decode_one(reader, version, tables)
    } else {
        let mut expr = decode_expression(reader, version, tables, Terminator::CloseExpression)?;
        Ok(if expr.len() == 1 { expr.pop().unwrap() } else { Instruction::Operator(super::emit_expression_text(&expr)) })
    }
}

pub fn encode(instr: &Instruction, writer: &mut WordWriter, tables: &mut Tables, version: KsmVersion) -> Result<bool> {
    macro_rules! op {
        ($o:expr) => {
            writer.push($o.id(version).ok_or_else(|| anyhow::anyhow!("opcode not available in this version"))?)
        };
    }
    match instr {
        Instruction::EndFile => { op!(Opcode::EndFile); }
        Instruction::Noop => { op!(Opcode::Noop); }
        Instruction::Return => { op!(Opcode::Return); }
        Instruction::Label { name } => {
            op!(Opcode::Label);
            let id = tables.define_label(name.clone())?;
            writer.push(id);
        }
        Instruction::CloseFunction => { op!(Opcode::CloseFunction); }
        Instruction::CloseFunctionArguments => { op!(Opcode::CloseFunctionArguments); }
        Instruction::Else => {
            op!(Opcode::Else);
            writer.reserve();
        }
        Instruction::EndIf => { op!(Opcode::EndIf); }
        Instruction::CaseDefault => {
            op!(Opcode::CaseDefault);
            writer.push(0);
            writer.reserve();
        }
        Instruction::BreakSwitch => { op!(Opcode::BreakSwitch); }
        Instruction::EndSwitch => { op!(Opcode::EndSwitch); }
        Instruction::BreakWhile => { op!(Opcode::BreakWhile); }
        Instruction::ContinueWhile => { op!(Opcode::ContinueWhile); }
        Instruction::EndWhile => { op!(Opcode::EndWhile); }
        Instruction::GlobalCodeOpen => { op!(Opcode::GlobalCodeOpen); }
        Instruction::GlobalCodeClose => { op!(Opcode::GlobalCodeClose); }
        Instruction::Goto { label } => {
            op!(Opcode::Goto);
            let id = tables.declare_label(label.clone())?;
            writer.push(id);
        }
        Instruction::CaseGoto { label } => {
            op!(Opcode::CaseGoto);
            let id = tables.declare_label(label.clone())?;
            writer.push(id);
        }
        // The two padding words around the reserved jump slot are never read
        // back (see decode); `Parser::parse_if` is what actually resolves
        // the jump target when the construct closes, this path only keeps
        // standalone encode_one of an `If` tree word-count-compatible with
        // that decode.
        Instruction::If { condition } => {
            op!(Opcode::If);
            super::encode_one(condition, writer, tables, version)?;
            writer.push(0);
            writer.reserve();
            writer.push(0);
        }
        Instruction::ElseIf { condition } => {
            op!(Opcode::ElseIf);
            super::encode_one(condition, writer, tables, version)?;
            writer.reserve();
        }
        Instruction::Switch { value } => {
            op!(Opcode::Switch);
            super::encode_one(value, writer, tables, version)?;
            writer.reserve();
            writer.reserve();
        }
        Instruction::Case { value } => {
            op!(Opcode::Case);
            super::encode_one(value, writer, tables, version)?;
            writer.reserve();
        }
        Instruction::CaseRange { lower, upper } => {
            op!(Opcode::CaseRange);
            super::encode_one(lower, writer, tables, version)?;
            super::encode_one(upper, writer, tables, version)?;
            writer.reserve();
        }
        Instruction::While { condition } => {
            op!(Opcode::While);
            super::encode_one(condition, writer, tables, version)?;
            writer.reserve();
        }
        Instruction::DeleteVariable { name } => {
            op!(Opcode::DeleteVariable);
            let id = tables.lookup_variable_by_name(name).unwrap_or(0);
            writer.push(id);
        }
        Instruction::IsChildThreadIncomplete { name } => {
            op!(Opcode::IsChildThreadIncomplete);
            let id = tables.declare_function(name.clone(), true)?;
            writer.push(id);
        }
        Instruction::SleepFrames { count } => { op!(Opcode::SleepFrames); super::encode_one(count, writer, tables, version)?; }
        Instruction::SleepMilliseconds { count } => { op!(Opcode::SleepMilliseconds); super::encode_one(count, writer, tables, version)?; }
        Instruction::OpenFunction { name, args, .. } => {
            op!(Opcode::OpenFunction);
            let id = tables.declare_function(name.clone(), true)?;
            writer.push(id);
            encode_expression(args, writer, tables, version, Terminator::CloseFunctionArguments)?;
        }
        Instruction::OpenThread { name, captures, .. } => {
            op!(Opcode::OpenThread);
            let id = tables.declare_function(name.clone(), true)?;
            writer.push(id);
            encode_expression(captures, writer, tables, version, Terminator::CloseFunctionArguments)?;
        }
        Instruction::OpenThreadChild { name, captures, .. } => {
            op!(Opcode::OpenThreadChild);
            let id = tables.declare_function(name.clone(), true)?;
            writer.push(id);
            encode_expression(captures, writer, tables, version, Terminator::CloseFunctionArguments)?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

pub fn emit(instr: &Instruction) -> Option<String> {
    Some(match instr {
        Instruction::EndFile => String::new(),
        Instruction::Noop => "noop;".to_string(),
        Instruction::Return => "return;".to_string(),
        Instruction::Label { name } => format!("{name}:"),
        Instruction::OpenFunction { name, is_public, args } => {
            let vis = if *is_public { "public" } else { "private" };
            format!("{vis} {name}({}) {{", super::emit_expression_text(args))
        }
        Instruction::OpenThread { name, captures, label } => {
            let suffix = label.as_ref().map(|l| format!(" -> {l}")).unwrap_or_default();
            format!("thread {name}[{}]{suffix} {{", super::emit_expression_text(captures))
        }
        Instruction::OpenThreadChild { name, captures, label } => {
            let suffix = label.as_ref().map(|l| format!(" -> {l}")).unwrap_or_default();
            format!("childthread {name}[{}]{suffix} {{", super::emit_expression_text(captures))
        }
        Instruction::CloseFunction => "}".to_string(),
        Instruction::CloseFunctionArguments => String::new(),
        // The `*` marks `CaseGoto` alone; it carries no disable-expression
        // meaning for either form (see `decode`'s `Opcode::Goto` arm).
        Instruction::Goto { label } => format!("goto {label};"),
        Instruction::CaseGoto { label } => format!("goto* {label};"),
        Instruction::If { condition } => format!("if {} {{", super::emit_text(condition)),
        Instruction::ElseIf { condition } => format!("}} else if {} {{", super::emit_text(condition)),
        Instruction::Else => "} else {".to_string(),
        Instruction::EndIf => "}".to_string(),
        Instruction::Switch { value } => format!("switch {} {{", super::emit_text(value)),
        Instruction::Case { value } => format!("case {}:", super::emit_text(value)),
        Instruction::CaseRange { lower, upper } => {
            format!("case {} ... {}:", super::emit_text(lower), super::emit_text(upper))
        }
        Instruction::CaseDefault => "default:".to_string(),
        Instruction::BreakSwitch => "break;".to_string(),
        Instruction::EndSwitch => "}".to_string(),
        Instruction::While { condition } => format!("while {} {{", super::emit_text(condition)),
        Instruction::BreakWhile => "break;".to_string(),
        Instruction::ContinueWhile => "continue;".to_string(),
        Instruction::EndWhile => "}".to_string(),
        Instruction::DeleteVariable { name } => format!("delete {name};"),
        Instruction::IsChildThreadIncomplete { name } => format!("is_incomplete {name};"),
        Instruction::SleepFrames { count } => format!("sleep_frames {};", super::emit_text(count)),
        Instruction::SleepMilliseconds { count } => format!("sleep_milliseconds {};", super::emit_text(count)),
        Instruction::GlobalCodeOpen => "[".to_string(),
        Instruction::GlobalCodeClose => "]".to_string(),
        _ => return None,
    })
}
