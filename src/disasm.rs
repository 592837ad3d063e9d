//! Binary-to-text disassembly: populate symbol tables from a parsed
//! container's sections, then walk the instruction section into CKSM body
//! text and HKSM header text.

use std::collections::HashSet;

use anyhow::{Context, Result};

use crate::container::{KsmFile, SectionKind};
use crate::ident;
use crate::instr::{self, Instruction};
use crate::symbols::{Array, ArrayDataType, ArrayValue, ConstValue, DataType, Function, ImportDataType, Scope, Tables, Variable};
use crate::version::KsmVersion;
use crate::word::{unpack_bools, WordCursor, WordRead};

/// Disassembles a parsed container into `(body, header)` text.
pub fn disassemble(file: &KsmFile) -> Result<(String, String)> {
    let version = file.version;
    let mut tables = Tables::new(version, ident::DEFAULT_SLOT_OFFSET);

    parse_summary(file, version).context("parsing summary section")?;
    parse_functions(file, version, &mut tables).context("parsing function defs section")?;
    parse_static_vars(file, &mut tables).context("parsing static vars section")?;
    parse_arrays(file, &mut tables).context("parsing array defs section")?;
    parse_const_vars(file, &mut tables).context("parsing const vars section")?;
    parse_imports(file, version, &mut tables).context("parsing imports section")?;
    parse_global_vars(file, &mut tables).context("parsing global vars section")?;

    let body = disassemble_instructions(file, version, &mut tables).context("walking instruction section")?;
    let header = build_header(&tables, version);
    Ok((body, header))
}

fn parse_summary(file: &KsmFile, version: KsmVersion) -> Result<()> {
    let mut cur = WordCursor::new(file.section(SectionKind::Summary));
    let _item_count = cur.next()?.value;
    if version.to_word() > KsmVersion::V1_3_0_WORD {
        let _todo = cur.next()?.value;
        let _source_filename = cur.read_string()?;
    }
    Ok(())
}

fn parse_functions(file: &KsmFile, version: KsmVersion, tables: &mut Tables) -> Result<()> {
    let mut cur = WordCursor::new(file.section(SectionKind::Functions));
    let count = cur.next()?.value;
    for _ in 0..count {
        let identifier = cur.next()?.value;
        let name = cur.read_string()?;
        let is_public = cur.next()?.value != 0;
        let mut func = Function::new(name, identifier, is_public);
        func.temp_var_flags = if version.has_temp_var_flags() { cur.next()?.value } else { 0xFFFF_FFFF };
        func.code_offset = cur.next()?.value;
        func.code_end = cur.next()?.value;
        tables.insert_function(func);
    }
    Ok(())
}

fn parse_static_vars(file: &KsmFile, tables: &mut Tables) -> Result<()> {
    let mut cur = WordCursor::new(file.section(SectionKind::StaticVars));
    let count = cur.next()?.value;
    for _ in 0..count {
        let identifier = cur.next()?.value;
        let name = cur.read_string()?;
        let data_type = DataType::try_from(cur.next()?.value).context("static var data type tag")?;
        let has_value = cur.next()?.value != 0;
        let mut var = Variable::named(name, Scope::Static, data_type, identifier);
        if has_value {
            var.value = read_const_value(&mut cur, data_type)?;
        }
        tables.insert_variable(var);
    }
    Ok(())
}

fn parse_const_vars(file: &KsmFile, tables: &mut Tables) -> Result<()> {
    let mut cur = WordCursor::new(file.section(SectionKind::ConstVars));
    let count = cur.next()?.value;
    for _ in 0..count {
        let identifier = cur.next()?.value;
        let data_type = DataType::try_from(cur.next()?.value).context("const var data type tag")?;
        let value = read_const_value(&mut cur, data_type)?.context("const var missing literal payload")?;
        let mut var = Variable::new(Scope::Const, data_type, identifier);
        var.value = Some(value);
        tables.insert_variable(var);
    }
    Ok(())
}

fn parse_global_vars(file: &KsmFile, tables: &mut Tables) -> Result<()> {
    let mut cur = WordCursor::new(file.section(SectionKind::GlobalVars));
    let count = cur.next()?.value;
    for _ in 0..count {
        let identifier = cur.next()?.value;
        let name = cur.read_string()?;
        let data_type = DataType::try_from(cur.next()?.value).context("global var data type tag")?;
        tables.insert_variable(Variable::named(name, Scope::Global, data_type, identifier));
    }
    Ok(())
}

fn parse_imports(file: &KsmFile, version: KsmVersion, tables: &mut Tables) -> Result<()> {
    let mut cur = WordCursor::new(file.section(SectionKind::Imports));
    let count = cur.next()?.value;
    for _ in 0..count {
        let identifier = cur.next()?.value;
        let name = cur.read_string()?;
        let data_type = ImportDataType::try_from(cur.next()?.value).context("import data type tag")?;
        let times_used = cur.next()?.value;
        let mut import = crate::symbols::Import::new(name, data_type);
        import.identifier = Some(identifier);
        import.times_used = times_used;
        if version.imports_have_file_id() {
            import.file_id = Some(cur.next()?.value);
            import.unknown0 = Some(cur.next()?.value);
        }
        tables.insert_import(import);
    }
    Ok(())
}

/// Arrays are placed in the global table during disassembly: the on-disk
/// array-defs section carries no explicit owning-function reference to
/// recover a local scope from (see DESIGN.md, "array scope on disassembly").
fn parse_arrays(file: &KsmFile, tables: &mut Tables) -> Result<()> {
    let mut cur = WordCursor::new(file.section(SectionKind::Arrays));
    let count = cur.next()?.value;
    for _ in 0..count {
        let identifier = cur.next()?.value;
        let address = cur.next()?.value;
        let name = cur.read_string()?;
        let data_type = ArrayDataType::try_from(cur.next()?.value).context("array data type tag")?;
        let length = cur.next()?.value;
        let values = read_array_values(&mut cur, data_type, length)?;
        tables.add_global_array(Array { name, length, identifier, address, values, data_type });
    }
    Ok(())
}

fn read_array_values(cur: &mut WordCursor<'_>, data_type: ArrayDataType, length: u32) -> Result<Vec<ArrayValue>> {
    let length = length as usize;
    match data_type {
        ArrayDataType::Int => (0..length).map(|_| Ok(ArrayValue::Int(cur.read_i32()?))).collect(),
        ArrayDataType::Float => (0..length).map(|_| Ok(ArrayValue::Float(cur.read_f32()?))).collect(),
        ArrayDataType::Bool => {
            let word_count = length.div_ceil(4);
            let words: Vec<u32> = (0..word_count).map(|_| Ok(cur.next()?.value)).collect::<Result<_>>()?;
            Ok(unpack_bools(&words, length).into_iter().map(ArrayValue::Bool).collect())
        }
        ArrayDataType::Variable => (0..length)
            .map(|_| {
                let word_count = cur.next()?.value as usize;
                let words: Vec<u32> = (0..word_count).map(|_| Ok(cur.next()?.value)).collect::<Result<_>>()?;
                Ok(ArrayValue::Expr(words))
            })
            .collect(),
    }
}

fn read_const_value(cur: &mut WordCursor<'_>, data_type: DataType) -> Result<Option<ConstValue>> {
    Ok(match data_type {
        DataType::Int | DataType::Hex => Some(ConstValue::Int(cur.next()?.value as i32)),
        DataType::Float => Some(ConstValue::Float(cur.read_f32()?)),
        DataType::String | DataType::Antistring => Some(ConstValue::Str(cur.read_string()?)),
        DataType::Bool => Some(ConstValue::Bool(cur.next()?.value != 0)),
        _ => None,
    })
}

/// Tracks which function's local tables are active while walking the
/// instruction section, so variable/label references inside a function or
/// thread body resolve against that function's locals first.
fn track_function_scope(tables: &mut Tables, instr: &Instruction) {
    match instr {
        Instruction::OpenFunction { name, .. }
        | Instruction::OpenThread { name, .. }
        | Instruction::OpenThreadChild { name, .. } => {
            if let Some(&idx) = tables.functions_by_name.get(name) {
                tables.push_function(idx);
            }
        }
        Instruction::CloseFunction => {
            tables.pop_function();
        }
        _ => {}
    }
}

fn opens_block(instr: &Instruction) -> bool {
    matches!(
        instr,
        Instruction::OpenFunction { .. }
            | Instruction::OpenThread { .. }
            | Instruction::OpenThreadChild { .. }
            | Instruction::If { .. }
            | Instruction::ElseIf { .. }
            | Instruction::Else
            | Instruction::Switch { .. }
            | Instruction::While { .. }
    )
}

fn closes_block(instr: &Instruction) -> bool {
    matches!(
        instr,
        Instruction::CloseFunction
            | Instruction::EndIf
            | Instruction::EndSwitch
            | Instruction::EndWhile
            | Instruction::Else
            | Instruction::ElseIf { .. }
    )
}

fn disassemble_instructions(file: &KsmFile, version: KsmVersion, tables: &mut Tables) -> Result<String> {
    let mut cur = WordCursor::new(file.section(SectionKind::Instructions));
    let _item_count = cur.next()?.value;

    let mut lines = Vec::new();
    let mut indent: i32 = 0;
    while !cur.at_end() {
        let instr = instr::decode_one(&mut cur, version, tables)?;
        if matches!(instr, Instruction::EndFile) {
            break;
        }
        track_function_scope(tables, &instr);

        let text = instr::emit_text(&instr);
        if text.is_empty() {
            continue;
        }
        if closes_block(&instr) {
            indent = (indent - 1).max(0);
        }
        for line in text.split('\n') {
            lines.push(format!("{}{}", "    ".repeat(indent as usize), line));
        }
        if opens_block(&instr) {
            indent += 1;
        }
    }
    Ok(lines.join("\n"))
}

fn static_type_keyword(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Float => "float",
        DataType::Int => "int",
        DataType::Hex => "hex",
        DataType::String => "string",
        DataType::Alloc => "alloc",
        DataType::Ref => "ref",
        DataType::Ptr => "ptr",
        DataType::Bool => "bool",
        DataType::Func => "func",
        DataType::Antistring => "antistring",
        DataType::Me => "me",
        DataType::Table => "table",
        DataType::None => "none",
        DataType::Noinit => "noinit",
        DataType::User => "user",
    }
}

fn build_header(tables: &Tables, version: KsmVersion) -> String {
    let mut out = String::new();
    out.push_str(&format!("#offset 0x{:08X};\n", tables.slot_offset));

    for import in &tables.imports {
        let ty = match import.data_type {
            ImportDataType::Int => "int",
            ImportDataType::Function => "function",
            ImportDataType::Thread => "thread",
        };
        if version.imports_have_file_id() {
            out.push_str(&format!(
                "#import {ty} {} from 0x{:X} {{0x{:X}}};\n",
                import.name,
                import.file_id.unwrap_or(0),
                import.unknown0.unwrap_or(0)
            ));
        } else {
            out.push_str(&format!("#import {ty} {};\n", import.name));
        }
    }

    let mut seen_user = HashSet::new();
    for var in &tables.global_vars {
        if var.scope != Scope::Static {
            continue;
        }
        let name = var.name.clone().unwrap_or_else(|| var.alias.clone());
        if var.data_type == DataType::Func {
            continue;
        }
        if var.data_type == DataType::User {
            if !seen_user.insert(name.clone()) {
                continue;
            }
            out.push_str(&format!("static user {name};\n"));
            continue;
        }
        let ty = static_type_keyword(var.data_type);
        match &var.value {
            Some(ConstValue::Int(v)) if var.data_type == DataType::Hex => {
                out.push_str(&format!("static {ty} {name} = 0x{v:X};\n"));
            }
            Some(ConstValue::Int(v)) => out.push_str(&format!("static {ty} {name} = {v};\n")),
            Some(ConstValue::Float(v)) => out.push_str(&format!("static {ty} {name} = {};\n", crate::word::format_float(*v))),
            Some(ConstValue::Str(s)) => out.push_str(&format!("static {ty} {name} = \"{}\";\n", instr::escape_string(s))),
            Some(ConstValue::Bool(b)) => out.push_str(&format!("static {ty} {name} = {b};\n")),
            None => out.push_str(&format!("static {ty} {name};\n")),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::WordWriter;

    fn empty_section() -> Vec<u32> {
        vec![0]
    }

    #[test]
    fn disassembles_minimal_file_with_one_function() {
        let mut functions = WordWriter::new();
        functions.push(1); // item count
        functions.push(0x3010_0000); // identifier
        functions.write_string("main");
        functions.push(1); // is_public
        functions.push(0); // temp_var_flags
        functions.push(0); // code_offset
        functions.push(2); // code_end

        let mut instructions = WordWriter::new();
        instructions.push(1); // item count (unused beyond presence)
        instructions.push(crate::instr::opcode::Opcode::OpenFunction.id(KsmVersion::V1_3_0).unwrap());
        instructions.push(0x3010_0000);
        instructions.push(crate::instr::opcode::Opcode::CloseFunctionArguments.id(KsmVersion::V1_3_0).unwrap());
        instructions.push(crate::instr::opcode::Opcode::CloseFunction.id(KsmVersion::V1_3_0).unwrap());
        instructions.push(crate::instr::opcode::Opcode::EndFile.id(KsmVersion::V1_3_0).unwrap());

        let file = KsmFile {
            version: KsmVersion::V1_3_0,
            summary: empty_section(),
            functions: functions.into_words(),
            static_vars: empty_section(),
            arrays: empty_section(),
            const_vars: empty_section(),
            imports: empty_section(),
            global_vars: empty_section(),
            instructions: instructions.into_words(),
        };

        let (body, header) = disassemble(&file).unwrap();
        assert!(body.contains("public main() {"));
        assert!(body.contains('}'));
        assert!(header.starts_with("#offset"));
    }
}
