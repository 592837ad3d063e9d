//! Assembly entry point: turns CKSM body text plus HKSM header text back
//! into a [`KsmFile`].
//!
//! The header is a short declarative preamble (`#offset`, `#import`,
//! `static ...`) consumed up front to seed the symbol tables the body
//! parser then resolves references against; the body itself is handled by
//! [`parser::Parser`] over tokens from [`lexer::tokenize`].

pub mod lexer;
pub mod parser;

use anyhow::{anyhow, bail, Context, Result};

use crate::container::KsmFile;
use crate::ident;
use crate::instr::opcode::Opcode;
use crate::symbols::{Array, ArrayValue, ConstValue, DataType, ImportDataType, Scope, Tables, Variable};
use crate::version::KsmVersion;
use crate::word::{pack_bools, WordWriter};
use lexer::Token;

/// Assembles CKSM body text and HKSM header text into a full container.
///
/// The container version defaults to v1.3.0; a leading `#version v1.3.2;`
/// header directive selects v1.3.2 instead.
pub fn assemble(body: &str, header: &str) -> Result<KsmFile> {
    let version = detect_version(header)?;
    let mut tables = Tables::new(version, ident::DEFAULT_SLOT_OFFSET);
    parse_header(header, version, &mut tables).context("parsing header")?;

    let body_tokens = lexer::tokenize(body).context("tokenizing body")?;
    let mut body_parser = parser::Parser::new(body_tokens, &mut tables, version);
    body_parser.parse_body().context("parsing body")?;
    let mut instruction_words = body_parser.into_words();
    instruction_words.push(Opcode::EndFile.id(version).ok_or_else(|| anyhow!("EndFile opcode unavailable in this version"))?);

    tables.check_identifier_uniqueness().context("checking identifier uniqueness")?;

    Ok(KsmFile {
        version,
        summary: build_summary(version),
        functions: build_functions(&tables, version),
        static_vars: build_static_vars(&tables),
        arrays: build_arrays(&tables),
        const_vars: build_const_vars(&tables),
        imports: build_imports(&tables, version),
        global_vars: build_global_vars(&tables),
        instructions: build_instructions(instruction_words),
    })
}

fn detect_version(header: &str) -> Result<KsmVersion> {
    for line in header.lines() {
        let line = line.trim().trim_start_matches('#');
        if let Some(rest) = line.strip_prefix("version") {
            let rest = rest.trim().trim_end_matches(';').trim();
            return match rest {
                "v1.3.0" | "1.3.0" => Ok(KsmVersion::V1_3_0),
                "v1.3.2" | "1.3.2" => Ok(KsmVersion::V1_3_2),
                other => bail!("unknown #version directive value {other:?}"),
            };
        }
    }
    Ok(KsmVersion::V1_3_0)
}

/// Splits the header into `#`-prefixed directives and `static` declarations,
/// each terminated by `;`, and feeds them to the shared token lexer (after
/// stripping the leading `#`, which the body lexer has no notion of).
fn parse_header(header: &str, version: KsmVersion, tables: &mut Tables) -> Result<()> {
    let stripped: String = header.lines().map(|l| l.trim_start().trim_start_matches('#')).collect::<Vec<_>>().join("\n");
    let tokens = lexer::tokenize(&stripped).context("tokenizing header")?;

    let mut statements: Vec<Vec<Token>> = Vec::new();
    let mut current = Vec::new();
    for tok in tokens {
        if tok == Token::Punct(';') {
            if !current.is_empty() {
                statements.push(std::mem::take(&mut current));
            }
        } else {
            current.push(tok);
        }
    }
    if !current.is_empty() {
        statements.push(current);
    }

    for stmt in statements {
        let mut it = stmt.into_iter().peekable();
        let Some(Token::Ident(keyword)) = it.next() else { continue };
        match keyword.as_str() {
            "offset" => {
                let value = match it.next() {
                    Some(Token::Hex(v)) => v,
                    Some(Token::Int(v)) => v as u32,
                    other => bail!("expected offset value, found {other:?}"),
                };
                tables.slot_offset = value;
            }
            "version" => {
                // consumed by detect_version beforehand.
            }
            "import" => parse_import_directive(it, version, tables)?,
            "static" => parse_static_directive(it, tables)?,
            other => bail!("unknown header directive {other:?}"),
        }
    }
    Ok(())
}

fn parse_import_directive(mut it: std::iter::Peekable<std::vec::IntoIter<Token>>, version: KsmVersion, tables: &mut Tables) -> Result<()> {
    let kind = match it.next() {
        Some(Token::Ident(s)) => s,
        other => bail!("expected import data type, found {other:?}"),
    };
    let data_type = match kind.as_str() {
        "int" => ImportDataType::Int,
        "function" => ImportDataType::Function,
        "thread" => ImportDataType::Thread,
        other => bail!("unknown import data type {other:?}"),
    };
    let name = match it.next() {
        Some(Token::Ident(s)) => s,
        other => bail!("expected import name, found {other:?}"),
    };
    let id = tables.declare_import(name.clone(), data_type);
    if version.imports_have_file_id() {
        if matches!(it.peek(), Some(Token::Ident(s)) if s == "from") {
            it.next();
            let file_id = match it.next() {
                Some(Token::Hex(v)) => v,
                Some(Token::Int(v)) => v as u32,
                other => bail!("expected import fileID, found {other:?}"),
            };
            let unknown0 = if matches!(it.peek(), Some(Token::Punct('{'))) {
                it.next();
                let v = match it.next() {
                    Some(Token::Hex(v)) => v,
                    Some(Token::Int(v)) => v as u32,
                    other => bail!("expected import unknown0 value, found {other:?}"),
                };
                if !matches!(it.next(), Some(Token::Punct('}'))) {
                    bail!("unterminated import unknown0 braces");
                }
                v
            } else {
                0
            };
            let idx = tables.imports_by_id[&id];
            tables.imports[idx].file_id = Some(file_id);
            tables.imports[idx].unknown0 = Some(unknown0);
        }
    }
    Ok(())
}

fn parse_static_directive(mut it: std::iter::Peekable<std::vec::IntoIter<Token>>, tables: &mut Tables) -> Result<()> {
    let kind = match it.next() {
        Some(Token::Ident(s)) => s,
        other => bail!("expected static data type, found {other:?}"),
    };
    let data_type = static_type_from_keyword(&kind)?;
    let name = match it.next() {
        Some(Token::Ident(s)) => s,
        other => bail!("expected static variable name, found {other:?}"),
    };
    if let Some(&idx) = tables.global_vars_by_name.get(&name) {
        let existing = tables.global_vars[idx].data_type;
        if tables.global_vars[idx].scope == Scope::Static && existing != data_type {
            bail!("scope conflict: static {name:?} redeclared as {data_type:?}, was {existing:?}");
        }
    }
    let id = tables.declare_static(name.clone(), data_type);
    if matches!(it.peek(), Some(Token::Eq)) {
        it.next();
        let value = match (it.next(), data_type) {
            (Some(Token::Int(v)), DataType::Hex) => ConstValue::Int(v),
            (Some(Token::Hex(v)), DataType::Hex) => ConstValue::Int(v as i32),
            (Some(Token::Int(v)), _) => ConstValue::Int(v),
            (Some(Token::Float(v)), _) => ConstValue::Float(v),
            (Some(Token::Str(s)), _) => ConstValue::Str(s),
            (Some(Token::Ident(s)), _) if s == "true" => ConstValue::Bool(true),
            (Some(Token::Ident(s)), _) if s == "false" => ConstValue::Bool(false),
            (other, _) => bail!("unexpected static initializer {other:?}"),
        };
        let idx = tables.global_vars_by_id[&id];
        tables.global_vars[idx].value = Some(value);
    }
    Ok(())
}

fn static_type_from_keyword(keyword: &str) -> Result<DataType> {
    Ok(match keyword {
        "float" => DataType::Float,
        "int" => DataType::Int,
        "hex" => DataType::Hex,
        "string" => DataType::String,
        "alloc" => DataType::Alloc,
        "ref" => DataType::Ref,
        "ptr" => DataType::Ptr,
        "bool" => DataType::Bool,
        "func" => DataType::Func,
        "antistring" => DataType::Antistring,
        "me" => DataType::Me,
        "table" => DataType::Table,
        "none" => DataType::None,
        "noinit" => DataType::Noinit,
        "user" => DataType::User,
        other => bail!("unknown static data type keyword {other:?}"),
    })
}

fn build_summary(version: KsmVersion) -> Vec<u32> {
    let mut w = WordWriter::new();
    if version.to_word() > KsmVersion::V1_3_0_WORD {
        w.push(0xFFFF_FFFF);
        w.push(0); // TODO word, discarded on read same as in the original parser
        w.write_string("");
    } else {
        w.push(0);
    }
    w.into_words()
}

fn build_functions(tables: &Tables, version: KsmVersion) -> Vec<u32> {
    let mut w = WordWriter::new();
    w.push(tables.functions.len() as u32);
    for f in &tables.functions {
        w.push(f.identifier);
        w.write_string(&f.name);
        w.push(f.is_public as u32);
        if version.has_temp_var_flags() {
            w.push(f.temp_var_flags);
        }
        w.push(f.code_offset);
        w.push(f.code_end);
    }
    w.into_words()
}

fn build_static_vars(tables: &Tables) -> Vec<u32> {
    let statics: Vec<&Variable> = tables.global_vars.iter().filter(|v| v.scope == Scope::Static).collect();
    let mut w = WordWriter::new();
    w.push(statics.len() as u32);
    for v in statics {
        write_named_var(&mut w, v);
    }
    w.into_words()
}

fn build_global_vars(tables: &Tables) -> Vec<u32> {
    let globals: Vec<&Variable> = tables.global_vars.iter().filter(|v| v.scope == Scope::Global).collect();
    let mut w = WordWriter::new();
    w.push(globals.len() as u32);
    for v in globals {
        w.push(v.identifier.unwrap_or(0));
        w.write_string(v.name.as_deref().unwrap_or(""));
        w.push(v.data_type.into());
    }
    w.into_words()
}

fn write_named_var(w: &mut WordWriter, v: &Variable) {
    w.push(v.identifier.unwrap_or(0));
    w.write_string(v.name.as_deref().unwrap_or(""));
    w.push(v.data_type.into());
    w.push(v.value.is_some() as u32);
    if let Some(value) = &v.value {
        write_const_value(w, value);
    }
}

fn build_const_vars(tables: &Tables) -> Vec<u32> {
    let consts: Vec<&Variable> = tables.global_vars.iter().filter(|v| v.scope == Scope::Const).collect();
    let mut w = WordWriter::new();
    w.push(consts.len() as u32);
    for v in consts {
        w.push(v.identifier.unwrap_or(0));
        w.push(v.data_type.into());
        write_const_value(&mut w, v.value.as_ref().expect("const var always carries a literal"));
    }
    w.into_words()
}

fn write_const_value(w: &mut WordWriter, value: &ConstValue) {
    match value {
        ConstValue::Int(v) => w.push_i32(*v),
        ConstValue::Float(v) => w.push_f32(*v),
        ConstValue::Str(s) => w.write_string(s),
        ConstValue::Bool(b) => w.push(*b as u32),
    };
}

fn build_imports(tables: &Tables, version: KsmVersion) -> Vec<u32> {
    let mut w = WordWriter::new();
    w.push(tables.imports.len() as u32);
    for import in &tables.imports {
        w.push(import.identifier.unwrap_or(0));
        w.write_string(&import.name);
        w.push(import.data_type.into());
        w.push(import.times_used);
        if version.imports_have_file_id() {
            w.push(import.file_id.unwrap_or(0));
            w.push(import.unknown0.unwrap_or(0));
        }
    }
    w.into_words()
}

/// Every declared array, global or local to a function, is flattened into
/// this one section: the on-disk format has no per-array owning-function
/// reference (see `disasm::parse_arrays`).
fn build_arrays(tables: &Tables) -> Vec<u32> {
    let mut all: Vec<&Array> = tables.global_arrays.iter().collect();
    for f in &tables.functions {
        all.extend(f.local_arrays.iter());
    }
    let mut w = WordWriter::new();
    w.push(all.len() as u32);
    for a in all {
        w.push(a.identifier);
        w.push(a.address);
        w.write_string(&a.name);
        w.push(a.data_type.into());
        w.push(a.length);
        write_array_values(&mut w, &a.values);
    }
    w.into_words()
}

fn write_array_values(w: &mut WordWriter, values: &[ArrayValue]) {
    let Some(first) = values.first() else { return };
    match first {
        ArrayValue::Int(_) => {
            for v in values {
                if let ArrayValue::Int(i) = v {
                    w.push_i32(*i);
                }
            }
        }
        ArrayValue::Float(_) => {
            for v in values {
                if let ArrayValue::Float(f) = v {
                    w.push_f32(*f);
                }
            }
        }
        ArrayValue::Bool(_) => {
            let bools: Vec<bool> = values
                .iter()
                .map(|v| match v {
                    ArrayValue::Bool(b) => *b,
                    _ => false,
                })
                .collect();
            for word in pack_bools(&bools) {
                w.push(word);
            }
        }
        ArrayValue::Expr(_) => {
            for v in values {
                if let ArrayValue::Expr(words) = v {
                    w.push(words.len() as u32);
                    for &word in words {
                        w.push(word);
                    }
                }
            }
        }
    }
}

fn build_instructions(words: Vec<u32>) -> Vec<u32> {
    let mut w = WordWriter::new();
    w.push(1);
    for word in words {
        w.push(word);
    }
    w.into_words()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_minimal_function_and_round_trips_through_disasm() {
        let header = "#offset 0x100000;\n";
        let body = "public main() {\n    noop;\n    return;\n}\n";
        let file = assemble(body, header).unwrap();
        assert_eq!(file.version, KsmVersion::V1_3_0);
        let (out_body, out_header) = crate::disasm::disassemble(&file).unwrap();
        assert!(out_body.contains("public main() {"));
        assert!(out_body.contains("noop;"));
        assert!(out_header.starts_with("#offset"));
    }

    #[test]
    fn assembles_static_declarations_from_header() {
        let header = "#offset 0x100000;\nstatic int counter = 5;\n";
        let file = assemble("return;\n", header).unwrap();
        assert!(!file.static_vars.is_empty());
    }

    #[test]
    fn conflicting_static_redeclaration_is_a_scope_conflict() {
        let header = "#offset 0x100000;\nstatic int counter = 5;\nstatic float counter = 1.0;\n";
        let err = assemble("return;\n", header).unwrap_err();
        assert!(format!("{err:#}").contains("scope conflict"));
    }

    #[test]
    fn selects_v1_3_2_from_version_directive() {
        let header = "#version v1.3.2;\n#offset 0x100000;\n";
        let file = assemble("return;\n", header).unwrap();
        assert_eq!(file.version, KsmVersion::V1_3_2);
    }

    #[test]
    fn repeated_calls_to_a_declared_import_accumulate_times_used() {
        let header = "#offset 0x100000;\n#import function imp from 0x0 {0x0};\n";
        let body = "public main() {\n    imp();\n    imp();\n    imp();\n    return;\n}\n";
        use crate::word::{WordCursor, WordRead};
        let file = assemble(body, header).unwrap();
        let mut cur = WordCursor::new(&file.imports);
        let count = cur.next().unwrap().value;
        assert_eq!(count, 1);
        let id = cur.next().unwrap().value;
        assert_eq!(id, crate::ident::FIRST_IMPORT_ID);
        let _name = cur.read_string().unwrap();
        let _data_type = cur.next().unwrap().value;
        let times_used = cur.next().unwrap().value;
        assert_eq!(times_used, 3);
    }
}
