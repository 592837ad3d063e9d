//! `ksmc` — the KSM/CKSM command-line driver.
//!
//! A thin dispatcher, in the same shape as the teacher's `tools.rs`: parse
//! args, pick a path by file extension, call into the library, write the
//! result. All real work (codec, symbol resolution, back-patching) lives
//! in the library crate; this binary only owns file I/O and exit codes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use ksmc::instr::opcode::Opcode;
use ksmc::version::KsmVersion;
use ksmc::KsmFile;

/// Disassemble a `.bin` KSM container to CKSM/HKSM text, or assemble a
/// `.cksm` program (plus its sibling `.hksm` header) back into a binary.
#[derive(Clone, Debug, Parser)]
struct Args {
    /// input file: `*.bin` to disassemble, `*.cksm` to assemble
    input: PathBuf,

    /// print every opcode this binary knows, for both container versions
    #[arg(long = "idtest")]
    id_test: bool,

    /// print the identifier-class table from `ident::classify`
    #[arg(long = "idtest2")]
    id_test2: bool,

    /// print the textual syntax and both versions' numeric id for one
    /// opcode (by name) or `all`
    #[arg(long = "findinstruction", value_name = "NAME|all")]
    find_instruction: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.id_test {
        return run_id_test();
    }
    if args.id_test2 {
        return run_id_test2();
    }
    if let Some(target) = &args.find_instruction {
        return run_find_instruction(target);
    }

    match args.input.extension().and_then(std::ffi::OsStr::to_str) {
        Some("bin") => disassemble_file(&args.input),
        Some("cksm") => assemble_file(&args.input),
        other => bail!("unrecognized input extension {other:?}, expected .bin or .cksm"),
    }
}

fn disassemble_file(input: &Path) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let words = bytes_to_words(&bytes)?;
    let file = KsmFile::read(&words).with_context(|| format!("parsing {}", input.display()))?;
    let (body, header) = ksmc::disassemble(&file)?;

    let cksm_path = input.with_extension("cksm");
    let hksm_path = input.with_extension("hksm");
    fs::write(&cksm_path, body).with_context(|| format!("writing {}", cksm_path.display()))?;
    fs::write(&hksm_path, header).with_context(|| format!("writing {}", hksm_path.display()))?;
    println!("wrote {} and {}", cksm_path.display(), hksm_path.display());
    Ok(())
}

fn assemble_file(input: &Path) -> Result<()> {
    let hksm_path = input.with_extension("hksm");
    let body = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let header = fs::read_to_string(&hksm_path)
        .with_context(|| format!("reading sibling header {}", hksm_path.display()))?;

    let file = ksmc::assemble(&body, &header)?;
    let words = file.write();
    let bytes = words_to_bytes(&words);

    let mut out_path = input.to_path_buf();
    out_path.set_extension("re.bin");
    fs::write(&out_path, bytes).with_context(|| format!("writing {}", out_path.display()))?;
    println!("wrote {}", out_path.display());
    Ok(())
}

/// Raw KSM bytes are little-endian `u32`s packed with no padding; a
/// truncated trailing word is a format error, not silently dropped.
fn bytes_to_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        bail!("file length {} is not a multiple of 4 bytes", bytes.len());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 4);
    for &w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

const ALL_OPCODES: &[Opcode] = &[
    Opcode::EndFile,
    Opcode::Noop,
    Opcode::Return,
    Opcode::Label,
    Opcode::OpenFunction,
    Opcode::OpenThread,
    Opcode::OpenThreadChild,
    Opcode::CloseFunctionArguments,
    Opcode::CloseFunction,
    Opcode::Goto,
    Opcode::Call,
    Opcode::ThreadCall,
    Opcode::ThreadCallChild,
    Opcode::CloseCallArguments,
    Opcode::DeleteVariable,
    Opcode::GlobalCodeOpen,
    Opcode::GlobalCodeClose,
    Opcode::IsChildThreadIncomplete,
    Opcode::SleepFrames,
    Opcode::SleepMilliseconds,
    Opcode::If,
    Opcode::CaseGoto,
    Opcode::Switch,
    Opcode::Case,
    Opcode::CaseRange,
    Opcode::CaseDefault,
    Opcode::BreakSwitch,
    Opcode::EndSwitch,
    Opcode::ElseIf,
    Opcode::Else,
    Opcode::VariableArrayOpen,
    Opcode::IntArrayOpen,
    Opcode::FloatArrayOpen,
    Opcode::BoolArrayOpen,
    Opcode::ArrayClose,
    Opcode::EndIf,
    Opcode::ReadArrayEntry,
    Opcode::ArrayAssignment,
    Opcode::ArrayCopy1,
    Opcode::ArrayCopy2,
    Opcode::ArrayCopy3,
    Opcode::ArrayAssign1,
    Opcode::ArrayAssign2,
    Opcode::ArrayAssign3,
    Opcode::ArrayGetIndex,
    Opcode::GetArrayLength,
    Opcode::VariableReferenceReadArrayEntry,
    Opcode::VariableReferenceArrayAssignment,
    Opcode::VariableReferenceArrayCopy1,
    Opcode::VariableReferenceArrayCopy2,
    Opcode::VariableReferenceArrayCopy3,
    Opcode::While,
    Opcode::BreakWhile,
    Opcode::ContinueWhile,
    Opcode::EndWhile,
    Opcode::Assignment,
    Opcode::FunctionAssignment,
    Opcode::AssignmentReferenceArray,
    Opcode::CloseExpression,
    Opcode::VariableReferenceArrayGetIndex,
    Opcode::GetVariableReferenceArrayLength,
    Opcode::GetDataType,
    Opcode::Unidentified57,
    Opcode::SleepWhile,
    Opcode::Assert,
    Opcode::CastToInteger,
    Opcode::Unidentified5b,
    Opcode::CastToFloatingPoint,
    Opcode::SleepUntilComplete,
    Opcode::FormatString,
    Opcode::GetArgumentCount,
    Opcode::GetNextFunctionReturn,
    Opcode::VariableCall,
    Opcode::VariableThreadCall,
    Opcode::VariableThreadCallChild,
    Opcode::Unidentified76,
    Opcode::Unidentified7c,
    Opcode::Unidentified7d,
];

fn run_id_test() -> Result<()> {
    for op in ALL_OPCODES {
        let v130 = op.id(KsmVersion::V1_3_0).map(|id| format!("{id:#04x}")).unwrap_or_else(|| "-".into());
        let v132 = op.id(KsmVersion::V1_3_2).map(|id| format!("{id:#04x}")).unwrap_or_else(|| "-".into());
        println!("{op:?}: v1.3.0={v130} v1.3.2={v132}");
    }
    Ok(())
}

fn run_id_test2() -> Result<()> {
    use ksmc::ident::Scope;
    for scope in [
        Scope::Temp,
        Scope::TempStatic,
        Scope::Local,
        Scope::Static,
        Scope::Const,
        Scope::Global,
        Scope::ThreadFunction,
        Scope::Import,
        Scope::Opcode,
    ] {
        println!("{scope:?}");
    }
    Ok(())
}

fn run_find_instruction(target: &str) -> Result<()> {
    if target.eq_ignore_ascii_case("all") {
        return run_id_test();
    }
    let op = ALL_OPCODES
        .iter()
        .find(|op| format!("{op:?}").eq_ignore_ascii_case(target))
        .ok_or_else(|| anyhow!("no opcode named {target:?}"))?;
    println!(
        "{op:?}: v1.3.0={} v1.3.2={}",
        op.id(KsmVersion::V1_3_0).map(|id| format!("{id:#04x}")).unwrap_or_else(|| "-".into()),
        op.id(KsmVersion::V1_3_2).map(|id| format!("{id:#04x}")).unwrap_or_else(|| "-".into()),
    );
    Ok(())
}
