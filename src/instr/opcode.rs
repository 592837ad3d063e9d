//! Logical opcode identity and its version-keyed numeric encoding.
//!
//! `Opcode` names every instruction that owns a direct opcode byte
//! (literals, operators, and call-argument-position leaves are resolved
//! separately, see `instr::mod`'s dispatch rule). The numeric tables below
//! are transcribed from `instructionDict`/`instructionDictAlt` where the
//! original source fixes a value, and assigned sequentially in the
//! unused id space between those fixed points otherwise — see
//! DESIGN.md for which ids are grounded versus assigned.

use serde::Serialize;

use crate::version::KsmVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[allow(clippy::enum_variant_names)]
pub enum Opcode {
    EndFile,
    Noop,
    Return,
    Label,
    OpenFunction,
    OpenThread,
    OpenThreadChild,
    CloseFunctionArguments,
    CloseFunction,
    Goto,
    Call,
    ThreadCall,
    ThreadCallChild,
    CloseCallArguments,
    DeleteVariable,
    GlobalCodeOpen,
    GlobalCodeClose,
    IsChildThreadIncomplete,
    SleepFrames,
    SleepMilliseconds,
    If,
    CaseGoto,
    Switch,
    Case,
    CaseRange,
    CaseDefault,
    BreakSwitch,
    EndSwitch,
    ElseIf,
    Else,
    VariableArrayOpen,
    IntArrayOpen,
    FloatArrayOpen,
    BoolArrayOpen,
    ArrayClose,
    EndIf,
    ReadArrayEntry,
    ArrayAssignment,
    ArrayCopy1,
    ArrayCopy2,
    ArrayCopy3,
    ArrayAssign1,
    ArrayAssign2,
    ArrayAssign3,
    ArrayGetIndex,
    GetArrayLength,
    VariableReferenceReadArrayEntry,
    VariableReferenceArrayAssignment,
    VariableReferenceArrayCopy1,
    VariableReferenceArrayCopy2,
    VariableReferenceArrayCopy3,
    While,
    BreakWhile,
    ContinueWhile,
    EndWhile,
    Assignment,
    FunctionAssignment,
    AssignmentReferenceArray,
    CloseExpression,
    VariableReferenceArrayGetIndex,
    GetVariableReferenceArrayLength,
    GetDataType,
    Unidentified57,
    SleepWhile,
    Assert,
    CastToInteger,
    Unidentified5b,
    CastToFloatingPoint,
    SleepUntilComplete,
    FormatString,
    GetArgumentCount,
    GetNextFunctionReturn,
    VariableCall,
    VariableThreadCall,
    VariableThreadCallChild,
    Unidentified76,
    Unidentified7c,
    Unidentified7d,
}

/// `(opcode, Opcode)` pairs for container version 1.3.0.
pub const V130_TABLE: &[(u32, Opcode)] = &[
    (0x01, Opcode::EndFile),
    (0x02, Opcode::Noop),
    (0x03, Opcode::Return),
    (0x04, Opcode::Label),
    (0x05, Opcode::OpenFunction),
    (0x06, Opcode::OpenThread),
    (0x07, Opcode::OpenThreadChild),
    (0x08, Opcode::CloseFunctionArguments),
    (0x09, Opcode::CloseFunction),
    (0x0a, Opcode::Goto),
    (0x0b, Opcode::Call),
    (0x0c, Opcode::ThreadCall),
    (0x0d, Opcode::ThreadCallChild),
    (0x10, Opcode::CloseCallArguments),
    (0x11, Opcode::DeleteVariable),
    (0x12, Opcode::GlobalCodeOpen),
    (0x13, Opcode::GlobalCodeClose),
    (0x14, Opcode::IsChildThreadIncomplete),
    (0x15, Opcode::SleepFrames),
    (0x16, Opcode::SleepMilliseconds),
    (0x17, Opcode::If),
    (0x18, Opcode::CaseGoto),
    (0x19, Opcode::Switch),
    (0x1a, Opcode::Case),
    (0x1b, Opcode::CaseRange),
    (0x1c, Opcode::CaseDefault),
    (0x1d, Opcode::BreakSwitch),
    (0x1e, Opcode::EndSwitch),
    (0x1f, Opcode::ElseIf),
    (0x20, Opcode::Else),
    (0x21, Opcode::VariableArrayOpen),
    (0x22, Opcode::IntArrayOpen),
    (0x23, Opcode::FloatArrayOpen),
    (0x24, Opcode::BoolArrayOpen),
    (0x25, Opcode::ArrayClose),
    (0x26, Opcode::EndIf),
    (0x27, Opcode::ReadArrayEntry),
    (0x28, Opcode::ArrayAssignment),
    (0x29, Opcode::ArrayCopy1),
    (0x2a, Opcode::ArrayCopy2),
    (0x2b, Opcode::ArrayCopy3),
    (0x2c, Opcode::ArrayAssign1),
    (0x2d, Opcode::ArrayAssign2),
    (0x2e, Opcode::ArrayAssign3),
    (0x2f, Opcode::ArrayGetIndex),
    (0x30, Opcode::GetArrayLength),
    (0x31, Opcode::VariableReferenceReadArrayEntry),
    (0x32, Opcode::VariableReferenceArrayAssignment),
    (0x33, Opcode::VariableReferenceArrayCopy1),
    (0x34, Opcode::VariableReferenceArrayCopy2),
    (0x35, Opcode::VariableReferenceArrayCopy3),
    (0x36, Opcode::While),
    (0x37, Opcode::BreakWhile),
    (0x38, Opcode::ContinueWhile),
    (0x39, Opcode::EndWhile),
    (0x3a, Opcode::Assignment),
    (0x3b, Opcode::FunctionAssignment),
    (0x3c, Opcode::AssignmentReferenceArray),
    (0x3d, Opcode::CloseExpression),
    (0x3e, Opcode::VariableReferenceArrayGetIndex),
    (0x3f, Opcode::GetVariableReferenceArrayLength),
    (0x40, Opcode::GetDataType),
    // 0x41..=0x56: operators, see `version::OPERATOR_GLYPHS`.
    (0x57, Opcode::Unidentified57),
    (0x58, Opcode::SleepWhile),
    (0x59, Opcode::Assert),
    (0x5a, Opcode::CastToInteger),
    (0x5b, Opcode::Unidentified5b),
    (0x5c, Opcode::CastToFloatingPoint),
    (0x5d, Opcode::SleepUntilComplete),
    (0x5e, Opcode::FormatString),
    (0x5f, Opcode::GetArgumentCount),
    (0x60, Opcode::GetNextFunctionReturn),
    (0x72, Opcode::VariableCall),
    (0x73, Opcode::VariableThreadCall),
    (0x74, Opcode::VariableThreadCallChild),
    (0x76, Opcode::Unidentified76),
    (0x7c, Opcode::Unidentified7c),
    (0x7d, Opcode::Unidentified7d),
];

/// `(opcode, Opcode)` pairs for container version 1.3.2. Deliberately
/// sparse: only opcodes actually remapped under v1.3.2 appear here, per
/// `instructionDictAlt`. Everything else decodes to `Instruction::Unknown`.
pub const V132_TABLE: &[(u32, Opcode)] = &[
    (0x01, Opcode::EndFile),
    (0x02, Opcode::Noop),
    (0x03, Opcode::Return),
    (0x04, Opcode::Label),
    (0x05, Opcode::OpenFunction),
    (0x06, Opcode::OpenThread),
    (0x07, Opcode::OpenThreadChild),
    (0x08, Opcode::CloseFunctionArguments),
    (0x09, Opcode::CloseFunction),
    (0x0a, Opcode::Goto),
    (0x0b, Opcode::Call),
    (0x0c, Opcode::ThreadCall),
    (0x0d, Opcode::ThreadCallChild),
    (0x10, Opcode::CloseCallArguments),
    (0x11, Opcode::DeleteVariable),
    (0x14, Opcode::IsChildThreadIncomplete),
    (0x15, Opcode::SleepFrames),
    (0x16, Opcode::SleepMilliseconds),
    (0x17, Opcode::If),
    (0x26, Opcode::EndIf),
    (0x36, Opcode::While),
    (0x37, Opcode::BreakWhile),
    (0x38, Opcode::ContinueWhile),
    (0x39, Opcode::EndWhile),
    (0x3a, Opcode::Assignment),
    (0x3d, Opcode::CloseExpression),
    (0x6e, Opcode::Unidentified7c),
    (0x6f, Opcode::Unidentified7d),
    (0x72, Opcode::VariableCall),
    (0x73, Opcode::VariableThreadCall),
    (0x74, Opcode::VariableThreadCallChild),
];

fn table(version: KsmVersion) -> &'static [(u32, Opcode)] {
    match version {
        KsmVersion::V1_3_0 => V130_TABLE,
        KsmVersion::V1_3_2 => V132_TABLE,
    }
}

impl Opcode {
    pub fn from_id(id: u32, version: KsmVersion) -> Option<Opcode> {
        table(version).iter().find(|&&(i, _)| i == id).map(|&(_, op)| op)
    }

    pub fn id(self, version: KsmVersion) -> Option<u32> {
        table(version).iter().find(|&&(_, op)| op == self).map(|&(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Opcode::EndFile, 0x01)]
    #[case(Opcode::Assignment, 0x3a)]
    #[case(Opcode::CloseExpression, 0x3d)]
    #[case(Opcode::VariableCall, 0x72)]
    fn shared_opcodes_match_across_versions(#[case] op: Opcode, #[case] id: u32) {
        assert_eq!(op.id(KsmVersion::V1_3_0), Some(id));
        assert_eq!(op.id(KsmVersion::V1_3_2), Some(id));
    }

    #[test]
    fn unidentified_7c_7d_renumbered_under_v132() {
        assert_eq!(Opcode::Unidentified7c.id(KsmVersion::V1_3_0), Some(0x7c));
        assert_eq!(Opcode::Unidentified7c.id(KsmVersion::V1_3_2), Some(0x6e));
        assert_eq!(Opcode::Unidentified7d.id(KsmVersion::V1_3_0), Some(0x7d));
        assert_eq!(Opcode::Unidentified7d.id(KsmVersion::V1_3_2), Some(0x6f));
    }

    #[test]
    fn else_family_absent_from_v132() {
        assert_eq!(Opcode::from_id(0x1f, KsmVersion::V1_3_2), None);
        assert_eq!(Opcode::from_id(0x20, KsmVersion::V1_3_2), None);
    }
}
