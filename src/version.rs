//! Container version and the version-keyed opcode/operator tables.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KsmVersion {
    V1_3_0,
    V1_3_2,
}

impl KsmVersion {
    pub const V1_3_0_WORD: u32 = 0x0001_0300;
    pub const V1_3_2_WORD: u32 = 0x0001_0302;

    pub fn from_word(word: u32) -> anyhow::Result<Self> {
        match word {
            Self::V1_3_0_WORD => Ok(Self::V1_3_0),
            Self::V1_3_2_WORD => Ok(Self::V1_3_2),
            other => Err(anyhow::anyhow!("unknown container version {other:#x}")),
        }
    }

    pub fn to_word(self) -> u32 {
        match self {
            Self::V1_3_0 => Self::V1_3_0_WORD,
            Self::V1_3_2 => Self::V1_3_2_WORD,
        }
    }

    /// Whether imports in this version carry `fileID`/`unknown0`.
    pub fn imports_have_file_id(self) -> bool {
        matches!(self, Self::V1_3_0)
    }

    /// Whether function definitions in this version carry an explicit
    /// `tempVarFlags` word (v1.3.2 implies all 32 bits set).
    pub fn has_temp_var_flags(self) -> bool {
        matches!(self, Self::V1_3_0)
    }

    /// Whether `while` conditions may be a full expression (false: always a
    /// single instruction, as in v1.3.2).
    pub fn while_condition_is_expression(self) -> bool {
        matches!(self, Self::V1_3_0)
    }

    pub fn operator_base(self) -> u32 {
        match self {
            Self::V1_3_0 => 0x41,
            Self::V1_3_2 => 0x3e,
        }
    }

    pub fn operator_max(self) -> u32 {
        self.operator_base() + OPERATOR_GLYPHS.len() as u32 - 1
    }

    pub fn operator_glyph(self, opcode: u32) -> Option<&'static str> {
        let base = self.operator_base();
        if opcode < base {
            return None;
        }
        OPERATOR_GLYPHS.get((opcode - base) as usize).copied()
    }

    pub fn operator_opcode(self, glyph: &str) -> Option<u32> {
        OPERATOR_GLYPHS
            .iter()
            .position(|&g| g == glyph)
            .map(|i| self.operator_base() + i as u32)
    }

    /// Whether `opcode` (the raw low byte of an instruction word) is known
    /// to this version's instruction table.
    pub fn known_opcode(self, opcode: u32) -> bool {
        match self {
            Self::V1_3_0 => (0x01..=0xA0).contains(&opcode) && !V1_3_0_GAPS.contains(&opcode),
            Self::V1_3_2 => V1_3_2_KNOWN.iter().any(|&(lo, hi)| (lo..=hi).contains(&opcode)),
        }
    }
}

/// Operator glyphs, same 22-entry order in both versions; only the base
/// opcode shifts.
pub const OPERATOR_GLYPHS: &[&str] = &[
    "(", ")", "||", "&&", "|", "&", "^", "<<", ">>", "==", "!=", ">", "<", ">=", "<=", "++", "--",
    "%", "+", "-", "*", "/",
];

/// Opcode gaps in the v1.3.0 table (ids with no assigned instruction class
/// between 0x01 and 0xA0), transcribed from the original opcode dictionary.
pub const V1_3_0_GAPS: &[u32] = &[0x00];

/// Inclusive opcode ranges the v1.3.2 table actually remaps; everything
/// else decodes to `Opcode::Unknown` under v1.3.2. Transcribed verbatim
/// from `instructionDictAlt`; see DESIGN.md "v1.3.2 opcode table gap".
pub const V1_3_2_KNOWN: &[(u32, u32)] = &[
    (0x01, 0x0d),
    (0x10, 0x11),
    (0x14, 0x17),
    (0x26, 0x26),
    (0x36, 0x3a),
    (0x3d, 0x3d),
    (0x6e, 0x6f),
    (0x72, 0x74),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_tables_agree_on_glyph_order() {
        for (i, glyph) in OPERATOR_GLYPHS.iter().enumerate() {
            let v130_op = KsmVersion::V1_3_0.operator_base() + i as u32;
            let v132_op = KsmVersion::V1_3_2.operator_base() + i as u32;
            assert_eq!(KsmVersion::V1_3_0.operator_glyph(v130_op), Some(*glyph));
            assert_eq!(KsmVersion::V1_3_2.operator_glyph(v132_op), Some(*glyph));
        }
    }

    #[test]
    fn version_word_round_trip() {
        assert_eq!(KsmVersion::from_word(0x00010300).unwrap(), KsmVersion::V1_3_0);
        assert_eq!(KsmVersion::from_word(0x00010302).unwrap(), KsmVersion::V1_3_2);
        assert!(KsmVersion::from_word(0x1234).is_err());
    }

    #[test]
    fn v132_known_opcodes_exclude_else_switch_family() {
        // 0x25 (else/elseif family in v1.3.0) has no counterpart in v1.3.2.
        assert!(!KsmVersion::V1_3_2.known_opcode(0x25));
        assert!(KsmVersion::V1_3_2.known_opcode(0x26));
    }
}
