//! KSM file framing: magic, version, section table, and the single
//! padding sentinel between the header and the first section body.
//!
//! This module only knows about word-level framing (§6 "KSM binary
//! format"); it has no opinion on what a section's words mean — turning
//! section words into symbol tables and decoded instructions is
//! `disasm`'s job, and the reverse is `asm`'s.

use anyhow::{ensure, Context, Result};

use crate::version::KsmVersion;
use crate::word::{check_padding, WordCursor, WordRead, WordWriter};

pub const MAGIC: u32 = 0x524D_534B;
pub const HEADER_WORDS: usize = 11;
pub const SECTION_COUNT: usize = 8;

/// Logical section order, fixed by the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Summary,
    Functions,
    StaticVars,
    Arrays,
    ConstVars,
    Imports,
    GlobalVars,
    Instructions,
}

pub const SECTION_ORDER: [SectionKind; SECTION_COUNT] = [
    SectionKind::Summary,
    SectionKind::Functions,
    SectionKind::StaticVars,
    SectionKind::Arrays,
    SectionKind::ConstVars,
    SectionKind::Imports,
    SectionKind::GlobalVars,
    SectionKind::Instructions,
];

/// A parsed KSM container: version plus the eight section word arrays.
/// Each section's words include its own leading item-count word.
#[derive(Debug, Clone)]
pub struct KsmFile {
    pub version: KsmVersion,
    pub summary: Vec<u32>,
    pub functions: Vec<u32>,
    pub static_vars: Vec<u32>,
    pub arrays: Vec<u32>,
    pub const_vars: Vec<u32>,
    pub imports: Vec<u32>,
    pub global_vars: Vec<u32>,
    pub instructions: Vec<u32>,
}

impl KsmFile {
    pub fn section(&self, kind: SectionKind) -> &[u32] {
        match kind {
            SectionKind::Summary => &self.summary,
            SectionKind::Functions => &self.functions,
            SectionKind::StaticVars => &self.static_vars,
            SectionKind::Arrays => &self.arrays,
            SectionKind::ConstVars => &self.const_vars,
            SectionKind::Imports => &self.imports,
            SectionKind::GlobalVars => &self.global_vars,
            SectionKind::Instructions => &self.instructions,
        }
    }

    /// Parses a full KSM file from its raw little-endian word array.
    pub fn read(words: &[u32]) -> Result<Self> {
        let mut cursor = WordCursor::new(words);
        let magic = cursor.next().context("reading magic")?.value;
        ensure!(magic == MAGIC, "bad magic {magic:#x}, expected {MAGIC:#x}");

        let version_word = cursor.next().context("reading version")?.value;
        let version = KsmVersion::from_word(version_word)?;

        let mut offsets = [0u32; SECTION_COUNT];
        for offset in &mut offsets {
            *offset = cursor.next().context("reading section offset table")?.value;
        }
        let total_words = cursor.next().context("reading total word count")?.value as usize;
        ensure!(
            total_words <= words.len(),
            "header claims {total_words} words but file has {}",
            words.len()
        );

        let padding = cursor.next().context("reading header padding word")?.value;
        check_padding(padding).context("header padding")?;

        let mut section_words = Vec::with_capacity(SECTION_COUNT);
        for (i, &kind) in SECTION_ORDER.iter().enumerate() {
            let start = offsets[i] as usize;
            let end = if i + 1 < SECTION_COUNT { offsets[i + 1] as usize } else { total_words };
            ensure!(start <= end && end <= words.len(), "section {kind:?} bounds [{start}, {end}) out of range");
            section_words.push(words[start..end].to_vec());
        }

        let mut iter = section_words.into_iter();
        Ok(KsmFile {
            version,
            summary: iter.next().unwrap(),
            functions: iter.next().unwrap(),
            static_vars: iter.next().unwrap(),
            arrays: iter.next().unwrap(),
            const_vars: iter.next().unwrap(),
            imports: iter.next().unwrap(),
            global_vars: iter.next().unwrap(),
            instructions: iter.next().unwrap(),
        })
    }

    /// Serializes the container back to its raw little-endian word array,
    /// recomputing the section offset table and total word count from the
    /// current section bodies.
    pub fn write(&self) -> Vec<u32> {
        let sections: [&[u32]; SECTION_COUNT] = [
            &self.summary,
            &self.functions,
            &self.static_vars,
            &self.arrays,
            &self.const_vars,
            &self.imports,
            &self.global_vars,
            &self.instructions,
        ];

        let mut offsets = [0u32; SECTION_COUNT];
        let mut cursor = (HEADER_WORDS + 1) as u32; // +1 for the padding word
        for (i, s) in sections.iter().enumerate() {
            offsets[i] = cursor;
            cursor += s.len() as u32;
        }
        let total_words = cursor;

        let mut writer = WordWriter::new();
        writer.push(MAGIC);
        writer.push(self.version.to_word());
        for offset in offsets {
            writer.push(offset);
        }
        writer.push(total_words);
        writer.push(0xFFFF_FFFF);
        for s in sections {
            for &w in s {
                writer.push(w);
            }
        }
        writer.into_words()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_file(version: KsmVersion) -> KsmFile {
        KsmFile {
            version,
            summary: vec![0],
            functions: vec![0],
            static_vars: vec![0],
            arrays: vec![0],
            const_vars: vec![0],
            imports: vec![0],
            global_vars: vec![0],
            instructions: vec![0],
        }
    }

    #[test]
    fn round_trips_through_write_and_read() {
        let file = empty_file(KsmVersion::V1_3_0);
        let words = file.write();
        let parsed = KsmFile::read(&words).unwrap();
        assert_eq!(parsed.version, KsmVersion::V1_3_0);
        assert_eq!(parsed.summary, file.summary);
        assert_eq!(parsed.instructions, file.instructions);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut words = empty_file(KsmVersion::V1_3_0).write();
        words[0] = 0xDEAD_BEEF;
        assert!(KsmFile::read(&words).is_err());
    }

    #[test]
    fn rejects_bad_padding() {
        let mut words = empty_file(KsmVersion::V1_3_0).write();
        words[HEADER_WORDS] = 0;
        assert!(KsmFile::read(&words).is_err());
    }
}
