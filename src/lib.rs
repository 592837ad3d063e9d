#![forbid(unsafe_code)]

pub mod container;
pub mod disasm;
pub mod error;
pub mod ident;
pub mod instr;
pub mod symbols;
pub mod version;
pub mod word;

pub mod asm;

#[cfg(test)]
mod test;

pub use container::KsmFile;
pub use error::KsmError;
pub use version::KsmVersion;

use anyhow::Result;

/// Disassemble a parsed KSM container into body (CKSM) and header (HKSM) text.
pub fn disassemble(file: &KsmFile) -> Result<(String, String)> {
    disasm::disassemble(file)
}

/// Assemble CKSM body text plus its HKSM header text into a KSM container.
pub fn assemble(body: &str, header: &str) -> Result<KsmFile> {
    asm::assemble(body, header)
}
