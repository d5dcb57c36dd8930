//! Front ends for the two artifact kinds and the code unit they produce.

pub mod jvm;
pub mod python;

use jvm::ClassFile;
use python::ast::Module;

/// Parsed designated entry, produced by the structure validator and consumed by
/// the safety scanner. One variant per artifact kind.
#[derive(Debug, Clone)]
pub enum CodeUnit {
    Source(SourceUnit),
    Bytecode(BytecodeUnit),
}

#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Archive path of the parsed entry
    pub entry: String,
    pub module: Module,
}

#[derive(Debug, Clone)]
pub struct BytecodeUnit {
    pub entry: String,
    pub class: ClassFile,
    /// Every other class in the jar, by archive path
    pub companions: Vec<(String, ClassFile)>,
}

impl CodeUnit {
    pub fn entry(&self) -> &str {
        match self {
            CodeUnit::Source(unit) => &unit.entry,
            CodeUnit::Bytecode(unit) => &unit.entry,
        }
    }
}

impl BytecodeUnit {
    /// Designated class first, then companions in archive order
    pub fn classes(&self) -> impl Iterator<Item = &ClassFile> {
        std::iter::once(&self.class).chain(self.companions.iter().map(|(_, class)| class))
    }
}
