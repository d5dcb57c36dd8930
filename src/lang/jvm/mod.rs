//! JVM class-file reader.
//!
//! Only the parts needed for structural and reference checks are decoded: the
//! constant pool, the class header and the method table. Field and attribute
//! bodies are bounds-checked and skipped.

pub mod classfile;
pub mod descriptor;
pub mod reader;

pub use classfile::{ClassFile, Constant, MemberKind, MemberRef, MethodInfo};
pub use descriptor::{referenced_class, FieldType, MethodDescriptor};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassFormatError {
    #[error("truncated at offset {offset}: needed {wanted} more bytes")]
    Truncated { offset: usize, wanted: usize },

    #[error("{what} count {count} cannot fit in the remaining {remaining} bytes")]
    CountExceedsInput {
        what: &'static str,
        count: usize,
        remaining: usize,
    },

    #[error("{0} trailing bytes after class body")]
    TrailingBytes(usize),

    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),

    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("constant #{index} has unknown tag {tag}")]
    BadTag { index: u16, tag: u8 },

    #[error("constant #{index} is not valid modified UTF-8")]
    BadUtf8 { index: u16 },

    #[error("constant #{at} refers to unusable index #{index}")]
    BadIndex { at: u16, index: u16 },

    #[error("constant #{at} refers to #{index}: expected {expected}, found {found}")]
    WrongTag {
        at: u16,
        index: u16,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid descriptor '{0}'")]
    Descriptor(String),

    #[error("{0}")]
    Malformed(String),
}

/// Parse and validate a complete class file.
pub fn parse_class(bytes: &[u8]) -> Result<ClassFile, ClassFormatError> {
    ClassFile::parse(bytes)
}
