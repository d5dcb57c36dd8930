//! Structure and signature validation
//!
//! Two entry points, one per pipeline stage: [`StructureValidator::required_entries`]
//! runs with extraction, [`StructureValidator::validate`] parses the designated entry
//! after metadata has been accepted and checks the required contract.

pub mod bytecode;
pub mod source;

use crate::config::catalog::RuleCatalog;
use crate::config::types::{ArtifactKind, BudgetExceeded, ErrorCode, Violation};
use crate::lang::CodeUnit;
use crate::loader::{Entries, Lookup};
use crate::metadata::Metadata;
use crate::pipeline::budget::Budget;

/// Why contract validation stopped
#[derive(Debug)]
pub enum Rejection {
    Invalid(Violation),
    OutOfTime(BudgetExceeded),
}

impl From<Violation> for Rejection {
    fn from(violation: Violation) -> Self {
        Rejection::Invalid(violation)
    }
}

impl From<BudgetExceeded> for Rejection {
    fn from(exceeded: BudgetExceeded) -> Self {
        Rejection::OutOfTime(exceeded)
    }
}

pub struct StructureValidator<'a> {
    catalog: &'a RuleCatalog,
}

impl<'a> StructureValidator<'a> {
    pub fn new(catalog: &'a RuleCatalog) -> Self {
        Self { catalog }
    }

    /// Every required entry is present and unambiguous.
    pub fn required_entries(&self, entries: &Entries, kind: ArtifactKind) -> Result<(), Violation> {
        let mut missing = Vec::new();

        let metadata_entry = self.catalog.metadata.entry_name.as_str();
        if let Some(name) = absent(entries, metadata_entry)? {
            missing.push(name);
        }

        match kind {
            ArtifactKind::SourceArchive => {
                if let Some(name) = absent(entries, &self.catalog.source.entry_name)? {
                    missing.push(name);
                }
            }
            ArtifactKind::BytecodeArchive => {
                if !entries.names().any(is_class_entry) {
                    missing.push("*.class".to_string());
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Violation::critical(
                ErrorCode::MissingRequiredFiles,
                format!("Model package missing required files: {}", missing.join(", ")),
            ))
        }
    }

    /// Parse the designated entry and confirm the required class and method.
    /// Companion classes of a jar are parsed here too, with the budget checked
    /// before each one.
    pub fn validate(
        &self,
        entries: &Entries,
        kind: ArtifactKind,
        metadata: &Metadata,
        budget: &Budget,
    ) -> Result<CodeUnit, Rejection> {
        match kind {
            ArtifactKind::SourceArchive => source::validate(entries, &self.catalog.source)
                .map(CodeUnit::Source)
                .map_err(Rejection::from),
            ArtifactKind::BytecodeArchive => {
                bytecode::validate(entries, &self.catalog.bytecode, metadata, budget)
                    .map(CodeUnit::Bytecode)
            }
        }
    }
}

pub(crate) fn is_class_entry(name: &str) -> bool {
    name.ends_with(".class")
}

fn absent(entries: &Entries, name: &str) -> Result<Option<String>, Violation> {
    match entries.find(name) {
        Lookup::Found(..) => Ok(None),
        Lookup::Missing => Ok(Some(name.to_string())),
        Lookup::Ambiguous(names) => Err(ambiguous(name, &names)),
    }
}

pub(crate) fn ambiguous(name: &str, candidates: &[&str]) -> Violation {
    Violation::critical(
        ErrorCode::MissingRequiredFiles,
        format!(
            "Model package has several candidates for {}: {}",
            name,
            candidates.join(", ")
        ),
    )
}

/// Look up a required entry, mapping absence onto `MISSING_REQUIRED_FILES`.
pub(crate) fn locate<'e>(entries: &'e Entries, name: &str) -> Result<(&'e str, &'e [u8]), Violation> {
    match entries.find(name) {
        Lookup::Found(path, bytes) => Ok((path, bytes)),
        Lookup::Missing => Err(Violation::critical(
            ErrorCode::MissingRequiredFiles,
            format!("Model package missing required files: {}", name),
        )),
        Lookup::Ambiguous(names) => Err(ambiguous(name, &names)),
    }
}
