/// Bytecode packages: parse the class named by `model_class` and every companion
/// class, then check the declared interface and the step method descriptor.
use super::{is_class_entry, locate, Rejection};
use crate::config::catalog::BytecodeRules;
use crate::config::types::{ErrorCode, Violation};
use crate::lang::jvm::{parse_class, ClassFile};
use crate::lang::BytecodeUnit;
use crate::loader::Entries;
use crate::metadata::Metadata;
use crate::pipeline::budget::Budget;

pub fn validate(
    entries: &Entries,
    rules: &BytecodeRules,
    metadata: &Metadata,
    budget: &Budget,
) -> Result<BytecodeUnit, Rejection> {
    let (Some(entry_name), Some(expected)) =
        (metadata.class_entry_name(), metadata.internal_class_name())
    else {
        return Err(Violation::critical(
            ErrorCode::MissingMetadataFields,
            "model_class is required for bytecode packages",
        )
        .into());
    };

    let (entry, bytes) = locate(entries, &entry_name)?;
    let class = parse(entry, bytes)?;

    if class.this_class() != expected {
        return Err(Violation::critical(
            ErrorCode::MissingRequiredClass,
            format!(
                "{} declares class {}, expected {}",
                entry,
                class.this_class(),
                expected
            ),
        )
        .at_symbol(entry)
        .into());
    }

    if !class.interfaces().contains(&rules.required_interface.as_str()) {
        return Err(Violation::critical(
            ErrorCode::MissingRequiredClass,
            format!(
                "Class {} does not implement {}",
                expected, rules.required_interface
            ),
        )
        .at_symbol(expected.as_str())
        .into());
    }

    let candidates: Vec<&str> = class
        .methods_named(&rules.required_method)
        .map(|m| m.descriptor.as_str())
        .collect();
    if candidates.is_empty() {
        return Err(Violation::critical(
            ErrorCode::MissingRequiredMethod,
            format!("Class {} has no '{}' method", expected, rules.required_method),
        )
        .at_symbol(expected.as_str())
        .into());
    }
    if !candidates.contains(&rules.required_descriptor.as_str()) {
        return Err(Violation::critical(
            ErrorCode::InvalidMethodSignature,
            format!(
                "{}.{} must have descriptor {}; found {}",
                expected,
                rules.required_method,
                rules.required_descriptor,
                candidates.join(", ")
            ),
        )
        .at_symbol(format!("{}.{}", expected, rules.required_method))
        .into());
    }

    let mut companions = Vec::new();
    for (name, bytes) in entries.iter() {
        if name == entry || !is_class_entry(name) {
            continue;
        }
        budget.check()?;
        companions.push((name.to_string(), parse(name, bytes)?));
    }

    Ok(BytecodeUnit {
        entry: entry.to_string(),
        class,
        companions,
    })
}

fn parse(entry: &str, bytes: &[u8]) -> Result<ClassFile, Violation> {
    parse_class(bytes).map_err(|e| {
        Violation::critical(
            ErrorCode::SyntaxError,
            format!("Malformed class file {}: {}", entry, e),
        )
        .at_symbol(entry)
    })
}
