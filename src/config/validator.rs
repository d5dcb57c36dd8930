// Catalog validation at startup.
// A strict Gatekeeper refuses a catalog with errors; warnings are logged and kept.

use crate::config::catalog::RuleCatalog;
use crate::config::types::{GateError, Result};
use crate::lang::jvm::descriptor::MethodDescriptor;
use crate::scanner::bytecode::blocked_by;
use regex::Regex;

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Validate a catalog. With `strict` set, any error is returned as `GateError::Catalog`.
pub fn validate_catalog(catalog: &RuleCatalog, strict: bool) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_limits(catalog, &mut result);
    validate_metadata_rules(catalog, &mut result);
    validate_source_rules(catalog, &mut result);
    validate_bytecode_rules(catalog, &mut result);

    for warning in &result.warnings {
        log::warn!("catalog '{}': {}", catalog.id, warning);
    }

    if strict && !result.is_valid() {
        let error_msg = format!(
            "Catalog '{}' failed validation:\n{}",
            catalog.id,
            result.errors.join("\n")
        );
        return Err(GateError::Catalog(error_msg));
    }

    Ok(result)
}

fn validate_limits(catalog: &RuleCatalog, result: &mut ValidationResult) {
    let limits = &catalog.limits;

    if limits.max_package_bytes == 0 {
        result.add_error("limits.max_package_bytes cannot be zero".to_string());
    }
    if limits.max_decompressed_bytes == 0 {
        result.add_error("limits.max_decompressed_bytes cannot be zero".to_string());
    }
    if limits.max_entries == 0 {
        result.add_error("limits.max_entries cannot be zero".to_string());
    }
    if limits.budget_ms == 0 {
        result.add_error("limits.budget_ms cannot be zero".to_string());
    }

    if limits.max_decompressed_bytes < limits.max_package_bytes {
        result.add_warning(format!(
            "limits.max_decompressed_bytes ({}) is below max_package_bytes ({}); \
             well-compressed packages under the raw ceiling may be rejected",
            limits.max_decompressed_bytes, limits.max_package_bytes
        ));
    }
    if limits.budget_ms > 60_000 {
        result.add_warning(format!(
            "limits.budget_ms {} exceeds one minute, hosts usually time out first",
            limits.budget_ms
        ));
    }
}

fn validate_metadata_rules(catalog: &RuleCatalog, result: &mut ValidationResult) {
    let rules = &catalog.metadata;

    if rules.entry_name.trim().is_empty() {
        result.add_error("metadata.entry_name cannot be empty".to_string());
    }
    if rules.required_fields.is_empty() {
        result.add_warning("metadata.required_fields is empty".to_string());
    }

    for (name, pattern) in [
        ("model_id_pattern", &rules.model_id_pattern),
        ("version_pattern", &rules.version_pattern),
        ("model_class_pattern", &rules.model_class_pattern),
    ] {
        if let Err(e) = Regex::new(pattern) {
            result.add_error(format!("metadata.{} is not a valid regex: {}", name, e));
        }
    }
}

fn validate_source_rules(catalog: &RuleCatalog, result: &mut ValidationResult) {
    let rules = &catalog.source;

    for (name, value) in [
        ("entry_name", &rules.entry_name),
        ("required_class", &rules.required_class),
        ("required_method", &rules.required_method),
    ] {
        if value.trim().is_empty() {
            result.add_error(format!("source.{} cannot be empty", name));
        }
    }

    if rules.required_params.is_empty() {
        result.add_warning("source.required_params is empty, any signature is accepted".to_string());
    }

    let overlap: Vec<&str> = rules
        .allowed_imports
        .intersection(&rules.blocked_imports)
        .map(String::as_str)
        .collect();
    if !overlap.is_empty() {
        result.add_error(format!(
            "source imports both allowed and blocked: {}",
            overlap.join(", ")
        ));
    }

    if rules.allowed_imports.is_empty() {
        result.add_warning("source.allowed_imports is empty, every import is rejected".to_string());
    }

    for (table, patterns) in [
        ("file_functions", &rules.file_functions),
        ("network_functions", &rules.network_functions),
    ] {
        for pattern in patterns {
            if !is_function_pattern(pattern) {
                result.add_error(format!(
                    "source.{} entry '{}' must look like module.function, with '*' only \
                     as the whole module or at the end of the function",
                    table, pattern
                ));
            }
        }
    }
}

fn is_function_pattern(pattern: &str) -> bool {
    let (module, function) = match pattern.rsplit_once('.') {
        Some(parts) => parts,
        None => return false,
    };
    let name = function.strip_suffix('*').unwrap_or(function);
    let module_ok = module == "*"
        || module
            .split('.')
            .all(|part| !part.is_empty() && !part.contains('*'));
    module_ok && !name.is_empty() && !name.contains('*')
}

fn validate_bytecode_rules(catalog: &RuleCatalog, result: &mut ValidationResult) {
    let rules = &catalog.bytecode;

    if rules.required_interface.trim().is_empty() {
        result.add_error("bytecode.required_interface cannot be empty".to_string());
    }
    if rules.required_interface.contains('.') {
        result.add_error(format!(
            "bytecode.required_interface '{}' must use internal form (slashes)",
            rules.required_interface
        ));
    }
    if rules.required_method.trim().is_empty() {
        result.add_error("bytecode.required_method cannot be empty".to_string());
    }
    if let Err(e) = MethodDescriptor::parse(&rules.required_descriptor) {
        result.add_error(format!(
            "bytecode.required_descriptor '{}' is malformed: {}",
            rules.required_descriptor, e
        ));
    }

    for package in &rules.blocked_packages {
        if package.is_empty() || package.ends_with('/') || package.contains('.') {
            result.add_error(format!(
                "bytecode.blocked_packages entry '{}' must be a slash-separated package name",
                package
            ));
        }
    }

    for rule in &rules.blocked_methods {
        let target = rule.split(':').next().unwrap_or_default();
        match target.rsplit_once('.') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
                if let Some(block) = blocked_by(owner, rules) {
                    result.add_warning(format!(
                        "bytecode.blocked_methods entry '{}' never fires: its owner is blocked by '{}'",
                        rule, block
                    ));
                }
            }
            _ => result.add_error(format!(
                "bytecode.blocked_methods entry '{}' must look like owner.name[:descriptor]",
                rule
            )),
        }
        if let Some((_, descriptor)) = rule.split_once(':') {
            if MethodDescriptor::parse(descriptor).is_err() {
                result.add_error(format!(
                    "bytecode.blocked_methods entry '{}' has a malformed descriptor",
                    rule
                ));
            }
        }
    }
}
