/// Rule catalog: every threshold, table and contract the gate enforces.
///
/// The catalog is plain data. Scanners and validators receive it by reference and
/// never carry literals of their own, so an alternate catalog can be loaded from
/// JSON without touching scanning logic.
use crate::config::presets;
use crate::config::types::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an explicit catalog file
pub const CATALOG_ENV: &str = "MODELGATE_CATALOG";

/// Catalog file looked up in the working directory
pub const CATALOG_FILE: &str = "modelgate.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuleCatalog {
    /// Catalog identifier, recorded in audit events
    pub id: String,
    pub limits: Limits,
    pub metadata: MetadataRules,
    pub source: SourceRules,
    pub bytecode: BytecodeRules,
}

/// Size, count and time ceilings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
    /// Raw package ceiling, enforced before any decompression
    pub max_package_bytes: u64,
    /// Total bytes produced by extraction
    pub max_decompressed_bytes: u64,
    /// Archive members, directories included
    pub max_entries: usize,
    /// Wall-clock budget of one run
    pub budget_ms: u64,
}

impl Limits {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }
}

/// Metadata document schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetadataRules {
    /// Fixed entry name of the metadata document
    pub entry_name: String,
    /// Keys every package must declare
    pub required_fields: Vec<String>,
    /// Extra keys bytecode packages must declare
    pub bytecode_required_fields: Vec<String>,
    pub model_id_pattern: String,
    pub version_pattern: String,
    /// Dotted fully qualified class name pattern for `model_class`
    pub model_class_pattern: String,
    pub required_inputs: Vec<String>,
    pub required_outputs: Vec<String>,
}

/// Contract and safety tables for interpreted source packages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourceRules {
    pub entry_name: String,
    pub required_class: String,
    pub required_method: String,
    /// Leading positional parameters, in order
    pub required_params: Vec<String>,
    pub allowed_imports: BTreeSet<String>,
    pub blocked_imports: BTreeSet<String>,
    pub blocked_builtins: BTreeSet<String>,
    pub file_methods: BTreeSet<String>,
    pub file_modules: BTreeSet<String>,
    pub network_methods: BTreeSet<String>,
    pub network_modules: BTreeSet<String>,
    /// I/O entry points of otherwise allowed modules, as `module.function`.
    /// Matched after import aliases are resolved; a trailing `*` matches a name
    /// prefix and the module `*` matches the method on any receiver.
    pub file_functions: BTreeSet<String>,
    pub network_functions: BTreeSet<String>,
    pub dangerous_attributes: BTreeSet<String>,
    pub dangerous_names: BTreeSet<String>,
}

/// Contract and safety tables for compiled bytecode packages.
///
/// Class names use the internal slash form (`java/io/File`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BytecodeRules {
    pub required_interface: String,
    pub required_method: String,
    pub required_descriptor: String,
    /// Package prefixes, matched at a package boundary
    pub blocked_packages: BTreeSet<String>,
    /// Exact class names
    pub blocked_classes: BTreeSet<String>,
    /// `owner.name` or `owner.name:descriptor`
    pub blocked_methods: BTreeSet<String>,
}

impl Default for RuleCatalog {
    fn default() -> Self {
        presets::alphaback_v1().clone()
    }
}

impl Default for Limits {
    fn default() -> Self {
        presets::alphaback_v1().limits.clone()
    }
}

impl Default for MetadataRules {
    fn default() -> Self {
        presets::alphaback_v1().metadata.clone()
    }
}

impl Default for SourceRules {
    fn default() -> Self {
        presets::alphaback_v1().source.clone()
    }
}

impl Default for BytecodeRules {
    fn default() -> Self {
        presets::alphaback_v1().bytecode.clone()
    }
}

impl RuleCatalog {
    /// Load a catalog from a JSON file. Missing sections fall back to the preset.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GateError::Catalog(format!("Failed to read catalog file {:?}: {}", path, e))
        })?;

        let catalog: RuleCatalog = serde_json::from_str(&content)
            .map_err(|e| GateError::Catalog(format!("Failed to parse catalog JSON: {}", e)))?;

        log::info!("Loaded rule catalog '{}' from {:?}", catalog.id, path);
        Ok(catalog)
    }

    /// Resolve the process-wide catalog: `$MODELGATE_CATALOG`, then
    /// `./modelgate.json`, then the built-in preset.
    pub fn load_default() -> Result<Self> {
        if let Ok(path) = std::env::var(CATALOG_ENV) {
            if !path.trim().is_empty() {
                return Self::load_from_file(path);
            }
        }

        let local = std::env::current_dir()
            .map_err(|e| GateError::Catalog(format!("Failed to get current directory: {}", e)))?
            .join(CATALOG_FILE);

        if local.exists() {
            return Self::load_from_file(local);
        }

        log::warn!(
            "No catalog file found ({} unset, {} absent); using preset '{}'",
            CATALOG_ENV,
            CATALOG_FILE,
            presets::DEFAULT_PRESET
        );
        Ok(presets::alphaback_v1().clone())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_preset_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"id": "tight", "limits": {{"max_package_bytes": 2048}}}}"#
        )
        .unwrap();

        let catalog = RuleCatalog::load_from_file(file.path()).unwrap();
        assert_eq!(catalog.id, "tight");
        assert_eq!(catalog.limits.max_package_bytes, 2048);
        // untouched fields inside a section fall back too
        assert_eq!(catalog.limits.max_entries, presets::alphaback_v1().limits.max_entries);
        assert_eq!(catalog.source, presets::alphaback_v1().source);
    }

    #[test]
    fn test_malformed_file_is_catalog_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        match RuleCatalog::load_from_file(file.path()) {
            Err(GateError::Catalog(msg)) => assert!(msg.contains("parse")),
            other => panic!("expected catalog error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_catalog_error() {
        let err = RuleCatalog::load_from_file("/nonexistent/modelgate.json").unwrap_err();
        assert!(matches!(err, GateError::Catalog(_)));
    }

    #[test]
    fn test_json_dump_reloads() {
        let json = RuleCatalog::default().to_json_pretty().unwrap();
        let back: RuleCatalog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RuleCatalog::default());
    }
}
