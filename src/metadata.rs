//! Metadata document validation
//!
//! Pure function over the extracted entries: locate the document, parse it, then
//! check presence, type and shape of every declared field. The first failure is the
//! stage's single terminal error.

use crate::config::catalog::MetadataRules;
use crate::config::types::{ArtifactKind, ErrorCode, GateError, Result, Violation};
use crate::loader::{Entries, Lookup};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Validated metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub model_id: String,
    pub version: String,
    pub author: String,
    pub description: Option<String>,
    pub timestamp: Option<String>,
    pub expected_inputs: BTreeMap<String, Value>,
    pub output_format: BTreeMap<String, Value>,
    /// Dotted class name designating the model class (bytecode packages)
    pub model_class: Option<String>,
}

impl Metadata {
    /// Archive path of the designated class, `com.example.M` → `com/example/M.class`
    pub fn class_entry_name(&self) -> Option<String> {
        self.model_class
            .as_ref()
            .map(|class| format!("{}.class", class.replace('.', "/")))
    }

    /// Internal (slash) form of the designated class
    pub fn internal_class_name(&self) -> Option<String> {
        self.model_class.as_ref().map(|class| class.replace('.', "/"))
    }
}

/// Catalog patterns compiled once per gatekeeper
#[derive(Debug, Clone)]
pub struct MetadataPatterns {
    model_id: Regex,
    version: Regex,
    model_class: Regex,
}

impl MetadataPatterns {
    pub fn compile(rules: &MetadataRules) -> Result<Self> {
        let compile = |name: &str, pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| GateError::Catalog(format!("metadata.{}: {}", name, e)))
        };
        Ok(Self {
            model_id: compile("model_id_pattern", &rules.model_id_pattern)?,
            version: compile("version_pattern", &rules.version_pattern)?,
            model_class: compile("model_class_pattern", &rules.model_class_pattern)?,
        })
    }

    pub fn is_model_id(&self, candidate: &str) -> bool {
        self.model_id.is_match(candidate)
    }
}

/// Metadata validator bound to one catalog
pub struct MetadataValidator<'a> {
    rules: &'a MetadataRules,
    patterns: &'a MetadataPatterns,
}

impl<'a> MetadataValidator<'a> {
    pub fn new(rules: &'a MetadataRules, patterns: &'a MetadataPatterns) -> Self {
        Self { rules, patterns }
    }

    pub fn validate(
        &self,
        entries: &Entries,
        kind: ArtifactKind,
    ) -> std::result::Result<Metadata, Violation> {
        let document = self.parse_document(entries)?;

        let missing: Vec<&str> = self
            .required_fields(kind)
            .filter(|field| document.get(*field).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(Violation::critical(
                ErrorCode::MissingMetadataFields,
                format!(
                    "Missing required fields in {}: {}",
                    self.rules.entry_name,
                    missing.join(", ")
                ),
            ));
        }

        let model_id = self.model_id(&document)?;
        let version = self.version(&document)?;
        let author = non_empty_string(&document, "author")?;
        let expected_inputs = self.mapping(
            &document,
            "expected_inputs",
            &self.rules.required_inputs,
            ErrorCode::MissingInputFields,
        )?;
        let output_format = self.mapping(
            &document,
            "output_format",
            &self.rules.required_outputs,
            ErrorCode::MissingOutputFields,
        )?;
        let model_class = self.model_class(&document, kind)?;

        Ok(Metadata {
            model_id,
            version,
            author: author.unwrap_or_default(),
            description: optional_string(&document, "description")?,
            timestamp: optional_string(&document, "timestamp")?,
            expected_inputs,
            output_format,
            model_class,
        })
    }

    /// A pattern-valid `model_id` from the document, even when validation fails
    /// elsewhere. Used to label reports of rejected packages.
    pub fn best_effort_model_id(&self, entries: &Entries) -> Option<String> {
        let document = self.parse_document(entries).ok()?;
        let candidate = document.get("model_id")?.as_str()?.trim();
        if self.patterns.is_model_id(candidate) {
            Some(candidate.to_string())
        } else {
            None
        }
    }

    fn required_fields(&self, kind: ArtifactKind) -> impl Iterator<Item = &str> {
        let extra: &[String] = match kind {
            ArtifactKind::SourceArchive => &[],
            ArtifactKind::BytecodeArchive => &self.rules.bytecode_required_fields,
        };
        self.rules
            .required_fields
            .iter()
            .chain(extra.iter())
            .map(String::as_str)
    }

    fn parse_document(&self, entries: &Entries) -> std::result::Result<Map<String, Value>, Violation> {
        let bytes = match entries.find(&self.rules.entry_name) {
            Lookup::Found(_, bytes) => bytes,
            Lookup::Missing => {
                return Err(Violation::critical(
                    ErrorCode::MissingRequiredFiles,
                    format!("Model package missing required files: {}", self.rules.entry_name),
                ))
            }
            Lookup::Ambiguous(names) => {
                return Err(Violation::critical(
                    ErrorCode::MissingRequiredFiles,
                    format!(
                        "Model package has several candidates for {}: {}",
                        self.rules.entry_name,
                        names.join(", ")
                    ),
                ))
            }
        };

        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(Violation::critical(
                ErrorCode::InvalidJson,
                format!("{} must contain a JSON object", self.rules.entry_name),
            )),
            Err(e) => Err(Violation::critical(
                ErrorCode::InvalidJson,
                format!(
                    "{} is not valid JSON at line {}, column {}: {}",
                    self.rules.entry_name,
                    e.line(),
                    e.column(),
                    e
                ),
            )),
        }
    }

    fn model_id(&self, doc: &Map<String, Value>) -> std::result::Result<String, Violation> {
        let Some(value) = doc.get("model_id") else {
            return Ok(String::new());
        };
        let invalid = |msg: String| Violation::critical(ErrorCode::InvalidModelId, msg);

        let id = value
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("model_id must be a non-empty string".to_string()))?;
        if !self.patterns.model_id.is_match(id) {
            return Err(invalid(format!(
                "model_id '{}' does not match pattern {}",
                id, self.rules.model_id_pattern
            )));
        }
        Ok(id.to_string())
    }

    fn version(&self, doc: &Map<String, Value>) -> std::result::Result<String, Violation> {
        let Some(value) = doc.get("version") else {
            return Ok(String::new());
        };
        let invalid = |msg: String| Violation::critical(ErrorCode::InvalidVersion, msg);

        let version = value
            .as_str()
            .ok_or_else(|| invalid("version must be a string (e.g. '1.0.0')".to_string()))?;
        if !self.patterns.version.is_match(version) {
            return Err(invalid(format!(
                "version '{}' is not a semantic version (e.g. '1.0.0')",
                version
            )));
        }
        Ok(version.to_string())
    }

    fn mapping(
        &self,
        doc: &Map<String, Value>,
        field: &str,
        required: &[String],
        code: ErrorCode,
    ) -> std::result::Result<BTreeMap<String, Value>, Violation> {
        let Some(value) = doc.get(field) else {
            return Ok(BTreeMap::new());
        };
        let map = value.as_object().ok_or_else(|| {
            Violation::critical(code, format!("{} must be an object", field))
        })?;
        if map.is_empty() {
            return Err(Violation::critical(code, format!("{} cannot be empty", field)));
        }

        let missing: Vec<&str> = required
            .iter()
            .map(String::as_str)
            .filter(|key| !map.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(Violation::critical(
                code,
                format!("{} missing required fields: {}", field, missing.join(", ")),
            ));
        }

        Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn model_class(
        &self,
        doc: &Map<String, Value>,
        kind: ArtifactKind,
    ) -> std::result::Result<Option<String>, Violation> {
        let Some(class) = non_empty_string(doc, "model_class")? else {
            return Ok(None);
        };
        if !self.patterns.model_class.is_match(&class) {
            return Err(Violation::critical(
                ErrorCode::MissingMetadataFields,
                format!(
                    "model_class '{}' is not a fully qualified Java class name (e.g. com.example.MyModel)",
                    class
                ),
            ));
        }
        if kind == ArtifactKind::SourceArchive {
            log::debug!("model_class '{}' ignored for source package", class);
        }
        Ok(Some(class))
    }
}

fn non_empty_string(
    doc: &Map<String, Value>,
    field: &str,
) -> std::result::Result<Option<String>, Violation> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.clone())),
        Some(_) => Err(Violation::critical(
            ErrorCode::MissingMetadataFields,
            format!("{} must be a non-empty string", field),
        )),
    }
}

fn optional_string(
    doc: &Map<String, Value>,
    field: &str,
) -> std::result::Result<Option<String>, Violation> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Violation::critical(
            ErrorCode::MissingMetadataFields,
            format!("{} must be a string when present", field),
        )),
    }
}
