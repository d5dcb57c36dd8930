/// Core types shared by every stage of the gate
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Artifact family of a submitted package, decided by container format.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// gzip-compressed tarball of interpreted source files
    #[serde(rename = "source")]
    SourceArchive,
    /// jar-like zip of compiled class files
    #[serde(rename = "bytecode")]
    BytecodeArchive,
}

impl ArtifactKind {
    /// Identify the container family from its leading magic bytes.
    ///
    /// gzip streams start with `1f 8b`; zip archives start with a local file
    /// header (`PK\x03\x04`) or, when empty, an end-of-central-directory record
    /// (`PK\x05\x06`). Anything else is not a package we know how to open.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0x1f, 0x8b, ..] => Some(ArtifactKind::SourceArchive),
            [b'P', b'K', 0x03, 0x04, ..] | [b'P', b'K', 0x05, 0x06, ..] => {
                Some(ArtifactKind::BytecodeArchive)
            }
            _ => None,
        }
    }

    pub fn container_name(&self) -> &'static str {
        match self {
            ArtifactKind::SourceArchive => "gzip tarball",
            ArtifactKind::BytecodeArchive => "jar",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::SourceArchive => write!(f, "source"),
            ArtifactKind::BytecodeArchive => write!(f, "bytecode"),
        }
    }
}

/// How the caller wants the artifact kind decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KindHint {
    /// Decide from the container magic bytes
    #[default]
    Sniff,
    /// Caller declares the kind; content must agree with it
    Declared(ArtifactKind),
}

/// Error taxonomy - STABLE (v1 frozen)
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    #[serde(rename = "FILE_TOO_LARGE")]
    FileTooLarge,
    #[serde(rename = "MISSING_REQUIRED_FILES")]
    MissingRequiredFiles,
    #[serde(rename = "INVALID_JSON")]
    InvalidJson,
    #[serde(rename = "MISSING_METADATA_FIELDS")]
    MissingMetadataFields,
    #[serde(rename = "INVALID_MODEL_ID")]
    InvalidModelId,
    #[serde(rename = "INVALID_VERSION")]
    InvalidVersion,
    #[serde(rename = "MISSING_INPUT_FIELDS")]
    MissingInputFields,
    #[serde(rename = "MISSING_OUTPUT_FIELDS")]
    MissingOutputFields,
    #[serde(rename = "SYNTAX_ERROR")]
    SyntaxError,
    #[serde(rename = "MISSING_REQUIRED_CLASS")]
    MissingRequiredClass,
    #[serde(rename = "MISSING_REQUIRED_METHOD")]
    MissingRequiredMethod,
    #[serde(rename = "INVALID_METHOD_SIGNATURE")]
    InvalidMethodSignature,
    #[serde(rename = "DISALLOWED_IMPORT")]
    DisallowedImport,
    #[serde(rename = "IMPORT_NOT_WHITELISTED")]
    ImportNotWhitelisted,
    #[serde(rename = "DISALLOWED_BUILTIN")]
    DisallowedBuiltin,
    #[serde(rename = "DISALLOWED_FILE_OPERATION")]
    DisallowedFileOperation,
    #[serde(rename = "DISALLOWED_NETWORK_OPERATION")]
    DisallowedNetworkOperation,
    #[serde(rename = "DISALLOWED_PACKAGE_REFERENCE")]
    DisallowedPackageReference,
    #[serde(rename = "DANGEROUS_PATTERN")]
    DangerousPattern,
    #[serde(rename = "VALIDATION_TIMEOUT")]
    ValidationTimeout,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::MissingRequiredFiles => "MISSING_REQUIRED_FILES",
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::MissingMetadataFields => "MISSING_METADATA_FIELDS",
            ErrorCode::InvalidModelId => "INVALID_MODEL_ID",
            ErrorCode::InvalidVersion => "INVALID_VERSION",
            ErrorCode::MissingInputFields => "MISSING_INPUT_FIELDS",
            ErrorCode::MissingOutputFields => "MISSING_OUTPUT_FIELDS",
            ErrorCode::SyntaxError => "SYNTAX_ERROR",
            ErrorCode::MissingRequiredClass => "MISSING_REQUIRED_CLASS",
            ErrorCode::MissingRequiredMethod => "MISSING_REQUIRED_METHOD",
            ErrorCode::InvalidMethodSignature => "INVALID_METHOD_SIGNATURE",
            ErrorCode::DisallowedImport => "DISALLOWED_IMPORT",
            ErrorCode::ImportNotWhitelisted => "IMPORT_NOT_WHITELISTED",
            ErrorCode::DisallowedBuiltin => "DISALLOWED_BUILTIN",
            ErrorCode::DisallowedFileOperation => "DISALLOWED_FILE_OPERATION",
            ErrorCode::DisallowedNetworkOperation => "DISALLOWED_NETWORK_OPERATION",
            ErrorCode::DisallowedPackageReference => "DISALLOWED_PACKAGE_REFERENCE",
            ErrorCode::DangerousPattern => "DANGEROUS_PATTERN",
            ErrorCode::ValidationTimeout => "VALIDATION_TIMEOUT",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Violation severity. Every rule currently emits `Critical`; the variant set
/// leaves room for softer findings without touching the taxonomy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Severity {
    #[serde(rename = "CRITICAL")]
    #[default]
    Critical,
    #[serde(rename = "WARNING")]
    Warning,
}

/// Where a violation was found.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// 1-based source line
    Line(u32),
    /// Declaring class or `owner.member:descriptor` for bytecode units
    Symbol(String),
}

/// One concrete rule breach.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    pub code: ErrorCode,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Violation {
    pub fn critical(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: Severity::Critical,
            location: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.location = Some(Location::Line(line));
        self
    }

    pub fn at_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.location = Some(Location::Symbol(symbol.into()));
        self
    }
}

/// Fixed check sequence. `checks_passed` is always a prefix of [`Check::SEQUENCE`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Check {
    #[serde(rename = "file_size")]
    FileSize,
    #[serde(rename = "structure")]
    Structure,
    #[serde(rename = "metadata")]
    Metadata,
    #[serde(rename = "signature")]
    Signature,
    #[serde(rename = "safety_scan")]
    SafetyScan,
}

impl Check {
    pub const SEQUENCE: [Check; 5] = [
        Check::FileSize,
        Check::Structure,
        Check::Metadata,
        Check::Signature,
        Check::SafetyScan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Check::FileSize => "file_size",
            Check::Structure => "structure",
            Check::Metadata => "metadata",
            Check::Signature => "signature",
            Check::SafetyScan => "safety_scan",
        }
    }
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container loader failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("{what} is {actual} bytes, ceiling is {limit} bytes")]
    TooLarge {
        what: &'static str,
        actual: u64,
        limit: u64,
    },

    #[error("archive holds more than {limit} entries")]
    TooManyEntries { limit: usize },

    #[error("corrupt {container}: {reason}")]
    Corrupt {
        container: &'static str,
        reason: String,
    },
}

impl LoadError {
    pub fn corrupt(container: &'static str, reason: impl Into<String>) -> Self {
        LoadError::Corrupt {
            container,
            reason: reason.into(),
        }
    }

    /// Map onto the report taxonomy.
    pub fn into_violation(self) -> Violation {
        match self {
            LoadError::TooLarge { .. } | LoadError::TooManyEntries { .. } => {
                Violation::critical(ErrorCode::FileTooLarge, format!("Package rejected: {}", self))
            }
            LoadError::Corrupt { .. } => Violation::critical(
                ErrorCode::SyntaxError,
                format!("Unable to open package: {}", self),
            ),
        }
    }
}

/// Raised when the wall-clock budget of a run is spent.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("validation budget of {limit:?} exhausted after {elapsed:?}")]
pub struct BudgetExceeded {
    pub limit: Duration,
    pub elapsed: Duration,
}

/// System-level failures of the gate or its collaborators
#[derive(Error, Debug)]
pub enum GateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink error: {0}")]
    Sink(String),
}

/// Result type alias for gate operations
pub type Result<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_by_magic() {
        assert_eq!(
            ArtifactKind::sniff(&[0x1f, 0x8b, 0x08, 0x00]),
            Some(ArtifactKind::SourceArchive)
        );
        assert_eq!(
            ArtifactKind::sniff(b"PK\x03\x04rest"),
            Some(ArtifactKind::BytecodeArchive)
        );
        assert_eq!(
            ArtifactKind::sniff(b"PK\x05\x06"),
            Some(ArtifactKind::BytecodeArchive)
        );
        assert_eq!(ArtifactKind::sniff(b"\xca\xfe\xba\xbe"), None);
        assert_eq!(ArtifactKind::sniff(b""), None);
        assert_eq!(ArtifactKind::sniff(&[0x1f]), None);
    }

    #[test]
    fn test_error_code_wire_names() {
        let json = serde_json::to_string(&ErrorCode::DisallowedPackageReference).unwrap();
        assert_eq!(json, "\"DISALLOWED_PACKAGE_REFERENCE\"");
        assert_eq!(ErrorCode::ValidationTimeout.to_string(), "VALIDATION_TIMEOUT");
    }

    #[test]
    fn test_violation_location_serialization() {
        let v = Violation::critical(ErrorCode::DisallowedImport, "nope").at_line(12);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["code"], "DISALLOWED_IMPORT");
        assert_eq!(json["severity"], "CRITICAL");
        assert_eq!(json["location"]["line"], 12);

        let bare = Violation::critical(ErrorCode::InvalidJson, "bad");
        let json = serde_json::to_value(&bare).unwrap();
        assert!(json.get("location").is_none());
    }

    #[test]
    fn test_load_error_mapping() {
        let v = LoadError::TooManyEntries { limit: 4 }.into_violation();
        assert_eq!(v.code, ErrorCode::FileTooLarge);

        let v = LoadError::corrupt("jar", "bad header").into_violation();
        assert_eq!(v.code, ErrorCode::SyntaxError);
        assert!(v.message.contains("bad header"));
    }

    #[test]
    fn test_check_sequence_order() {
        let names: Vec<&str> = Check::SEQUENCE.iter().map(Check::as_str).collect();
        assert_eq!(
            names,
            vec!["file_size", "structure", "metadata", "signature", "safety_scan"]
        );
    }
}
