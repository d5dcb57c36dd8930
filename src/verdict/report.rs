/// Report model
///
/// The status is derived, never set: a report is VALID exactly when no error was
/// recorded and every check of the fixed sequence passed.
use crate::config::types::{Check, Result, Violation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Status {
    #[serde(rename = "VALID")]
    Valid,
    #[serde(rename = "INVALID")]
    Invalid,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Valid => "VALID",
            Status::Invalid => "INVALID",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub model_id: String,
    pub status: Status,
    /// Capture time of report construction
    pub timestamp: DateTime<Utc>,
    pub checks_passed: Vec<Check>,
    pub errors: Vec<Violation>,
    pub execution_time_ms: u64,
}

impl Report {
    pub fn new(
        model_id: String,
        checks_passed: Vec<Check>,
        errors: Vec<Violation>,
        execution_time: Duration,
    ) -> Self {
        let complete = checks_passed.as_slice() == Check::SEQUENCE.as_slice();
        let status = if errors.is_empty() && complete {
            Status::Valid
        } else {
            Status::Invalid
        };
        Self {
            model_id,
            status,
            timestamp: Utc::now(),
            checks_passed,
            errors,
            execution_time_ms: u64::try_from(execution_time.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == Status::Valid
    }

    /// Same verdict, ignoring timestamp and timing
    pub fn same_verdict(&self, other: &Report) -> bool {
        self.model_id == other.model_id
            && self.status == other.status
            && self.checks_passed == other.checks_passed
            && self.errors == other.errors
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_json_compact(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ErrorCode;

    #[test]
    fn test_status_is_derived() {
        let full = Check::SEQUENCE.to_vec();
        assert!(Report::new("m".into(), full.clone(), vec![], Duration::ZERO).is_valid());

        let partial = Check::SEQUENCE[..2].to_vec();
        assert!(!Report::new("m".into(), partial, vec![], Duration::ZERO).is_valid());

        let error = Violation::critical(ErrorCode::DisallowedImport, "Disallowed import: os");
        assert!(!Report::new("m".into(), full, vec![error], Duration::ZERO).is_valid());
    }

    #[test]
    fn test_wire_format() {
        let report = Report::new(
            "momentum_v1".into(),
            vec![Check::FileSize, Check::Structure],
            vec![Violation::critical(
                ErrorCode::MissingMetadataFields,
                "Missing required fields in metadata.json: version",
            )],
            Duration::from_millis(12),
        );
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["status"], "INVALID");
        assert_eq!(value["checks_passed"], serde_json::json!(["file_size", "structure"]));
        assert_eq!(value["errors"][0]["code"], "MISSING_METADATA_FIELDS");
        assert_eq!(value["errors"][0]["severity"], "CRITICAL");
        assert!(value["errors"][0].get("location").is_none());
        assert_eq!(value["execution_time_ms"], 12);
        assert!(value["timestamp"].as_str().unwrap().contains('T'));

        let back = Report::from_json(&report.to_json_compact().unwrap()).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_location_serialization() {
        let v = Violation::critical(ErrorCode::DisallowedBuiltin, "eval").at_line(28);
        let value = serde_json::to_value(&v).unwrap();
        assert_eq!(value["location"], serde_json::json!({"line": 28}));
    }
}
