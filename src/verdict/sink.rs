/// Persistence boundary for reports.
///
/// The pipeline never writes anywhere; callers hand finished reports to a
/// [`ReportSink`]. Two records are produced per run: the registry record keyed by
/// model id and the upload-status record.
use super::report::{Report, Status};
use crate::config::types::{Check, GateError, Result, Violation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Full report plus where the package came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryRecord {
    pub model_id: String,
    pub package_key: String,
    /// SHA-256 of the raw package bytes, hex
    pub sha256: String,
    pub status: Status,
    pub timestamp: DateTime<Utc>,
    pub checks_passed: Vec<Check>,
    pub errors: Vec<Violation>,
    pub execution_time_ms: u64,
    pub report: serde_json::Value,
}

impl RegistryRecord {
    pub fn new(report: &Report, package_key: &str, package_bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            model_id: report.model_id.clone(),
            package_key: package_key.to_string(),
            sha256: digest(package_bytes),
            status: report.status,
            timestamp: report.timestamp,
            checks_passed: report.checks_passed.clone(),
            errors: report.errors.clone(),
            execution_time_ms: report.execution_time_ms,
            report: serde_json::to_value(report)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadStatusRecord {
    pub model_id: String,
    pub validation_status: Status,
    pub timestamp: DateTime<Utc>,
    pub validation_complete: bool,
}

impl UploadStatusRecord {
    pub fn new(report: &Report) -> Self {
        Self {
            model_id: report.model_id.clone(),
            validation_status: report.status,
            timestamp: report.timestamp,
            validation_complete: true,
        }
    }
}

pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub trait ReportSink {
    fn record(&mut self, registry: &RegistryRecord, status: &UploadStatusRecord) -> Result<()>;
}

/// Appends one JSON object per line to a registry file and a status file.
pub struct JsonLinesSink {
    registry_path: PathBuf,
    status_path: PathBuf,
    registry: File,
    status: File,
}

impl JsonLinesSink {
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(registry_path: P, status_path: Q) -> Result<Self> {
        let open = |path: &Path| -> Result<File> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    GateError::Sink(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| GateError::Sink(format!("Failed to open {}: {}", path.display(), e)))
        };

        Ok(Self {
            registry: open(registry_path.as_ref())?,
            status: open(status_path.as_ref())?,
            registry_path: registry_path.as_ref().to_path_buf(),
            status_path: status_path.as_ref().to_path_buf(),
        })
    }

    /// Status file next to the registry: `registry.jsonl` → `registry.status.jsonl`
    pub fn beside<P: AsRef<Path>>(registry_path: P) -> Result<Self> {
        let registry_path = registry_path.as_ref();
        let status_path = registry_path.with_extension("status.jsonl");
        Self::open(registry_path, status_path)
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }
}

impl ReportSink for JsonLinesSink {
    fn record(&mut self, registry: &RegistryRecord, status: &UploadStatusRecord) -> Result<()> {
        let write = |file: &mut File, path: &Path, line: String| {
            writeln!(file, "{}", line)
                .and_then(|_| file.flush())
                .map_err(|e| GateError::Sink(format!("Failed to write {}: {}", path.display(), e)))
        };
        write(&mut self.registry, &self.registry_path, serde_json::to_string(registry)?)?;
        write(&mut self.status, &self.status_path, serde_json::to_string(status)?)?;
        log::info!(
            "recorded {} for model {} in {}",
            status.validation_status,
            registry.model_id,
            self.registry_path.display()
        );
        Ok(())
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub registry: Vec<RegistryRecord>,
    pub statuses: Vec<UploadStatusRecord>,
}

impl ReportSink for MemorySink {
    fn record(&mut self, registry: &RegistryRecord, status: &UploadStatusRecord) -> Result<()> {
        self.registry.push(registry.clone());
        self.statuses.push(status.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ErrorCode;
    use std::time::Duration;

    fn report() -> Report {
        Report::new(
            "momentum_v1".into(),
            vec![],
            vec![Violation::critical(ErrorCode::FileTooLarge, "too big")],
            Duration::from_millis(3),
        )
    }

    #[test]
    fn test_digest() {
        assert_eq!(
            digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_records_mirror_report() {
        let report = report();
        let registry = RegistryRecord::new(&report, "uploads/momentum.tar.gz", b"abc").unwrap();
        assert_eq!(registry.model_id, "momentum_v1");
        assert_eq!(registry.status, Status::Invalid);
        assert_eq!(registry.report["errors"][0]["code"], "FILE_TOO_LARGE");

        let status = UploadStatusRecord::new(&report);
        assert!(status.validation_complete);
        assert_eq!(status.timestamp, report.timestamp);
    }

    #[test]
    fn test_json_lines_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("registry.jsonl");
        let report = report();
        {
            let mut sink = JsonLinesSink::beside(&path).unwrap();
            let registry = RegistryRecord::new(&report, "k", b"").unwrap();
            let status = UploadStatusRecord::new(&report);
            sink.record(&registry, &status).unwrap();
            sink.record(&registry, &status).unwrap();
        }

        let registry = std::fs::read_to_string(&path).unwrap();
        assert_eq!(registry.lines().count(), 2);
        let first: RegistryRecord = serde_json::from_str(registry.lines().next().unwrap()).unwrap();
        assert_eq!(first.package_key, "k");

        let status = std::fs::read_to_string(dir.path().join("out").join("registry.status.jsonl")).unwrap();
        let record: UploadStatusRecord = serde_json::from_str(status.lines().next().unwrap()).unwrap();
        assert_eq!(record.validation_status, Status::Invalid);
    }
}
