/// Structured audit events for validation runs.
///
/// Every run gets a correlation id. Events are serialized to JSON and emitted
/// through the `log` facade at a level derived from their severity, so the host
/// decides where the audit trail goes.
use crate::config::types::{BudgetExceeded, Check, ErrorCode, Location, Violation};
use crate::verdict::Report;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const AUDIT_TARGET: &str = "modelgate::audit";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditSeverity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEventType {
    ValidationStarted,
    StagePassed,
    StageRejected,
    ViolationDetected,
    BudgetExhausted,
    ValidationFinished,
}

impl AuditEventType {
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::ValidationStarted => AuditSeverity::Low,
            AuditEventType::StagePassed => AuditSeverity::Low,
            AuditEventType::ValidationFinished => AuditSeverity::Low,
            AuditEventType::StageRejected => AuditSeverity::Medium,
            AuditEventType::ViolationDetected => AuditSeverity::High,
            AuditEventType::BudgetExhausted => AuditSeverity::High,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub package_key: String,
    pub details: String,
    pub check: Option<Check>,
    pub code: Option<ErrorCode>,
    pub location: Option<Location>,
}

impl AuditEvent {
    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.check = Some(check);
        self
    }

    pub fn with_violation(mut self, violation: &Violation) -> Self {
        self.code = Some(violation.code);
        self.location = violation.location.clone();
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut entry = serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339(),
            "event_type": self.event_type,
            "severity": self.severity,
            "run_id": self.run_id,
            "package_key": self.package_key,
            "details": self.details,
        });
        if let Some(check) = self.check {
            entry["check"] = serde_json::json!(check);
        }
        if let Some(code) = self.code {
            entry["code"] = serde_json::json!(code);
        }
        if let Some(location) = &self.location {
            entry["location"] = serde_json::to_value(location).unwrap_or(serde_json::Value::Null);
        }
        entry
    }
}

/// Audit trail of a single validation run
#[derive(Debug, Clone)]
pub struct AuditTrail {
    run_id: String,
    package_key: String,
}

impl AuditTrail {
    pub fn new(package_key: &str) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            package_key: package_key.to_string(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn event(&self, event_type: AuditEventType, details: impl Into<String>) -> AuditEvent {
        AuditEvent {
            event_type,
            severity: event_type.default_severity(),
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
            package_key: self.package_key.clone(),
            details: details.into(),
            check: None,
            code: None,
            location: None,
        }
    }

    pub fn emit(&self, event: AuditEvent) {
        let entry = event.to_json();
        match event.severity {
            AuditSeverity::High => {
                warn!(target: AUDIT_TARGET, "AUDIT {:?}: {}", event.event_type, entry)
            }
            AuditSeverity::Medium => {
                info!(target: AUDIT_TARGET, "AUDIT {:?}: {}", event.event_type, entry)
            }
            AuditSeverity::Low => {
                log::debug!(target: AUDIT_TARGET, "AUDIT {:?}: {}", event.event_type, entry)
            }
        }
    }

    pub fn started(&self, package_bytes: usize) {
        self.emit(self.event(
            AuditEventType::ValidationStarted,
            format!("received {} bytes", package_bytes),
        ));
    }

    pub fn stage_passed(&self, check: Check) {
        self.emit(
            self.event(AuditEventType::StagePassed, check.as_str())
                .with_check(check),
        );
    }

    pub fn stage_rejected(&self, check: Check, violation: &Violation) {
        self.emit(
            self.event(AuditEventType::StageRejected, violation.message.clone())
                .with_check(check)
                .with_violation(violation),
        );
    }

    pub fn violations(&self, violations: &[Violation]) {
        for violation in violations {
            self.emit(
                self.event(AuditEventType::ViolationDetected, violation.message.clone())
                    .with_check(Check::SafetyScan)
                    .with_violation(violation),
            );
        }
    }

    pub fn budget_exhausted(&self, check: Check, exceeded: &BudgetExceeded) {
        self.emit(
            self.event(AuditEventType::BudgetExhausted, exceeded.to_string())
                .with_check(check),
        );
    }

    pub fn finished(&self, report: &Report) {
        let event = self.event(
            AuditEventType::ValidationFinished,
            format!(
                "model {} {} after {} ms ({} error(s))",
                report.model_id,
                report.status,
                report.execution_time_ms,
                report.errors.len()
            ),
        );
        if report.is_valid() {
            self.emit(event);
        } else {
            self.emit(event.with_severity(AuditSeverity::Medium));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(AuditTrail::new("a").run_id(), AuditTrail::new("a").run_id());
    }

    #[test]
    fn test_event_payload() {
        let trail = AuditTrail::new("uploads/m.tar.gz");
        let violation =
            Violation::critical(ErrorCode::DisallowedImport, "Disallowed import: os").at_line(12);
        let event = trail
            .event(AuditEventType::ViolationDetected, violation.message.clone())
            .with_check(Check::SafetyScan)
            .with_violation(&violation);

        let json = event.to_json();
        assert_eq!(json["event_type"], "ViolationDetected");
        assert_eq!(json["severity"], "High");
        assert_eq!(json["run_id"], trail.run_id());
        assert_eq!(json["check"], "safety_scan");
        assert_eq!(json["code"], "DISALLOWED_IMPORT");
        assert_eq!(json["location"]["line"], 12);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let json = AuditTrail::new("k")
            .event(AuditEventType::ValidationStarted, "received 10 bytes")
            .to_json();
        assert!(json.get("check").is_none());
        assert!(json.get("code").is_none());
    }
}
