use super::budget::Budget;
use super::{model_id_from_key, Gatekeeper, RawPackage};
use crate::config::types::{BudgetExceeded, Check, ErrorCode, KindHint, Violation};
use crate::lang::CodeUnit;
use crate::loader::{self, Package};
use crate::metadata::Metadata;
use crate::observability::audit::AuditTrail;
use crate::scanner::SafetyScanner;
use crate::structure::{Rejection, StructureValidator};
use crate::verdict::Report;
use std::time::Instant;

// Validation run as a type-state chain
//
// The stage order is fixed:
//
// Received -> Sized -> Unpacked -> Described -> Verified -> Report
//
// Each transition consumes the prior state. A fail-fast stage either returns the
// next state or a [`Halt`] carrying exactly one terminal error, so a stage cannot
// run twice and none can be skipped. Only `Validation<Verified>` can scan.

/// Type-state: bytes received, nothing inspected yet
pub struct Received<'p> {
    bytes: &'p [u8],
    hint: KindHint,
}

/// Type-state: raw length is under the package ceiling
pub struct Sized<'p> {
    bytes: &'p [u8],
    hint: KindHint,
}

/// Type-state: container extracted and required entries present
pub struct Unpacked {
    package: Package,
}

/// Type-state: metadata document accepted
pub struct Described {
    package: Package,
    metadata: Metadata,
}

/// Type-state: designated entry parsed and its contract confirmed
pub struct Verified {
    unit: CodeUnit,
}

/// One validation run in state `S`
pub struct Validation<'g, S> {
    gate: &'g Gatekeeper,
    ledger: Ledger,
    state: S,
}

/// Result of a fail-fast transition
pub type Step<'g, S> = std::result::Result<Validation<'g, S>, Halt>;

/// Everything a run accumulates regardless of its state
#[derive(Debug)]
pub struct Ledger {
    trail: AuditTrail,
    package_key: String,
    started: Instant,
    budget: Budget,
    checks: Vec<Check>,
    model_id: Option<String>,
}

/// A run stopped by a fail-fast stage or by its budget
#[derive(Debug)]
pub struct Halt {
    ledger: Ledger,
    errors: Vec<Violation>,
}

impl Ledger {
    fn new(package_key: &str, budget: std::time::Duration) -> Self {
        let started = Instant::now();
        Self {
            trail: AuditTrail::new(package_key),
            package_key: package_key.to_string(),
            started,
            budget: Budget::since(started, budget),
            checks: Vec::with_capacity(Check::SEQUENCE.len()),
            model_id: None,
        }
    }

    pub fn checks_passed(&self) -> &[Check] {
        &self.checks
    }

    fn pass(&mut self, check: Check) {
        self.checks.push(check);
        self.trail.stage_passed(check);
    }

    /// Budget gate in front of `check`
    fn within_budget(self, check: Check) -> std::result::Result<Self, Halt> {
        match self.budget.check() {
            Ok(()) => Ok(self),
            Err(exceeded) => Err(self.out_of_time(check, exceeded)),
        }
    }

    fn reject(self, check: Check, violation: Violation) -> Halt {
        self.trail.stage_rejected(check, &violation);
        Halt {
            ledger: self,
            errors: vec![violation],
        }
    }

    fn out_of_time(self, check: Check, exceeded: BudgetExceeded) -> Halt {
        self.trail.budget_exhausted(check, &exceeded);
        let violation = Violation::critical(
            ErrorCode::ValidationTimeout,
            format!(
                "Validation exceeded time budget of {} ms during {} ({} ms elapsed)",
                exceeded.limit.as_millis(),
                check,
                exceeded.elapsed.as_millis()
            ),
        );
        Halt {
            ledger: self,
            errors: vec![violation],
        }
    }

    fn finish(self, errors: Vec<Violation>) -> Report {
        let model_id = self
            .model_id
            .unwrap_or_else(|| model_id_from_key(&self.package_key));
        let report = Report::new(model_id, self.checks, errors, self.started.elapsed());
        self.trail.finished(&report);
        report
    }
}

impl Halt {
    pub fn errors(&self) -> &[Violation] {
        &self.errors
    }

    pub fn checks_passed(&self) -> &[Check] {
        self.ledger.checks_passed()
    }

    pub fn into_report(self) -> Report {
        self.ledger.finish(self.errors)
    }
}

impl<'g, S> Validation<'g, S> {
    pub fn checks_passed(&self) -> &[Check] {
        self.ledger.checks_passed()
    }

    pub fn run_id(&self) -> &str {
        self.ledger.trail.run_id()
    }
}

impl<'g, 'p> Validation<'g, Received<'p>> {
    /// Start the clock for one package
    pub fn receive(gate: &'g Gatekeeper, package: &'p RawPackage) -> Self {
        let ledger = Ledger::new(&package.key, gate.catalog().limits.budget());
        ledger.trail.started(package.bytes.len());
        Self {
            gate,
            ledger,
            state: Received {
                bytes: &package.bytes,
                hint: package.hint,
            },
        }
    }

    /// Raw ceiling. O(1), so it runs ahead of the first budget gate.
    pub fn check_size(self) -> Step<'g, Sized<'p>> {
        let Validation {
            gate,
            mut ledger,
            state,
        } = self;

        let limits = &gate.catalog().limits;
        if let Err(err) = loader::check_size(state.bytes.len() as u64, limits) {
            return Err(ledger.reject(Check::FileSize, err.into_violation()));
        }

        ledger.pass(Check::FileSize);
        Ok(Validation {
            gate,
            ledger,
            state: Sized {
                bytes: state.bytes,
                hint: state.hint,
            },
        })
    }
}

impl<'g, 'p> Validation<'g, Sized<'p>> {
    /// Extract the container and confirm the required entries exist
    pub fn unpack(self) -> Step<'g, Unpacked> {
        let Validation { gate, ledger, state } = self;
        let mut ledger = ledger.within_budget(Check::Structure)?;

        let catalog = gate.catalog();
        let package = match loader::open(state.bytes, state.hint, &catalog.limits) {
            Ok(package) => package,
            Err(err) => return Err(ledger.reject(Check::Structure, err.into_violation())),
        };

        // Label later rejections with the author's id when the document allows it
        ledger.model_id = gate.metadata_validator().best_effort_model_id(&package.entries);

        if let Err(violation) =
            StructureValidator::new(catalog).required_entries(&package.entries, package.kind)
        {
            return Err(ledger.reject(Check::Structure, violation));
        }

        ledger.pass(Check::Structure);
        Ok(Validation {
            gate,
            ledger,
            state: Unpacked { package },
        })
    }
}

impl<'g> Validation<'g, Unpacked> {
    pub fn describe(self) -> Step<'g, Described> {
        let Validation { gate, ledger, state } = self;
        let mut ledger = ledger.within_budget(Check::Metadata)?;

        let package = state.package;
        let metadata = match gate
            .metadata_validator()
            .validate(&package.entries, package.kind)
        {
            Ok(metadata) => metadata,
            Err(violation) => return Err(ledger.reject(Check::Metadata, violation)),
        };

        ledger.model_id = Some(metadata.model_id.clone());
        ledger.pass(Check::Metadata);
        Ok(Validation {
            gate,
            ledger,
            state: Described { package, metadata },
        })
    }
}

impl<'g> Validation<'g, Described> {
    /// Parse the designated entry and check the required class and method
    pub fn verify(self) -> Step<'g, Verified> {
        let Validation { gate, ledger, state } = self;
        let mut ledger = ledger.within_budget(Check::Signature)?;

        let Described { package, metadata } = state;
        let unit = match StructureValidator::new(gate.catalog()).validate(
            &package.entries,
            package.kind,
            &metadata,
            &ledger.budget,
        ) {
            Ok(unit) => unit,
            Err(Rejection::Invalid(violation)) => {
                return Err(ledger.reject(Check::Signature, violation))
            }
            Err(Rejection::OutOfTime(exceeded)) => {
                return Err(ledger.out_of_time(Check::Signature, exceeded))
            }
        };

        log::debug!("verified {} for model {}", unit.entry(), metadata.model_id);
        ledger.pass(Check::Signature);
        Ok(Validation {
            gate,
            ledger,
            state: Verified { unit },
        })
    }
}

impl<'g> Validation<'g, Verified> {
    pub fn unit(&self) -> &CodeUnit {
        &self.state.unit
    }

    /// Accumulate-all scan; always ends the run
    pub fn scan(self) -> Report {
        let Validation { gate, ledger, state } = self;
        let mut ledger = match ledger.within_budget(Check::SafetyScan) {
            Ok(ledger) => ledger,
            Err(halt) => return halt.into_report(),
        };

        match SafetyScanner::new(gate.catalog()).scan(&state.unit, &ledger.budget) {
            Ok(violations) if violations.is_empty() => {
                ledger.pass(Check::SafetyScan);
                ledger.finish(Vec::new())
            }
            Ok(violations) => {
                ledger.trail.violations(&violations);
                ledger.finish(violations)
            }
            Err(exceeded) => ledger.out_of_time(Check::SafetyScan, exceeded).into_report(),
        }
    }
}
