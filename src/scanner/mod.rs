//! Safety scanner
//!
//! Dispatches once on the code unit's kind. Both variants collect every violation
//! in a deterministic order and only stop early when the run's budget is spent.

pub mod bytecode;
pub mod source;

use crate::config::catalog::RuleCatalog;
use crate::config::types::{BudgetExceeded, Violation};
use crate::lang::CodeUnit;
use crate::pipeline::budget::Budget;

pub struct SafetyScanner<'a> {
    catalog: &'a RuleCatalog,
}

impl<'a> SafetyScanner<'a> {
    pub fn new(catalog: &'a RuleCatalog) -> Self {
        Self { catalog }
    }

    pub fn scan(&self, unit: &CodeUnit, budget: &Budget) -> Result<Vec<Violation>, BudgetExceeded> {
        let violations = match unit {
            CodeUnit::Source(unit) => source::scan(&unit.module, &self.catalog.source, budget)?,
            CodeUnit::Bytecode(unit) => bytecode::scan(unit, &self.catalog.bytecode, budget)?,
        };
        log::debug!(
            "scanned {}: {} violation(s)",
            unit.entry(),
            violations.len()
        );
        Ok(violations)
    }
}
