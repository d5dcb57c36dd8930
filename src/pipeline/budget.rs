/// Cooperative wall-clock budget for one validation run.
///
/// Nothing preempts a run; stages call [`Budget::check`] between units of work and
/// stop with [`BudgetExceeded`] once the limit is spent.
use crate::config::types::BudgetExceeded;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Budget {
    started: Instant,
    limit: Duration,
}

impl Budget {
    pub fn start(limit: Duration) -> Self {
        Self::since(Instant::now(), limit)
    }

    pub fn since(started: Instant, limit: Duration) -> Self {
        Self { started, limit }
    }

    /// No limit in practice; for callers that scan outside a pipeline run.
    pub fn unlimited() -> Self {
        Self::start(Duration::MAX)
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// A spent budget is one whose elapsed time has reached the limit, so a zero
    /// limit fails the first check.
    pub fn check(&self) -> Result<(), BudgetExceeded> {
        let elapsed = self.elapsed();
        if elapsed >= self.limit {
            return Err(BudgetExceeded {
                limit: self.limit,
                elapsed,
            });
        }
        Ok(())
    }
}
