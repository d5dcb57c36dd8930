//! Observability
//!
//! Structured audit events for every validation run.

pub mod audit;
