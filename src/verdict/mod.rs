//! Report model and persistence boundary
//!
//! A report is a value built once at the end of a run. Persisting it is left to
//! a [`sink::ReportSink`] chosen by the caller.

pub mod report;
pub mod sink;

pub use report::{Report, Status};
