//! Testing infrastructure
//!
//! In-memory builders for packages and class files, shared by unit tests,
//! integration tests and the bench.

pub mod fixtures;
