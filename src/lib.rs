//! modelgate: static validation gate for untrusted trading-model packages
//!
//! A package (python source tarball or jar) is admitted to the simulation
//! environment only after it passes a fixed sequence of checks, none of which
//! executes the submitted code.
//!
//! # Architecture
//!
//! ## Configuration ([`config`])
//! - [`config::catalog`]: Rule catalog (limits, tables, required contract), loaded from JSON
//! - [`config::presets`]: Built-in versioned catalogs
//! - [`config::validator`]: Startup validation of a catalog
//! - [`config::types`]: Shared closed enums, violations and error types
//!
//! ## Intake ([`loader`], [`metadata`])
//! - [`loader`]: Size guard and bounded extraction of tarballs and jars
//! - [`metadata`]: `metadata.json` schema validation
//!
//! ## Front Ends ([`lang`])
//! - [`lang::python`]: Lexer and parser producing a line-annotated syntax tree
//! - [`lang::jvm`]: Bounds-checked class-file and constant-pool reader
//!
//! ## Checks ([`structure`], [`scanner`])
//! - [`structure`]: Required entries, class and method contract
//! - [`scanner`]: Accumulate-all safety scan of a parsed code unit
//!
//! ## Orchestration ([`pipeline`])
//! - [`pipeline::stages`]: Type-state enforced stage ordering
//! - [`pipeline::budget`]: Cooperative wall-clock budget
//!
//! ## Verdict ([`verdict`])
//! - [`verdict::report`]: Report model and wire format
//! - [`verdict::sink`]: Registry and upload-status records, persistence seam
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured audit events with per-run correlation ids
//!
//! ## Utilities ([`utils`])
//! - [`utils::bounded`]: Size-capped reads from decompressors
//!
//! ## Testing Infrastructure ([`testing`])
//! - [`testing::fixtures`]: Package and class-file builders
//!
//! # Design Principles
//!
//! 1. **Never execute** - Every decision comes from bytes, tokens and constant pools
//! 2. **Untrusted input is data** - Malformed packages become violations, never panics
//! 3. **Types prevent errors** - Stages cannot be skipped or reordered
//! 4. **Rules are data** - Swapping a catalog never touches scanning logic

// Configuration
pub mod config;

// Intake
pub mod loader;
pub mod metadata;

// Front ends
pub mod lang;

// Checks
pub mod scanner;
pub mod structure;

// Orchestration
pub mod pipeline;

// Verdict
pub mod verdict;

// Observability
pub mod observability;

// Utilities
pub mod utils;

// Testing Infrastructure
pub mod testing;

// CLI entrypoint wiring for the modelgate binary
pub mod cli;

pub use config::types::*;
pub use pipeline::{Gatekeeper, RawPackage};
pub use verdict::{Report, Status};
