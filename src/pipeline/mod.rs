//! Pipeline orchestrator
//!
//! [`Gatekeeper`] owns the rule catalog for the life of the process and turns one
//! package into one [`Report`]. It holds no mutable state, so a single instance can
//! serve any number of concurrent runs.

pub mod budget;
pub mod stages;

use crate::config::catalog::RuleCatalog;
use crate::config::presets;
use crate::config::types::{ArtifactKind, KindHint, Result};
use crate::config::validator::validate_catalog;
use crate::metadata::{MetadataPatterns, MetadataValidator};
use crate::verdict::Report;
use stages::{Halt, Validation};

/// Package bytes as handed over by the event source
#[derive(Debug, Clone)]
pub struct RawPackage {
    /// Storage key, e.g. `uploads/momentum.tar.gz`
    pub key: String,
    pub bytes: Vec<u8>,
    pub hint: KindHint,
}

impl RawPackage {
    pub fn new(key: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            bytes,
            hint: KindHint::Sniff,
        }
    }

    pub fn with_kind(mut self, kind: ArtifactKind) -> Self {
        self.hint = KindHint::Declared(kind);
        self
    }
}

#[derive(Debug)]
pub struct Gatekeeper {
    catalog: RuleCatalog,
    patterns: MetadataPatterns,
}

impl Gatekeeper {
    /// Refuses a catalog that fails validation
    pub fn new(catalog: RuleCatalog) -> Result<Self> {
        Self::build(catalog, true)
    }

    /// Accepts a catalog with validation errors, logging them instead.
    /// Regex patterns must still compile.
    pub fn permissive(catalog: RuleCatalog) -> Result<Self> {
        Self::build(catalog, false)
    }

    pub fn with_default_catalog() -> Result<Self> {
        Self::new(presets::alphaback_v1().clone())
    }

    fn build(catalog: RuleCatalog, strict: bool) -> Result<Self> {
        let result = validate_catalog(&catalog, strict)?;
        for error in &result.errors {
            log::warn!("catalog '{}' (permissive): {}", catalog.id, error);
        }

        let patterns = MetadataPatterns::compile(&catalog.metadata)?;
        log::info!(
            "gatekeeper ready: catalog '{}', {} byte ceiling, {} ms budget",
            catalog.id,
            catalog.limits.max_package_bytes,
            catalog.limits.budget_ms
        );
        Ok(Self { catalog, patterns })
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub(crate) fn metadata_validator(&self) -> MetadataValidator<'_> {
        MetadataValidator::new(&self.catalog.metadata, &self.patterns)
    }

    /// Run every stage in order and build the report. Never fails: every problem
    /// with the package is a violation in the report.
    pub fn validate(&self, package: &RawPackage) -> Report {
        Validation::receive(self, package)
            .check_size()
            .and_then(|run| run.unpack())
            .and_then(|run| run.describe())
            .and_then(|run| run.verify())
            .map_or_else(Halt::into_report, |run| run.scan())
    }
}

/// Fallback model id: archive extension dropped, path separators flattened.
/// `uploads/momentum.tar.gz` → `uploads_momentum`
pub fn model_id_from_key(key: &str) -> String {
    let stem = [".tar.gz", ".tgz", ".jar", ".zip"]
        .iter()
        .find_map(|ext| key.strip_suffix(ext))
        .unwrap_or(key);
    stem.trim_matches('/').replace('/', "_")
}
