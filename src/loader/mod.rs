//! Container loader
//!
//! Turns raw package bytes into an immutable name→bytes mapping while enforcing the
//! raw ceiling, the decompressed ceiling and the entry-count ceiling.

pub mod jar;
pub mod tarball;

use crate::config::catalog::Limits;
use crate::config::types::{ArtifactKind, KindHint, LoadError};
use std::collections::BTreeMap;

/// Extracted archive members, keyed by normalized path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entries {
    files: BTreeMap<String, Vec<u8>>,
}

/// Outcome of looking up a required entry
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
    Found(&'a str, &'a [u8]),
    Missing,
    /// Several entries end with the requested name and none matches it exactly
    Ambiguous(Vec<&'a str>),
}

impl Entries {
    /// Insert a member; duplicate names are corrupt.
    pub(crate) fn insert(
        &mut self,
        container: &'static str,
        name: String,
        data: Vec<u8>,
    ) -> Result<(), LoadError> {
        if self.files.contains_key(&name) {
            return Err(LoadError::corrupt(
                container,
                format!("duplicate entry '{}'", name),
            ));
        }
        self.files.insert(name, data);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Exact name first, then a unique `.../name` suffix match.
    pub fn find(&self, name: &str) -> Lookup<'_> {
        if let Some((key, data)) = self.files.get_key_value(name) {
            return Lookup::Found(key.as_str(), data.as_slice());
        }

        let suffix = format!("/{}", name);
        let hits: Vec<(&String, &Vec<u8>)> = self
            .files
            .iter()
            .filter(|(key, _)| key.ends_with(&suffix))
            .collect();

        match hits.as_slice() {
            [] => Lookup::Missing,
            [(key, data)] => Lookup::Found(key.as_str(), data.as_slice()),
            many => Lookup::Ambiguous(many.iter().map(|(key, _)| key.as_str()).collect()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|v| v.len() as u64).sum()
    }
}

/// An opened package
#[derive(Debug, Clone)]
pub struct Package {
    pub kind: ArtifactKind,
    pub entries: Entries,
}

/// Raw ceiling. Runs before anything looks inside the bytes.
pub fn check_size(len: u64, limits: &Limits) -> Result<(), LoadError> {
    if len > limits.max_package_bytes {
        return Err(LoadError::TooLarge {
            what: "package",
            actual: len,
            limit: limits.max_package_bytes,
        });
    }
    Ok(())
}

/// Decide the artifact kind from content, honoring a declared hint.
pub fn resolve_kind(bytes: &[u8], hint: KindHint) -> Result<ArtifactKind, LoadError> {
    let sniffed = ArtifactKind::sniff(bytes);
    match (hint, sniffed) {
        (KindHint::Sniff, Some(kind)) => Ok(kind),
        (KindHint::Sniff, None) => Err(LoadError::corrupt(
            "package",
            "unrecognized container format (expected gzip tarball or jar)",
        )),
        (KindHint::Declared(declared), Some(kind)) if declared == kind => Ok(kind),
        (KindHint::Declared(declared), Some(kind)) => Err(LoadError::corrupt(
            declared.container_name(),
            format!("declared {} package but content is a {}", declared, kind.container_name()),
        )),
        (KindHint::Declared(declared), None) => Err(LoadError::corrupt(
            declared.container_name(),
            "missing container magic bytes",
        )),
    }
}

/// Extract entries. Assumes [`check_size`] already passed.
pub fn open(bytes: &[u8], hint: KindHint, limits: &Limits) -> Result<Package, LoadError> {
    let kind = resolve_kind(bytes, hint)?;
    let entries = match kind {
        ArtifactKind::SourceArchive => tarball::extract(bytes, limits)?,
        ArtifactKind::BytecodeArchive => jar::extract(bytes, limits)?,
    };
    log::debug!(
        "opened {} package: {} entries, {} bytes",
        kind,
        entries.len(),
        entries.total_bytes()
    );
    Ok(Package { kind, entries })
}

/// Size guard and extraction in one call
pub fn load(bytes: &[u8], hint: KindHint, limits: &Limits) -> Result<Package, LoadError> {
    check_size(bytes.len() as u64, limits)?;
    open(bytes, hint, limits)
}

/// Normalize an archive member path.
///
/// Returns `Ok(None)` for names that only denote a directory (`dir/`, `./`).
pub(crate) fn normalize_path(
    container: &'static str,
    raw: &[u8],
) -> Result<Option<String>, LoadError> {
    let name = std::str::from_utf8(raw)
        .map_err(|_| LoadError::corrupt(container, "entry name is not valid UTF-8"))?;

    if name.is_empty() {
        return Err(LoadError::corrupt(container, "entry with empty name"));
    }
    if name.contains('\0') {
        return Err(LoadError::corrupt(container, "entry name contains NUL"));
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(LoadError::corrupt(
            container,
            format!("absolute entry path '{}'", name),
        ));
    }

    let mut parts = Vec::new();
    for part in name.split(|c| c == '/' || c == '\\') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(LoadError::corrupt(
                    container,
                    format!("entry path escapes archive root '{}'", name),
                ))
            }
            p => parts.push(p),
        }
    }

    if parts.is_empty() {
        return Ok(None);
    }
    Ok(Some(parts.join("/")))
}

/// Running totals shared by both extractors
pub(crate) struct Tally<'a> {
    container: &'static str,
    limits: &'a Limits,
    members: usize,
    bytes: u64,
}

impl<'a> Tally<'a> {
    pub(crate) fn new(container: &'static str, limits: &'a Limits) -> Self {
        Self {
            container,
            limits,
            members: 0,
            bytes: 0,
        }
    }

    /// Count one archive member, directories included.
    pub(crate) fn member(&mut self) -> Result<(), LoadError> {
        self.members += 1;
        if self.members > self.limits.max_entries {
            return Err(LoadError::TooManyEntries {
                limit: self.limits.max_entries,
            });
        }
        Ok(())
    }

    /// Bytes still allowed before the decompressed ceiling
    pub(crate) fn remaining(&self) -> u64 {
        self.limits.max_decompressed_bytes.saturating_sub(self.bytes)
    }

    /// Reject a member whose declared size cannot fit.
    pub(crate) fn reserve(&self, declared: u64) -> Result<(), LoadError> {
        if declared > self.remaining() {
            return Err(self.too_large(self.bytes.saturating_add(declared)));
        }
        Ok(())
    }

    pub(crate) fn add(&mut self, actual: u64) -> Result<(), LoadError> {
        self.bytes = self.bytes.saturating_add(actual);
        if self.bytes > self.limits.max_decompressed_bytes {
            return Err(self.too_large(self.bytes));
        }
        Ok(())
    }

    pub(crate) fn too_large(&self, actual: u64) -> LoadError {
        LoadError::TooLarge {
            what: "decompressed content",
            actual,
            limit: self.limits.max_decompressed_bytes,
        }
    }

    pub(crate) fn container(&self) -> &'static str {
        self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::presets;

    fn limits() -> Limits {
        presets::alphaback_v1().limits.clone()
    }

    #[test]
    fn test_size_guard_runs_before_sniffing() {
        let mut limits = limits();
        limits.max_package_bytes = 8;
        // not a container at all, but size wins
        let err = load(&[0u8; 9], KindHint::Sniff, &limits).unwrap_err();
        assert!(matches!(err, LoadError::TooLarge { what: "package", actual: 9, .. }));
    }

    #[test]
    fn test_unknown_magic_is_corrupt() {
        let err = load(b"hello world", KindHint::Sniff, &limits()).unwrap_err();
        assert!(matches!(err, LoadError::Corrupt { .. }));
    }

    #[test]
    fn test_declared_kind_must_match_content() {
        let err = resolve_kind(
            &[0x1f, 0x8b, 8, 0],
            KindHint::Declared(ArtifactKind::BytecodeArchive),
        )
        .unwrap_err();
        assert!(err.to_string().contains("declared bytecode package"));

        let kind = resolve_kind(b"PK\x03\x04", KindHint::Declared(ArtifactKind::BytecodeArchive))
            .unwrap();
        assert_eq!(kind, ArtifactKind::BytecodeArchive);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("tar", b"./pkg/model.py").unwrap(),
            Some("pkg/model.py".to_string())
        );
        assert_eq!(normalize_path("tar", b"pkg/").unwrap(), None);
        assert!(normalize_path("tar", b"/etc/passwd").is_err());
        assert!(normalize_path("tar", b"a/../../b").is_err());
        assert!(normalize_path("tar", b"").is_err());
        assert!(normalize_path("tar", b"a\0b").is_err());
        assert!(normalize_path("tar", &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_find_exact_then_unique_suffix() {
        let mut entries = Entries::default();
        entries.insert("tar", "pkg/model.py".into(), b"x".to_vec()).unwrap();
        entries.insert("tar", "metadata.json".into(), b"{}".to_vec()).unwrap();

        assert_eq!(entries.find("metadata.json"), Lookup::Found("metadata.json", b"{}"));
        assert_eq!(entries.find("model.py"), Lookup::Found("pkg/model.py", b"x"));
        assert_eq!(entries.find("other.py"), Lookup::Missing);

        entries.insert("tar", "alt/model.py".into(), b"y".to_vec()).unwrap();
        assert!(matches!(entries.find("model.py"), Lookup::Ambiguous(ref v) if v.len() == 2));
    }

    #[test]
    fn test_duplicate_insert_is_corrupt() {
        let mut entries = Entries::default();
        entries.insert("jar", "A.class".into(), vec![]).unwrap();
        let err = entries.insert("jar", "A.class".into(), vec![]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
