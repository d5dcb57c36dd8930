/// jar (zip) extraction (bytecode packages)
use super::{normalize_path, Entries, Tally};
use crate::config::catalog::Limits;
use crate::config::types::LoadError;
use crate::utils::bounded::BoundedReader;
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

const CONTAINER: &str = "jar";

// Upper bound on preallocation from an untrusted header
const PREALLOC_CAP: u64 = 64 * 1024;

fn corrupt(e: ZipError) -> LoadError {
    LoadError::corrupt(CONTAINER, e.to_string())
}

/// Extract every file member of a jar.
///
/// The central directory gives the member count up front, so the entry ceiling is
/// checked before any member is inflated. Declared sizes are checked against the
/// remaining budget and then enforced again on the actual inflated stream.
pub fn extract(bytes: &[u8], limits: &Limits) -> Result<Entries, LoadError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;
    let mut tally = Tally::new(CONTAINER, limits);

    if archive.len() > limits.max_entries {
        return Err(LoadError::TooManyEntries {
            limit: limits.max_entries,
        });
    }

    let mut entries = Entries::default();
    for index in 0..archive.len() {
        let mut member = archive.by_index(index).map_err(corrupt)?;
        tally.member()?;

        let name = match normalize_path(CONTAINER, member.name().as_bytes())? {
            Some(name) if !member.is_dir() => name,
            _ => continue,
        };

        let declared = member.size();
        tally.reserve(declared)?;

        let budget = tally.remaining();
        let mut data = Vec::with_capacity(declared.min(budget).min(PREALLOC_CAP) as usize);
        let mut reader = BoundedReader::new(&mut member, budget);

        if let Err(e) = reader.read_to_end(&mut data) {
            if reader.tripped() {
                let seen = limits.max_decompressed_bytes - budget + reader.consumed();
                return Err(tally.too_large(seen));
            }
            return Err(LoadError::corrupt(
                CONTAINER,
                format!("entry '{}': {}", name, e),
            ));
        }

        tally.add(data.len() as u64)?;
        entries.insert(CONTAINER, name, data)?;
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::presets;
    use crate::testing::fixtures::JarBuilder;

    fn limits() -> Limits {
        presets::alphaback_v1().limits.clone()
    }

    #[test]
    fn test_extracts_members() {
        let bytes = JarBuilder::new()
            .file("metadata.json", b"{}")
            .file("com/example/M.class", &[0xca, 0xfe, 0xba, 0xbe])
            .build()
            .unwrap();

        let entries = extract(&bytes, &limits()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries.get("com/example/M.class"),
            Some(&[0xca, 0xfe, 0xba, 0xbe][..])
        );
    }

    #[test]
    fn test_member_count_checked_up_front() {
        let mut limits = limits();
        limits.max_entries = 3;
        let mut builder = JarBuilder::new();
        for i in 0..4 {
            builder = builder.file(&format!("C{}.class", i), b"x");
        }

        let err = extract(&builder.build().unwrap(), &limits).unwrap_err();
        assert_eq!(err, LoadError::TooManyEntries { limit: 3 });
    }

    #[test]
    fn test_inflated_ceiling() {
        let mut limits = limits();
        limits.max_decompressed_bytes = 1000;
        let bytes = JarBuilder::new()
            .file("a.bin", &vec![0u8; 600])
            .file("b.bin", &vec![0u8; 600])
            .build()
            .unwrap();

        let err = extract(&bytes, &limits).unwrap_err();
        assert!(matches!(err, LoadError::TooLarge { .. }), "{:?}", err);
    }

    #[test]
    fn test_garbage_after_magic_is_corrupt() {
        let err = extract(b"PK\x03\x04 this is not a zip", &limits()).unwrap_err();
        assert!(matches!(err, LoadError::Corrupt { .. }));
    }

    #[test]
    fn test_absolute_member_is_corrupt() {
        let bytes = JarBuilder::new().file("/etc/passwd", b"root").build().unwrap();
        let err = extract(&bytes, &limits()).unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }
}
