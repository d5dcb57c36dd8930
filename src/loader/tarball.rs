/// gzip tarball extraction (source packages)
use super::{normalize_path, Entries, Tally};
use crate::config::catalog::Limits;
use crate::config::types::LoadError;
use crate::utils::bounded::BoundedReader;
use flate2::read::GzDecoder;
use std::io::Read;

const CONTAINER: &str = "gzip tarball";

/// Why member iteration stopped
enum Stop {
    Load(LoadError),
    Io(std::io::Error),
}

impl From<LoadError> for Stop {
    fn from(e: LoadError) -> Self {
        Stop::Load(e)
    }
}

impl From<std::io::Error> for Stop {
    fn from(e: std::io::Error) -> Self {
        Stop::Io(e)
    }
}

/// Stream-decompress and extract regular files.
///
/// The decoder sits behind a [`BoundedReader`], so header bloat, padding and file
/// data all count against the decompressed ceiling as they are produced.
pub fn extract(bytes: &[u8], limits: &Limits) -> Result<Entries, LoadError> {
    let mut stream = BoundedReader::new(GzDecoder::new(bytes), limits.max_decompressed_bytes);
    let mut tally = Tally::new(CONTAINER, limits);

    match read_members(&mut stream, &mut tally) {
        Ok(entries) => Ok(entries),
        Err(Stop::Load(e)) => Err(e),
        Err(Stop::Io(_)) if stream.tripped() => Err(tally.too_large(stream.consumed())),
        Err(Stop::Io(e)) => Err(LoadError::corrupt(CONTAINER, e.to_string())),
    }
}

fn read_members<R: Read>(stream: R, tally: &mut Tally<'_>) -> Result<Entries, Stop> {
    let mut archive = tar::Archive::new(stream);
    let mut entries = Entries::default();

    for member in archive.entries()? {
        let mut member = member?;
        tally.member()?;

        let name = match normalize_path(tally.container(), &member.path_bytes())? {
            Some(name) => name,
            None => continue,
        };

        if !member.header().entry_type().is_file() {
            log::debug!(
                "skipping non-regular tar member '{}' ({:?})",
                name,
                member.header().entry_type()
            );
            continue;
        }

        let declared = member.header().size()?;
        tally.reserve(declared)?;

        let mut data = Vec::with_capacity(declared.min(tally.remaining()) as usize);
        member.read_to_end(&mut data)?;
        tally.add(data.len() as u64)?;

        entries.insert(tally.container(), name, data)?;
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::presets;
    use crate::testing::fixtures::TarballBuilder;

    fn limits() -> Limits {
        presets::alphaback_v1().limits.clone()
    }

    #[test]
    fn test_extracts_files_and_skips_directories() {
        let bytes = TarballBuilder::new()
            .dir("pkg/")
            .file("pkg/model.py", b"x = 1\n")
            .file("metadata.json", b"{}")
            .build()
            .unwrap();

        let entries = extract(&bytes, &limits()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.get("pkg/model.py"), Some(&b"x = 1\n"[..]));
    }

    #[test]
    fn test_decompressed_ceiling_trips_mid_stream() {
        let mut limits = limits();
        limits.max_decompressed_bytes = 4096;
        // highly compressible: tiny on the wire, large once inflated
        let bytes = TarballBuilder::new()
            .file("model.py", &vec![b'#'; 64 * 1024])
            .build()
            .unwrap();
        assert!((bytes.len() as u64) < limits.max_package_bytes);

        let err = extract(&bytes, &limits).unwrap_err();
        assert!(matches!(err, LoadError::TooLarge { .. }), "{:?}", err);
    }

    #[test]
    fn test_entry_ceiling_counts_directories() {
        let mut limits = limits();
        limits.max_entries = 2;
        let bytes = TarballBuilder::new()
            .dir("a/")
            .dir("b/")
            .file("model.py", b"")
            .build()
            .unwrap();

        let err = extract(&bytes, &limits).unwrap_err();
        assert_eq!(err, LoadError::TooManyEntries { limit: 2 });
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let bytes = TarballBuilder::new()
            .file("model.py", &vec![b'a'; 2048])
            .build()
            .unwrap();
        let truncated = &bytes[..bytes.len() / 2];

        let err = extract(truncated, &limits()).unwrap_err();
        assert!(matches!(err, LoadError::Corrupt { .. }), "{:?}", err);
    }

    #[test]
    fn test_traversal_path_is_corrupt() {
        let bytes = TarballBuilder::new().file("../evil.py", b"x").build().unwrap();
        let err = extract(&bytes, &limits()).unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }

    #[test]
    fn test_duplicate_members_are_corrupt() {
        let bytes = TarballBuilder::new()
            .file("model.py", b"a")
            .file("./model.py", b"b")
            .build()
            .unwrap();
        let err = extract(&bytes, &limits()).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
