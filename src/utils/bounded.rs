/// Bounded reading of untrusted streams
///
/// Decompressors produce output on demand, so a ceiling enforced at the reader
/// aborts extraction the moment it is crossed instead of after the fact.
use std::io::{self, Read};

/// Read adapter that fails once more than `limit` bytes have passed through.
///
/// The failure is an ordinary `io::Error`, which callers like `tar::Archive` wrap in
/// their own errors. Check [`BoundedReader::tripped`] to tell a ceiling breach apart
/// from genuine corruption.
pub struct BoundedReader<R> {
    inner: R,
    limit: u64,
    consumed: u64,
    tripped: bool,
}

impl<R: Read> BoundedReader<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            limit,
            consumed: 0,
            tripped: false,
        }
    }

    /// Bytes delivered so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// True once the ceiling was crossed
    pub fn tripped(&self) -> bool {
        self.tripped
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

impl<R: Read> Read for BoundedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.tripped {
            return Err(ceiling_error(self.limit));
        }

        // Allow one byte past the ceiling so an exact-size stream is not rejected.
        let allowance = (self.limit - self.consumed.min(self.limit)).saturating_add(1);
        let window = buf.len().min(usize::try_from(allowance).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..window])?;

        self.consumed += n as u64;
        if self.consumed > self.limit {
            self.tripped = true;
            return Err(ceiling_error(self.limit));
        }
        Ok(n)
    }
}

fn ceiling_error(limit: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!("decompressed output exceeds {} bytes", limit),
    )
}
