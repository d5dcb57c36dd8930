/// Bounds-checked cursor over class-file bytes.
///
/// Every read checks the remaining length first; no offset from the input is ever
/// used without that check.
use super::ClassFormatError;

pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], ClassFormatError> {
        if len > self.remaining() {
            return Err(ClassFormatError::Truncated {
                offset: self.pos,
                wanted: len,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ClassFormatError> {
        self.bytes(len).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8, ClassFormatError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ClassFormatError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, ClassFormatError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reject a declared item count that cannot fit in what is left.
    pub fn check_count(
        &self,
        what: &'static str,
        count: usize,
        min_item_len: usize,
    ) -> Result<(), ClassFormatError> {
        if count.saturating_mul(min_item_len) > self.remaining() {
            return Err(ClassFormatError::CountExceedsInput {
                what,
                count,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn expect_end(&self) -> Result<(), ClassFormatError> {
        if self.remaining() != 0 {
            return Err(ClassFormatError::TrailingBytes(self.remaining()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_reads() {
        let mut r = ByteReader::new(&[0xca, 0xfe, 0xba, 0xbe, 0x00, 0x34, 0x07]);
        assert_eq!(r.u32().unwrap(), 0xcafe_babe);
        assert_eq!(r.u16().unwrap(), 52);
        assert_eq!(r.u8().unwrap(), 7);
        assert!(r.expect_end().is_ok());
    }

    #[test]
    fn test_truncation_never_panics() {
        let mut r = ByteReader::new(&[0x01]);
        assert!(matches!(
            r.u16(),
            Err(ClassFormatError::Truncated { offset: 0, wanted: 2 })
        ));
        assert!(r.bytes(usize::MAX).is_err());
        assert_eq!(r.u8().unwrap(), 1);
        assert!(r.u8().is_err());
    }

    #[test]
    fn test_count_check() {
        let r = ByteReader::new(&[0; 10]);
        assert!(r.check_count("interfaces", 5, 2).is_ok());
        assert!(r.check_count("interfaces", 6, 2).is_err());
        assert!(r.check_count("methods", usize::MAX, 8).is_err());
    }
}
