//! Byte-level encoding helpers
//!
//! Compact-size integers and a bounds-checked reader for the consensus
//! wire format.

use thiserror::Error;

/// Decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("Non-canonical compact size encoding")]
    NonCanonical,
    #[error("{0} trailing bytes after decoding")]
    TrailingBytes(usize),
    #[error("Length {0} does not fit in memory")]
    LengthOverflow(u64),
}

/// Append a compact-size integer
///
/// `< 0xFD` is one byte, `<= 0xFFFF` is `0xFD` + u16 LE, `<= 0xFFFFFFFF` is
/// `0xFE` + u32 LE, anything larger is `0xFF` + u64 LE.
pub fn write_varint(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

/// Encode a compact-size integer into a fresh buffer
pub fn varint(n: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    write_varint(&mut buf, n);
    buf
}

/// Append a length-prefixed byte string
pub fn write_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Cursor over a byte slice
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Fail unless every byte has been consumed
    pub fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read a compact-size integer, rejecting non-minimal encodings
    pub fn read_varint(&mut self) -> Result<u64, CodecError> {
        let value = match self.read_u8()? {
            0xfd => {
                let n = self.read_u16_le()? as u64;
                if n < 0xfd {
                    return Err(CodecError::NonCanonical);
                }
                n
            }
            0xfe => {
                let n = self.read_u32_le()? as u64;
                if n <= 0xffff {
                    return Err(CodecError::NonCanonical);
                }
                n
            }
            0xff => {
                let n = self.read_u64_le()?;
                if n <= 0xffff_ffff {
                    return Err(CodecError::NonCanonical);
                }
                n
            }
            small => small as u64,
        };
        Ok(value)
    }

    pub fn read_var_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| CodecError::LengthOverflow(len))?;
        self.read_bytes(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        assert_eq!(varint(0), vec![0x00]);
        assert_eq!(varint(0xfc), vec![0xfc]);
        assert_eq!(varint(0xfd), vec![0xfd, 0xfd, 0x00]);
        assert_eq!(varint(0xffff), vec![0xfd, 0xff, 0xff]);
        assert_eq!(varint(0x10000), vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(varint(0xffff_ffff), vec![0xfe, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(
            varint(0x1_0000_0000),
            vec![0xff, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_reader_rejects_non_canonical() {
        let mut reader = Reader::new(&[0xfd, 0x10, 0x00]);
        assert_eq!(reader.read_varint(), Err(CodecError::NonCanonical));
    }

    #[test]
    fn test_reader_eof_and_trailing() {
        let mut reader = Reader::new(&[0x01, 0x02]);
        assert!(matches!(
            reader.read_u32_le(),
            Err(CodecError::UnexpectedEof { needed: 4, .. })
        ));

        let mut reader = Reader::new(&[0x02, 0xaa, 0xbb, 0xcc]);
        assert_eq!(reader.read_var_bytes().unwrap(), &[0xaa, 0xbb]);
        assert_eq!(reader.finish(), Err(CodecError::TrailingBytes(1)));
    }
}
