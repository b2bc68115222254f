/*!
 * Buffered byte reader and stream header validation
 */

use std::io::{BufRead, BufReader, Read};

use crate::command::{SEND_STREAM_MAGIC, SEND_STREAM_VERSION};
use crate::error::{BtrfsDiffError, Result};

/// Buffered reader over the raw send stream
///
/// All access goes through exact-length windows: a read either yields the
/// requested number of bytes or fails with `ShortRead`. Requests larger
/// than the buffer capacity are served by draining the source, so window
/// size is never limited by buffering.
pub struct ByteReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> ByteReader<R> {
    /// Create a new reader over a byte source
    pub fn new(source: R) -> Self {
        Self {
            inner: BufReader::new(source),
        }
    }

    /// Read exactly `n` bytes, advancing the position
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut got = 0;
        while got < n {
            match self.inner.read(&mut buf[got..]) {
                Ok(0) => {
                    return Err(BtrfsDiffError::ShortRead {
                        expected: n,
                        got,
                    })
                }
                Ok(read) => got += read,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(buf)
    }

    /// Read a little-endian u16
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian u32
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a NUL-terminated ASCII header, returning it without the NUL
    pub fn read_cstring(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let read = self.inner.read_until(0, &mut buf)?;
        if read == 0 || buf.last() != Some(&0) {
            return Err(BtrfsDiffError::ShortRead {
                expected: buf.len() + 1,
                got: buf.len(),
            });
        }
        buf.pop();
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Verify the stream magic and protocol version
///
/// Consumes the `"btrfs-stream"` NUL-terminated header and the 4-byte
/// little-endian version, which must be 1.
pub fn validate_stream<R: Read>(reader: &mut ByteReader<R>) -> Result<()> {
    let magic = reader.read_cstring()?;
    if magic != SEND_STREAM_MAGIC {
        return Err(BtrfsDiffError::BadMagic {
            expected: SEND_STREAM_MAGIC.to_string(),
            got: magic,
        });
    }
    let version = reader.read_u32()?;
    if version != SEND_STREAM_VERSION {
        return Err(BtrfsDiffError::UnsupportedVersion(version));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: &[u8]) -> ByteReader<Cursor<Vec<u8>>> {
        ByteReader::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn test_read_bytes_exact() {
        let mut r = reader(&[1, 2, 3, 4, 5]);
        assert_eq!(r.read_bytes(3).unwrap(), vec![1, 2, 3]);
        assert_eq!(r.read_bytes(2).unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_read_bytes_short() {
        let mut r = reader(&[1, 2]);
        match r.read_bytes(4) {
            Err(BtrfsDiffError::ShortRead { expected: 4, got: 2 }) => {}
            other => panic!("expected ShortRead, got {:?}", other),
        }
    }

    #[test]
    fn test_read_bytes_larger_than_default_buffer() {
        // Windows larger than BufReader's internal capacity must not truncate
        let data = vec![0xabu8; 32 * 1024];
        let mut r = reader(&data);
        assert_eq!(r.read_bytes(32 * 1024).unwrap(), data);
    }

    #[test]
    fn test_read_integers_little_endian() {
        let mut r = reader(&[0x01, 0x02, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(r.read_u16().unwrap(), 0x0201);
        assert_eq!(r.read_u32().unwrap(), 0x01020304);
    }

    #[test]
    fn test_validate_stream_ok() {
        let mut bytes = b"btrfs-stream\0".to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        let mut r = reader(&bytes);
        validate_stream(&mut r).unwrap();
    }

    #[test]
    fn test_validate_stream_bad_magic() {
        let mut bytes = b"not-a-stream\0".to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        let mut r = reader(&bytes);
        match validate_stream(&mut r) {
            Err(BtrfsDiffError::BadMagic { got, .. }) => assert_eq!(got, "not-a-stream"),
            other => panic!("expected BadMagic, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_stream_bad_version() {
        let mut bytes = b"btrfs-stream\0".to_vec();
        bytes.extend_from_slice(&7u32.to_le_bytes());
        let mut r = reader(&bytes);
        match validate_stream(&mut r) {
            Err(BtrfsDiffError::UnsupportedVersion(7)) => {}
            other => panic!("expected UnsupportedVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_stream_missing_terminator() {
        let mut r = reader(b"btrfs-stream");
        assert!(validate_stream(&mut r).is_err());
    }
}
