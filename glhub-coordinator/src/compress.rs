//! Bounded decompression of client-supplied data

use std::io::Read;

use flate2::read::GzDecoder;
use thiserror::Error;

/// Largest inflated `git-upload-pack` request body
pub const MAX_INFLATED_REQUEST: u64 = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DecompressError {
    #[error("decompressed data exceeds {0} bytes")]
    TooLarge(u64),

    #[error("failed to decompress: {0}")]
    Io(#[from] std::io::Error),
}

/// Read at most `limit` bytes from `reader`, failing if there is more
pub fn read_limited<R: Read>(reader: R, limit: u64) -> Result<Vec<u8>, DecompressError> {
    let mut out = Vec::new();
    reader.take(limit + 1).read_to_end(&mut out)?;
    if out.len() as u64 > limit {
        return Err(DecompressError::TooLarge(limit));
    }
    Ok(out)
}

/// Decompress a gzip stream of at most `limit` inflated bytes
pub fn gunzip(data: &[u8], limit: u64) -> Result<Vec<u8>, DecompressError> {
    read_limited(GzDecoder::new(data), limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_gunzip() {
        assert_eq!(gunzip(&gzip(b"A=1\n"), 16).unwrap(), b"A=1\n");
        assert!(matches!(gunzip(b"plain", 16), Err(DecompressError::Io(_))));
    }

    #[test]
    fn test_gunzip_at_limit() {
        assert_eq!(gunzip(&gzip(&[b'x'; 64]), 64).unwrap().len(), 64);
    }

    #[test]
    fn test_gunzip_rejects_bomb() {
        let bomb = gzip(&vec![0u8; 4 * 1024 * 1024]);
        assert!(bomb.len() < 64 * 1024);
        assert!(matches!(
            gunzip(&bomb, 1024 * 1024),
            Err(DecompressError::TooLarge(1048576))
        ));
    }

    #[test]
    fn test_read_limited() {
        assert_eq!(read_limited(&b"abc"[..], 3).unwrap(), b"abc");
        assert!(matches!(
            read_limited(&b"abcd"[..], 3),
            Err(DecompressError::TooLarge(3))
        ));
    }
}
