//! Packfile encoding
//!
//! Version 2 packs of undeltified objects: a `PACK` header, one
//! zlib-compressed entry per object and a trailing SHA-1 of everything
//! before it.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use sha1::{Digest, Sha1};

use super::GitError;
use super::object::Object;

/// Encode `objects` as a packfile
pub fn write_pack<'a, I>(objects: I) -> Result<Vec<u8>, GitError>
where
    I: IntoIterator<Item = &'a Object>,
    I::IntoIter: ExactSizeIterator,
{
    let objects = objects.into_iter();
    let count = u32::try_from(objects.len())
        .map_err(|_| GitError::Malformed("too many objects for one pack".into()))?;

    let mut pack = Vec::new();
    pack.extend_from_slice(b"PACK");
    pack.extend_from_slice(&2u32.to_be_bytes());
    pack.extend_from_slice(&count.to_be_bytes());

    for object in objects {
        write_entry_header(&mut pack, object.kind.pack_type(), object.data.len());
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&object.data)?;
        pack.extend_from_slice(&encoder.finish()?);
    }

    let checksum: [u8; 20] = Sha1::digest(&pack).into();
    pack.extend_from_slice(&checksum);
    Ok(pack)
}

/// Type and size header: 3 type bits plus a little-endian base-128 size
fn write_entry_header(out: &mut Vec<u8>, kind: u8, size: usize) {
    let mut byte = (kind << 4) | (size & 0x0f) as u8;
    let mut rest = size >> 4;
    while rest > 0 {
        out.push(byte | 0x80);
        byte = (rest & 0x7f) as u8;
        rest >>= 7;
    }
    out.push(byte);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::object::ObjectKind;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    #[test]
    fn test_entry_header_sizes() {
        let mut small = Vec::new();
        write_entry_header(&mut small, 3, 5);
        assert_eq!(small, vec![0x35]);

        let mut large = Vec::new();
        write_entry_header(&mut large, 1, 300);
        // 300 = 0b1_0010_1100: low nibble 0xc, then 300 >> 4 = 18
        assert_eq!(large, vec![0x80 | 0x10 | 0x0c, 18]);
    }

    #[test]
    fn test_pack_layout() {
        let blob = Object {
            kind: ObjectKind::Blob,
            data: b"hello\n".to_vec(),
        };
        let pack = write_pack([&blob]).unwrap();

        assert_eq!(&pack[..4], b"PACK");
        assert_eq!(&pack[4..8], &2u32.to_be_bytes());
        assert_eq!(&pack[8..12], &1u32.to_be_bytes());
        assert_eq!(pack[12], 0x36);

        let body_end = pack.len() - 20;
        let mut decoded = Vec::new();
        ZlibDecoder::new(&pack[13..body_end])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, b"hello\n");

        let checksum: [u8; 20] = Sha1::digest(&pack[..body_end]).into();
        assert_eq!(&pack[body_end..], &checksum);
    }
}
