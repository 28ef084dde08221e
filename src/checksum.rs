//! 파일 전체 SHA-1 체크섬 (소문자 hex 40자)

use sha1::{Digest, Sha1};

use crate::store::FileStore;
use crate::Result;

const READ_CHUNK: usize = 64 * 1024;

/// 저장소 전체 내용의 SHA-1
pub fn file_checksum<S: FileStore + ?Sized>(store: &mut S) -> Result<String> {
    let len = store.size()?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut offset = 0u64;

    while offset < len {
        let n = store.read_at(offset, &mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        offset += n as u64;
    }

    Ok(hex::encode(hasher.finalize()))
}

/// 메모리 데이터의 SHA-1
pub fn checksum_bytes(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SeekStore;
    use crate::CHECKSUM_LEN;
    use std::io::Cursor;

    #[test]
    fn test_known_digests() {
        assert_eq!(checksum_bytes(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(checksum_bytes(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_store_checksum_matches_bytes() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut store = SeekStore::new(Cursor::new(data.clone()));
        let sum = file_checksum(&mut store).unwrap();
        assert_eq!(sum.len(), CHECKSUM_LEN);
        assert_eq!(sum, checksum_bytes(&data));
    }
}
