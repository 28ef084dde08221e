//! 바이트 주소 기반 파일 저장소
//!
//! 엔진은 파일을 절대 오프셋으로만 다룬다. `SeekStore` 는 현재 커서를 기억해서
//! 순차 접근일 때는 seek 를 생략한다.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::error::IoContext;
use crate::Result;

/// 절대 오프셋으로 읽고 쓰는 저장소
pub trait FileStore {
    /// 현재 크기 (바이트)
    fn size(&mut self) -> Result<u64>;

    /// `offset` 에서 최대 `buf.len()` 바이트를 읽는다. 파일 끝이면 더 적게 읽음
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// `offset` 에 `data` 를 쓴다. 파일 끝 너머면 사이는 0 으로 채워진다
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// 길이를 `len` 으로 맞춘다. 줄이면 뒤쪽이 잘린다
    fn set_len(&mut self, len: u64) -> Result<()>;

    /// 버퍼된 쓰기를 내보낸다
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 길이를 바꿀 수 있는 저장 매체
pub trait SetLen {
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl SetLen for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

impl SetLen for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        Ok(())
    }
}

/// Read + Write + Seek 위에 커서 추적을 얹은 저장소
#[derive(Debug)]
pub struct SeekStore<T> {
    inner: T,
    cursor: u64,
    seeks: u64,
}

impl<T> SeekStore<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            cursor: 0,
            seeks: 0,
        }
    }

    /// 실제로 수행한 seek 횟수
    pub fn seeks(&self) -> u64 {
        self.seeks
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Seek> SeekStore<T> {
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        if self.cursor != offset {
            self.inner.seek(SeekFrom::Start(offset))?;
            self.cursor = offset;
            self.seeks += 1;
        }
        Ok(())
    }
}

impl<T: Read + Write + Seek + SetLen> FileStore for SeekStore<T> {
    fn size(&mut self) -> Result<u64> {
        let end = self.inner.seek(SeekFrom::End(0)).op("seek")?;
        self.cursor = end;
        Ok(end)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.seek_to(offset).op("seek")?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // 읽은 만큼 커서가 움직였는지 알 수 없으므로 다음엔 반드시 seek
                    self.cursor = u64::MAX;
                    return Err(e).op("read");
                }
            }
        }
        self.cursor = offset + filled as u64;
        Ok(filled)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.seek_to(offset).op("seek")?;
        if let Err(e) = self.inner.write_all(data) {
            self.cursor = u64::MAX;
            return Err(e).op("write");
        }
        self.cursor = offset + data.len() as u64;
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.inner.set_len(len).op("truncate")
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush().op("flush")
    }
}

/// 디스크 파일 저장소
pub type DiskStore = SeekStore<File>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads_skip_seek() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut store = SeekStore::new(Cursor::new(data.clone()));

        let mut buf = [0u8; 100];
        assert_eq!(store.read_at(0, &mut buf).unwrap(), 100);
        assert_eq!(store.read_at(100, &mut buf).unwrap(), 100);
        assert_eq!(&buf[..], &data[100..200]);
        assert_eq!(store.seeks(), 0);

        assert_eq!(store.read_at(500, &mut buf).unwrap(), 100);
        assert_eq!(store.seeks(), 1);

        // 파일 끝에서는 짧게 읽힌다
        assert_eq!(store.read_at(950, &mut buf).unwrap(), 50);
    }

    #[test]
    fn test_write_past_end_zero_fills() {
        let mut store = SeekStore::new(Cursor::new(Vec::new()));
        store.write_at(10, b"abc").unwrap();
        assert_eq!(store.size().unwrap(), 13);

        let inner = store.into_inner().into_inner();
        assert_eq!(&inner[..10], &[0u8; 10]);
        assert_eq!(&inner[10..], b"abc");
    }

    #[test]
    fn test_set_len_truncates_tail() {
        let mut store = SeekStore::new(Cursor::new(vec![7u8; 100]));
        store.set_len(40).unwrap();
        assert_eq!(store.size().unwrap(), 40);

        // 잘린 뒤에도 절대 오프셋 쓰기는 그대로 동작
        store.write_at(38, b"xyz").unwrap();
        let inner = store.into_inner().into_inner();
        assert_eq!(inner.len(), 41);
        assert_eq!(&inner[38..], b"xyz");
    }
}
