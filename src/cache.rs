//! 송신측 패킷 캐시
//!
//! 최근에 읽은 패킷 데이터를 오프셋(패킷 인덱스)으로 보관한다.
//! 가득 찬 상태에서 새 오프셋이 필요하면 가장 큰 오프셋을 버린다:
//! 순차 전송에서는 느린 수신자가 낮은 오프셋을 다시 요청할 가능성이 더 높다.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::store::FileStore;
use crate::{Error, Result, PACKET_SIZE};

/// 패킷 캐시
#[derive(Debug)]
pub struct PacketCache {
    capacity: usize,
    entries: HashMap<u32, Bytes>,
    hits: u64,
    misses: u64,
}

impl PacketCache {
    /// 최대 `capacity` 개 패킷 (최소 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.entries.contains_key(&offset)
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// 패킷 데이터 조회. 없으면 파일에서 동기적으로 읽어 채운다
    pub fn get<S: FileStore + ?Sized>(&mut self, offset: u32, store: &mut S) -> Result<Bytes> {
        if let Some(data) = self.entries.get(&offset) {
            self.hits += 1;
            return Ok(data.clone());
        }
        self.misses += 1;
        self.fill_from_file(offset, store)
    }

    /// 다음에 보낼 패킷을 미리 읽어 둔다
    pub fn prefetch<S: FileStore + ?Sized>(&mut self, offset: u32, store: &mut S) -> Result<()> {
        if !self.entries.contains_key(&offset) {
            trace!("prefetch: offset={}", offset);
            self.fill_from_file(offset, store)?;
        }
        Ok(())
    }

    /// 파일의 `offset * PACKET_SIZE` 위치에서 최대 PACKET_SIZE 바이트를 읽어 캐시에 넣는다
    pub fn fill_from_file<S: FileStore + ?Sized>(
        &mut self,
        offset: u32,
        store: &mut S,
    ) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(PACKET_SIZE);
        let n = store.read_at(offset as u64 * PACKET_SIZE as u64, &mut buf)?;
        if n == 0 {
            return Err(Error::ShortRead { offset });
        }
        buf.truncate(n);
        let data = buf.freeze();

        if !self.entries.contains_key(&offset) && self.entries.len() >= self.capacity {
            self.evict();
        }
        self.entries.insert(offset, data.clone());
        Ok(data)
    }

    /// 가장 큰 오프셋 제거
    fn evict(&mut self) {
        if let Some(&max) = self.entries.keys().max() {
            trace!("cache evict: offset={}", max);
            self.entries.remove(&max);
        }
    }
}
