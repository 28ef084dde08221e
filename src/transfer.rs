//! 파일 하나의 전송 상태 머신
//!
//! 송신측: `Waiting` ⇄ `Transferring`. 유효한 요청이 새 패킷을 하나라도 대기열에 넣으면
//! `Transferring`, 대기 중인 패킷이 한 바퀴 돌아도 없으면 `Waiting`.
//!
//! 수신측: 받은 패킷을 기록하고 비트맵을 사이드카에 남긴다. 비트맵이 가득 차면
//! 전체 체크섬을 확인하고, 다르면 비트맵 전체를 지우고 처음부터 다시 요청한다.

use std::fs::File;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::bitmap::PresenceBitmap;
use crate::cache::PacketCache;
use crate::checksum::file_checksum;
use crate::compact::{next_pending, RequestBatches};
use crate::error::IoContext;
use crate::message::{Announcement, DataPacket, RequestPacket, TransferStatus};
use crate::store::{DiskStore, FileStore, SeekStore};
use crate::{packets_for_size, Error, FileId, Result, PACKET_SIZE};

/// 송신측 전송 상태
#[derive(Debug)]
pub struct SenderTransfer<S> {
    file_id: FileId,
    filename: String,
    num_packets: u32,
    checksum: String,
    status: TransferStatus,

    /// 요청되었지만 아직 보내지 않은 패킷
    pending: PresenceBitmap,
    pending_count: u32,

    /// 다음 탐색 시작 위치 (마지막으로 보낸 패킷 + 1)
    cursor: u32,

    cache: PacketCache,
    store: S,
}

impl SenderTransfer<DiskStore> {
    /// 디스크 파일로 송신 전송 생성. announce 이름은 경로의 마지막 요소
    pub fn open(path: &Path, file_id: FileId, cache_size: usize) -> Result<Self> {
        let file = File::open(path).op("open")?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidFilename(path.display().to_string()))?;
        Self::new(file_id, filename, SeekStore::new(file), cache_size)
    }
}

impl<S: FileStore> SenderTransfer<S> {
    /// 저장소 크기와 체크섬을 한 번 계산해 둔다
    pub fn new(file_id: FileId, filename: String, mut store: S, cache_size: usize) -> Result<Self> {
        if file_id == 0 {
            return Err(Error::InvalidFileId(file_id));
        }
        if filename.is_empty() {
            return Err(Error::InvalidFilename(filename));
        }
        let size = store.size()?;
        let num_packets = packets_for_size(size)
            .ok_or_else(|| Error::InvalidConfig(format!("file too large: {} bytes", size)))?;
        let checksum = file_checksum(&mut store)?;

        info!(
            "송신 준비: file_id={}, name={}, size={}, packets={}, sha1={}",
            file_id, filename, size, num_packets, checksum
        );

        Ok(Self {
            file_id,
            filename,
            num_packets,
            checksum,
            status: TransferStatus::Waiting,
            pending: PresenceBitmap::new(num_packets as usize),
            pending_count: 0,
            cursor: 0,
            cache: PacketCache::new(cache_size),
            store,
        })
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn num_packets(&self) -> u32 {
        self.num_packets
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn cache(&self) -> &PacketCache {
        &self.cache
    }

    /// 대기 중인 패킷 수
    pub fn pending_count(&self) -> u32 {
        self.pending_count
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    /// 현재 상태로 announcement 생성
    pub fn announcement(&self) -> Announcement {
        Announcement {
            file_id: self.file_id,
            status: self.status,
            num_packets: self.num_packets,
            filename: self.filename.clone(),
            checksum: self.checksum.clone(),
        }
    }

    /// 요청 처리. 새로 대기열에 들어간 패킷 수를 돌려준다
    ///
    /// 범위 하나라도 잘못되면 아무것도 넣지 않고 에러.
    pub fn handle_request(&mut self, request: &RequestPacket) -> Result<u32> {
        if request.file_id != self.file_id {
            return Err(Error::UnknownFileId(request.file_id));
        }
        request.validate(self.num_packets)?;

        let mut queued = 0u32;
        for range in &request.ranges {
            for offset in range.offset..range.end() as u32 {
                if self.pending.set(offset as usize) {
                    queued += 1;
                }
            }
        }
        self.pending_count += queued;

        if queued > 0 && self.status == TransferStatus::Waiting {
            self.status = TransferStatus::Transferring;
            info!(
                "file_id={}: Waiting → Transferring ({} packets queued)",
                self.file_id, queued
            );
        }
        debug!(
            "요청 처리: file_id={}, ranges={}, queued={}, pending={}",
            self.file_id,
            request.ranges.len(),
            queued,
            self.pending_count
        );
        Ok(queued)
    }

    /// 다음에 보낼 패킷 인덱스 (커서부터 순환)
    pub fn next_offset(&self) -> Option<u32> {
        next_pending(&self.pending, self.cursor)
    }

    /// 다음 패킷을 미리 캐시에 읽어 둔다
    pub fn prefetch(&mut self) -> Result<()> {
        match self.next_offset() {
            Some(offset) => self.cache.prefetch(offset, &mut self.store),
            None => Ok(()),
        }
    }

    /// 다음에 보낼 데이터 패킷. 대기 중인 것이 없으면 `Waiting` 으로 돌아가고 None
    ///
    /// 보내기에 성공한 뒤 `mark_sent` 를 불러야 대기열에서 빠진다.
    pub fn next_data_packet(&mut self) -> Result<Option<DataPacket>> {
        let Some(offset) = self.next_offset() else {
            self.settle_status();
            return Ok(None);
        };
        let data = self.cache.get(offset, &mut self.store)?;
        Ok(Some(DataPacket::new(self.file_id, offset, data)))
    }

    /// 패킷 송신 완료 기록
    pub fn mark_sent(&mut self, offset: u32) {
        if self.pending.clear(offset as usize) {
            self.pending_count -= 1;
        }
        self.cursor = offset.wrapping_add(1);
        if self.pending_count == 0 {
            self.settle_status();
        }
    }

    fn settle_status(&mut self) {
        if self.status == TransferStatus::Transferring {
            self.status = TransferStatus::Waiting;
            info!("file_id={}: Transferring → Waiting", self.file_id);
        }
    }
}

/// 전체 체크섬 확인 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified,
    /// 불일치: 비트맵이 전부 지워졌다
    Mismatch { expected: String, actual: String },
}

/// 데이터 패킷 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOutcome {
    /// 새 패킷 기록
    Accepted,
    /// 이미 가진 패킷: 아무것도 하지 않음
    Duplicate,
    /// 마지막 누락 패킷을 기록하고 체크섬까지 확인함
    Completed(Verification),
}

/// 수신측 전송 상태
///
/// `data` 는 복원 중인 파일, `sidecar` 는 비트맵 덤프.
#[derive(Debug)]
pub struct ReceiverTransfer<S> {
    file_id: FileId,
    filename: String,
    num_packets: u32,
    checksum: String,
    have: PresenceBitmap,
    data: S,
    sidecar: S,
}

impl<S: FileStore> ReceiverTransfer<S> {
    /// announcement 와 저장소로 생성. `have` 는 이어받기 시 사이드카에서 읽은 비트맵
    pub fn new(announcement: &Announcement, data: S, sidecar: S, have: PresenceBitmap) -> Self {
        Self {
            file_id: announcement.file_id,
            filename: announcement.filename.clone(),
            num_packets: announcement.num_packets,
            checksum: announcement.checksum.clone(),
            have,
            data,
            sidecar,
        }
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn num_packets(&self) -> u32 {
        self.num_packets
    }

    pub fn have(&self) -> &PresenceBitmap {
        &self.have
    }

    pub fn received_packets(&self) -> u32 {
        self.have.count_set() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.have.is_full()
    }

    /// 진행률 (0.0 ~ 100.0)
    pub fn progress_percent(&self) -> f64 {
        if self.num_packets == 0 {
            return 100.0;
        }
        self.received_packets() as f64 * 100.0 / self.num_packets as f64
    }

    /// 누락 범위 요청 패킷들
    pub fn requests(&self) -> RequestBatches<'_> {
        RequestBatches::new(self.file_id, &self.have, self.num_packets)
    }

    /// 데이터 패킷 기록
    pub fn handle_data(&mut self, packet: &DataPacket) -> Result<DataOutcome> {
        if packet.file_id != self.file_id {
            return Err(Error::UnknownFileId(packet.file_id));
        }
        if packet.offset >= self.num_packets {
            return Err(Error::OffsetOutOfRange {
                offset: packet.offset,
                num_packets: self.num_packets,
            });
        }
        // 마지막 패킷만 짧을 수 있다
        let is_last = packet.offset + 1 == self.num_packets;
        if !is_last && packet.size() != PACKET_SIZE {
            return Err(Error::InvalidDataSize {
                size: packet.size(),
                max: PACKET_SIZE,
            });
        }

        if self.have.is_set(packet.offset as usize) {
            return Ok(DataOutcome::Duplicate);
        }

        let start = packet.offset as u64 * PACKET_SIZE as u64;
        self.data.write_at(start, &packet.data)?;
        if is_last {
            // 이전에 더 긴 파일이 쓰던 .data 라면 꼬리가 남아 있다
            self.data.set_len(start + packet.size() as u64)?;
        }
        self.have.set(packet.offset as usize);
        self.persist_bitmap()?;

        if self.have.is_full() {
            return Ok(DataOutcome::Completed(self.verify()?));
        }
        Ok(DataOutcome::Accepted)
    }

    /// 전체 체크섬 확인. 불일치면 비트맵을 지우고 사이드카에도 반영한다
    ///
    /// 디스크의 데이터는 그대로 두고 다시 받으면서 덮어쓴다.
    pub fn verify(&mut self) -> Result<Verification> {
        if self.num_packets == 0 {
            self.data.set_len(0)?;
        }
        self.data.flush()?;
        let actual = file_checksum(&mut self.data)?;
        if actual == self.checksum {
            info!("file_id={}: 체크섬 일치 ({})", self.file_id, self.filename);
            return Ok(Verification::Verified);
        }

        warn!(
            "file_id={}: 체크섬 불일치 expected={}, actual={}, 처음부터 다시 받음",
            self.file_id, self.checksum, actual
        );
        self.have.clear_all();
        self.persist_bitmap()?;
        Ok(Verification::Mismatch {
            expected: self.checksum.clone(),
            actual,
        })
    }

    /// 비트맵 전체를 사이드카에 다시 쓴다
    pub fn persist_bitmap(&mut self) -> Result<()> {
        self.sidecar.write_at(0, &self.have.to_bytes())?;
        self.sidecar.flush()
    }

    /// 저장소 반환 (완료 후 파일을 닫고 이름을 바꾸기 위해)
    pub fn into_stores(self) -> (S, S) {
        (self.data, self.sidecar)
    }
}
