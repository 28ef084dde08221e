//! 수신측 다운로드 테이블
//!
//! file_id 별로 진행 중(또는 완료된) 다운로드를 관리한다.
//!
//! - 디스크 배치: `<dir>/<name>.data` (복원 중인 바이트), `<dir>/<name>.bmask` (비트맵 덤프)
//! - 완료 시 `<name>.data` → `<name>` 으로 이름을 바꾸고 사이드카 삭제
//! - announce 가 `liveness_timeout` 동안 없으면 테이블에서 지운다 (부분 파일은 이어받기용으로 남김)

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::bitmap::PresenceBitmap;
use crate::checksum::file_checksum;
use crate::error::IoContext;
use crate::message::{Announcement, DataPacket, RequestPacket, TransferStatus};
use crate::stats::TransferStats;
use crate::store::{DiskStore, SeekStore};
use crate::transfer::{DataOutcome, ReceiverTransfer, Verification};
use crate::{Error, FileId, Result};

/// 데이터 파일 확장자
const DATA_SUFFIX: &str = ".data";

/// 비트맵 사이드카 확장자
const MASK_SUFFIX: &str = ".bmask";

/// 수신자 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    /// 새 파일을 알게 됨
    FileAdded {
        file_id: FileId,
        filename: String,
        num_packets: u32,
    },

    /// 만료되었거나 다른 파일로 바뀌어 테이블에서 빠짐
    FileRemoved { file_id: FileId, filename: String },

    /// 진행률 변화 (정수 % 가 바뀔 때만)
    Progress {
        file_id: FileId,
        received: u32,
        num_packets: u32,
    },

    /// 체크섬까지 확인하고 최종 파일로 저장함
    DownloadFinished {
        file_id: FileId,
        filename: String,
        path: PathBuf,
    },

    /// 체크섬 불일치로 처음부터 다시 받음
    ChecksumMismatch { file_id: FileId, filename: String },
}

/// 다운로드 하나의 진행 상황
#[derive(Debug, Clone, PartialEq)]
pub struct FileProgress {
    pub file_id: FileId,
    pub filename: String,
    pub received: u32,
    pub num_packets: u32,
    pub finished: bool,
}

impl FileProgress {
    pub fn percent(&self) -> f64 {
        if self.finished || self.num_packets == 0 {
            return 100.0;
        }
        self.received as f64 * 100.0 / self.num_packets as f64
    }
}

enum Slot {
    Active(ReceiverTransfer<DiskStore>),
    /// 완료됨. 같은 announce 가 계속 와도 다시 받지 않는다
    Finished,
}

struct Download {
    /// 파일 이름을 정리한 announcement
    announcement: Announcement,
    slot: Slot,
    last_seen: Instant,
    last_percent: u32,
}

impl Download {
    fn matches(&self, announcement: &Announcement) -> bool {
        self.announcement.same_file(announcement)
    }

    fn progress(&self) -> FileProgress {
        let (received, finished) = match &self.slot {
            Slot::Active(t) => (t.received_packets(), false),
            Slot::Finished => (self.announcement.num_packets, true),
        };
        FileProgress {
            file_id: self.announcement.file_id,
            filename: self.announcement.filename.clone(),
            received,
            num_packets: self.announcement.num_packets,
            finished,
        }
    }
}

/// 파일 하나의 디스크 경로들
struct DownloadPaths {
    data: PathBuf,
    mask: PathBuf,
    done: PathBuf,
}

impl DownloadPaths {
    fn new(dir: &Path, name: &str) -> Self {
        Self {
            data: dir.join(format!("{}{}", name, DATA_SUFFIX)),
            mask: dir.join(format!("{}{}", name, MASK_SUFFIX)),
            done: dir.join(name),
        }
    }
}

/// 수신측 다운로드 테이블 (엔진 태스크가 단독 소유)
pub struct DownloadTable {
    dir: PathBuf,
    entries: HashMap<FileId, Download>,
    events: Vec<ReceiverEvent>,
    stats: TransferStats,
}

impl DownloadTable {
    /// 저장 디렉터리가 없으면 만든다
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).op("create_dir")?;
        Ok(Self {
            dir,
            entries: HashMap::new(),
            events: Vec::new(),
            stats: TransferStats::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, file_id: FileId) -> bool {
        self.entries.contains_key(&file_id)
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut TransferStats {
        &mut self.stats
    }

    /// 쌓인 이벤트를 꺼낸다
    pub fn take_events(&mut self) -> Vec<ReceiverEvent> {
        mem::take(&mut self.events)
    }

    /// file_id 순 진행 상황
    pub fn progress(&self) -> Vec<FileProgress> {
        let mut list: Vec<FileProgress> = self.entries.values().map(Download::progress).collect();
        list.sort_by_key(|p| p.file_id);
        list
    }

    /// announcement 처리. 보내야 할 요청 패킷들을 돌려준다
    ///
    /// 송신자가 `Transferring` 이면 바쁜 것으로 보고 요청하지 않는다.
    pub fn on_announcement(
        &mut self,
        announcement: &Announcement,
        now: Instant,
    ) -> Result<Vec<RequestPacket>> {
        self.stats.announcements_received += 1;

        let filename = sanitize_filename(&announcement.filename)?;
        let announcement = Announcement {
            filename,
            ..announcement.clone()
        };
        let file_id = announcement.file_id;

        if let Some(existing) = self.entries.get(&file_id) {
            if !existing.matches(&announcement) {
                info!(
                    "file_id={}: announcement 변경 ({} → {}, packets {} → {}), 상태 초기화",
                    file_id,
                    existing.announcement.filename,
                    announcement.filename,
                    existing.announcement.num_packets,
                    announcement.num_packets
                );
                self.replace(file_id)?;
            }
        }

        if !self.entries.contains_key(&file_id) {
            let slot = self.open(&announcement)?;
            info!(
                "새 파일: file_id={}, name={}, packets={}",
                file_id, announcement.filename, announcement.num_packets
            );
            self.events.push(ReceiverEvent::FileAdded {
                file_id,
                filename: announcement.filename.clone(),
                num_packets: announcement.num_packets,
            });
            self.entries.insert(
                file_id,
                Download {
                    announcement: announcement.clone(),
                    slot,
                    last_seen: now,
                    last_percent: 0,
                },
            );
        }

        let Some(entry) = self.entries.get_mut(&file_id) else {
            return Ok(Vec::new());
        };
        entry.last_seen = now;

        let Slot::Active(transfer) = &mut entry.slot else {
            return Ok(Vec::new());
        };
        if announcement.status == TransferStatus::Transferring {
            trace!("file_id={}: 송신자 전송 중, 요청 보류", file_id);
            return Ok(Vec::new());
        }

        let requests: Vec<RequestPacket> = transfer.requests().collect();
        if !requests.is_empty() {
            return Ok(requests);
        }

        // 누락 없음 (이어받기 직후 등): 바로 검증
        match transfer.verify()? {
            Verification::Verified => {
                self.finalize(file_id)?;
                Ok(Vec::new())
            }
            Verification::Mismatch { .. } => {
                let requests = transfer.requests().collect();
                self.on_mismatch(file_id, &announcement.filename);
                Ok(requests)
            }
        }
    }

    /// 데이터 패킷 처리
    ///
    /// 알 수 없는 파일, 완료된 파일, 잘못된 패킷은 버린다. 파일 I/O 실패만 에러.
    pub fn on_data(&mut self, packet: &DataPacket) -> Result<()> {
        let Some(entry) = self.entries.get_mut(&packet.file_id) else {
            self.stats.dropped_packets += 1;
            debug!("알 수 없는 file_id={} 데이터 버림", packet.file_id);
            return Ok(());
        };
        let Slot::Active(transfer) = &mut entry.slot else {
            self.stats.duplicate_packets += 1;
            return Ok(());
        };

        let outcome = match transfer.handle_data(packet) {
            Ok(outcome) => outcome,
            Err(e) if e.is_droppable() => {
                self.stats.dropped_packets += 1;
                debug!("데이터 패킷 버림: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if outcome == DataOutcome::Duplicate {
            self.stats.duplicate_packets += 1;
            return Ok(());
        }

        self.stats.data_packets_received += 1;
        self.stats.bytes_received += packet.size() as u64;

        let file_id = packet.file_id;
        let received = transfer.received_packets();
        let num_packets = transfer.num_packets();
        let percent = transfer.progress_percent() as u32;
        if percent != entry.last_percent {
            entry.last_percent = percent;
            self.events.push(ReceiverEvent::Progress {
                file_id,
                received,
                num_packets,
            });
        }

        match outcome {
            DataOutcome::Completed(Verification::Verified) => self.finalize(file_id),
            DataOutcome::Completed(Verification::Mismatch { .. }) => {
                entry.last_percent = 0;
                let filename = entry.announcement.filename.clone();
                self.on_mismatch(file_id, &filename);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// `timeout` 동안 announce 가 없던 파일을 지운다
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> usize {
        let expired: Vec<FileId> = self
            .entries
            .iter()
            .filter(|(_, d)| now.saturating_duration_since(d.last_seen) > timeout)
            .map(|(&id, _)| id)
            .collect();

        for &file_id in &expired {
            if let Some(download) = self.entries.remove(&file_id) {
                info!(
                    "file_id={} ({}) 만료: {:?} 동안 announce 없음",
                    file_id, download.announcement.filename, timeout
                );
                self.events.push(ReceiverEvent::FileRemoved {
                    file_id,
                    filename: download.announcement.filename,
                });
            }
        }
        expired.len()
    }

    /// 다운로드를 열거나 이어받는다
    fn open(&self, announcement: &Announcement) -> Result<Slot> {
        let paths = DownloadPaths::new(&self.dir, &announcement.filename);
        let num_bits = announcement.num_packets as usize;

        // 이미 받은 최종 파일이 있으면 다시 받지 않는다
        if !paths.data.exists() && paths.done.exists() {
            let mut existing = SeekStore::new(File::open(&paths.done).op("open")?);
            if file_checksum(&mut existing)? == announcement.checksum {
                info!("{} 이미 받음", paths.done.display());
                return Ok(Slot::Finished);
            }
        }

        let resumed = if paths.data.exists() {
            match fs::read(&paths.mask) {
                Ok(bytes) => {
                    let have = PresenceBitmap::from_bytes(num_bits, &bytes);
                    if have.is_none() {
                        warn!(
                            "{}: 사이드카 크기 불일치 ({} bytes, expected {}), 처음부터 받음",
                            paths.mask.display(),
                            bytes.len(),
                            PresenceBitmap::byte_len(num_bits)
                        );
                    }
                    have
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                Err(e) => return Err(e).op("read"),
            }
        } else {
            None
        };

        let fresh = resumed.is_none();
        if fresh {
            remove_if_exists(&paths.data)?;
            remove_if_exists(&paths.mask)?;
        }

        let data = open_rw(&paths.data)?;
        let mask = open_rw(&paths.mask)?;
        let have = resumed.unwrap_or_else(|| PresenceBitmap::new(num_bits));
        if !fresh {
            info!(
                "{} 이어받기: {}/{} packets",
                paths.data.display(),
                have.count_set(),
                num_bits
            );
        }

        let mut transfer = ReceiverTransfer::new(
            announcement,
            SeekStore::new(data),
            SeekStore::new(mask),
            have,
        );
        if fresh {
            transfer.persist_bitmap()?;
        }
        Ok(Slot::Active(transfer))
    }

    /// 다른 파일로 바뀐 항목을 지운다. 진행 중이던 부분 파일도 삭제
    fn replace(&mut self, file_id: FileId) -> Result<()> {
        let Some(download) = self.entries.remove(&file_id) else {
            return Ok(());
        };
        let filename = download.announcement.filename;
        if let Slot::Active(transfer) = download.slot {
            drop(transfer.into_stores());
            let paths = DownloadPaths::new(&self.dir, &filename);
            remove_if_exists(&paths.data)?;
            remove_if_exists(&paths.mask)?;
        }
        self.events.push(ReceiverEvent::FileRemoved { file_id, filename });
        Ok(())
    }

    /// 검증된 다운로드를 최종 파일로 옮긴다
    fn finalize(&mut self, file_id: FileId) -> Result<()> {
        let Some(entry) = self.entries.get_mut(&file_id) else {
            return Ok(());
        };
        let Slot::Active(transfer) = mem::replace(&mut entry.slot, Slot::Finished) else {
            return Ok(());
        };
        // 이름을 바꾸기 전에 파일을 닫는다
        drop(transfer.into_stores());

        let filename = entry.announcement.filename.clone();
        let paths = DownloadPaths::new(&self.dir, &filename);
        fs::rename(&paths.data, &paths.done).op("rename")?;
        remove_if_exists(&paths.mask)?;

        self.stats.completed_files += 1;
        info!("다운로드 완료: file_id={}, {}", file_id, paths.done.display());
        self.events.push(ReceiverEvent::DownloadFinished {
            file_id,
            filename,
            path: paths.done,
        });
        Ok(())
    }

    fn on_mismatch(&mut self, file_id: FileId, filename: &str) {
        self.stats.checksum_restarts += 1;
        self.events.push(ReceiverEvent::ChecksumMismatch {
            file_id,
            filename: filename.to_string(),
        });
    }
}

/// announce 된 이름에서 마지막 경로 요소만 남긴다
///
/// 빈 이름, `.`, `..` 는 거부.
pub fn sanitize_filename(name: &str) -> Result<String> {
    let base = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(name);
    if base.is_empty() || base == "." || base == ".." {
        return Err(Error::InvalidFilename(name.to_string()));
    }
    Ok(base.to_string())
}

fn open_rw(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .op("open")
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).op("remove"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum_bytes;
    use crate::message::Range;
    use crate::{packets_for_size, PACKET_SIZE};
    use bytes::Bytes;

    fn file_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 13 % 256) as u8).collect()
    }

    fn announcement(file_id: FileId, name: &str, data: &[u8]) -> Announcement {
        Announcement {
            file_id,
            status: TransferStatus::Waiting,
            num_packets: packets_for_size(data.len() as u64).unwrap(),
            filename: name.into(),
            checksum: checksum_bytes(data),
        }
    }

    fn packet(file_id: FileId, data: &[u8], offset: u32) -> DataPacket {
        let start = offset as usize * PACKET_SIZE;
        let end = (start + PACKET_SIZE).min(data.len());
        DataPacket::new(file_id, offset, Bytes::copy_from_slice(&data[start..end]))
    }

    #[test]
    fn test_new_file_requests_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = DownloadTable::new(dir.path()).unwrap();
        let data = file_bytes(10_000);

        let reqs = table
            .on_announcement(&announcement(1, "a.bin", &data), Instant::now())
            .unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].ranges, vec![Range::new(0, 3)]);

        assert_eq!(
            table.take_events(),
            vec![ReceiverEvent::FileAdded {
                file_id: 1,
                filename: "a.bin".into(),
                num_packets: 3
            }]
        );
        assert!(dir.path().join("a.bin.data").exists());
        let mask = fs::read(dir.path().join("a.bin.bmask")).unwrap();
        assert_eq!(mask.len(), PresenceBitmap::byte_len(3));
    }

    #[test]
    fn test_full_download_is_finalized() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = DownloadTable::new(dir.path()).unwrap();
        let data = file_bytes(10_000);
        let ann = announcement(1, "a.bin", &data);
        let now = Instant::now();
        table.on_announcement(&ann, now).unwrap();

        for offset in [2, 0, 1] {
            table.on_data(&packet(1, &data, offset)).unwrap();
        }

        let events = table.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            ReceiverEvent::DownloadFinished { file_id: 1, .. }
        )));
        assert_eq!(fs::read(dir.path().join("a.bin")).unwrap(), data);
        assert!(!dir.path().join("a.bin.data").exists());
        assert!(!dir.path().join("a.bin.bmask").exists());
        assert_eq!(table.stats().completed_files, 1);

        // 같은 announce 가 계속 와도 다시 받지 않는다
        assert!(table.on_announcement(&ann, now).unwrap().is_empty());
        table.on_data(&packet(1, &data, 0)).unwrap();
        assert!(table.take_events().is_empty());
        assert!(table.progress()[0].finished);
    }

    #[test]
    fn test_changed_announcement_resets_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = DownloadTable::new(dir.path()).unwrap();
        let old = file_bytes(10_000);
        let now = Instant::now();
        table.on_announcement(&announcement(1, "a.bin", &old), now).unwrap();
        table.on_data(&packet(1, &old, 0)).unwrap();
        table.take_events();

        // 같은 file_id 가 이제 4 패킷짜리 파일을 가리킴
        let new = file_bytes(PACKET_SIZE * 3 + 10);
        let ann = announcement(1, "a.bin", &new);
        assert_eq!(ann.num_packets, 4);
        let reqs = table.on_announcement(&ann, now).unwrap();
        assert_eq!(reqs[0].ranges, vec![Range::new(0, 4)]);

        let events = table.take_events();
        assert!(matches!(events[0], ReceiverEvent::FileRemoved { file_id: 1, .. }));
        assert!(matches!(
            events[1],
            ReceiverEvent::FileAdded { file_id: 1, num_packets: 4, .. }
        ));
        assert_eq!(table.progress()[0].received, 0);
    }

    #[test]
    fn test_resume_from_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let data = file_bytes(PACKET_SIZE * 5);
        let ann = announcement(2, "b.bin", &data);
        let now = Instant::now();
        {
            let mut table = DownloadTable::new(dir.path()).unwrap();
            table.on_announcement(&ann, now).unwrap();
            for offset in [0, 2, 3] {
                table.on_data(&packet(2, &data, offset)).unwrap();
            }
        }

        let mut table = DownloadTable::new(dir.path()).unwrap();
        let reqs = table.on_announcement(&ann, now).unwrap();
        assert_eq!(reqs[0].ranges, vec![Range::new(1, 1), Range::new(4, 1)]);

        for offset in [1, 4] {
            table.on_data(&packet(2, &data, offset)).unwrap();
        }
        assert_eq!(fs::read(dir.path().join("b.bin")).unwrap(), data);
    }

    #[test]
    fn test_sidecar_size_mismatch_restarts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("c.bin.data"), b"stale").unwrap();
        fs::write(dir.path().join("c.bin.bmask"), [0xFFu8; 3]).unwrap();

        let mut table = DownloadTable::new(dir.path()).unwrap();
        let data = file_bytes(PACKET_SIZE * 2);
        let reqs = table
            .on_announcement(&announcement(3, "c.bin", &data), Instant::now())
            .unwrap();
        assert_eq!(reqs[0].ranges, vec![Range::new(0, 2)]);
        assert_eq!(fs::read(dir.path().join("c.bin.data")).unwrap().len(), 0);
        assert_eq!(
            fs::read(dir.path().join("c.bin.bmask")).unwrap(),
            vec![0u8; PresenceBitmap::byte_len(2)]
        );
    }

    #[test]
    fn test_resume_over_longer_stale_data_completes() {
        let dir = tempfile::tempdir().unwrap();
        // 4 패킷짜리 이전 파일의 .data 와, 3 패킷에도 맞는 크기의 빈 사이드카
        fs::write(dir.path().join("a.bin.data"), vec![0xAAu8; PACKET_SIZE * 4]).unwrap();
        fs::write(
            dir.path().join("a.bin.bmask"),
            vec![0u8; PresenceBitmap::byte_len(3)],
        )
        .unwrap();

        let mut table = DownloadTable::new(dir.path()).unwrap();
        let data = file_bytes(10_000);
        let reqs = table
            .on_announcement(&announcement(1, "a.bin", &data), Instant::now())
            .unwrap();
        assert_eq!(reqs[0].ranges, vec![Range::new(0, 3)]);

        for offset in 0..3 {
            table.on_data(&packet(1, &data, offset)).unwrap();
        }

        let events = table.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, ReceiverEvent::DownloadFinished { file_id: 1, .. })));
        assert_eq!(table.stats().checksum_restarts, 0);
        assert_eq!(table.stats().completed_files, 1);
        assert_eq!(fs::read(dir.path().join("a.bin")).unwrap(), data);
    }

    #[test]
    fn test_busy_sender_gets_no_requests() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = DownloadTable::new(dir.path()).unwrap();
        let mut ann = announcement(1, "a.bin", &file_bytes(100));
        ann.status = TransferStatus::Transferring;
        assert!(table.on_announcement(&ann, Instant::now()).unwrap().is_empty());
        assert!(table.contains(1));
    }

    #[test]
    fn test_checksum_mismatch_restarts_download() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = DownloadTable::new(dir.path()).unwrap();
        let data = file_bytes(PACKET_SIZE * 2);
        let mut ann = announcement(1, "a.bin", &data);
        ann.checksum = "0".repeat(40);
        let now = Instant::now();
        table.on_announcement(&ann, now).unwrap();
        table.take_events();

        table.on_data(&packet(1, &data, 0)).unwrap();
        table.on_data(&packet(1, &data, 1)).unwrap();
        let events = table.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, ReceiverEvent::ChecksumMismatch { file_id: 1, .. })));
        assert_eq!(table.stats().checksum_restarts, 1);

        let reqs = table.on_announcement(&ann, now).unwrap();
        assert_eq!(reqs[0].ranges, vec![Range::new(0, 2)]);
    }

    #[test]
    fn test_sweep_expires_silent_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = DownloadTable::new(dir.path()).unwrap();
        let start = Instant::now();
        table
            .on_announcement(&announcement(1, "a.bin", &file_bytes(10)), start)
            .unwrap();
        table
            .on_announcement(&announcement(2, "b.bin", &file_bytes(10)), start + Duration::from_secs(8))
            .unwrap();
        table.take_events();

        let removed = table.sweep(start + Duration::from_secs(11), Duration::from_secs(10));
        assert_eq!(removed, 1);
        assert!(!table.contains(1));
        assert!(table.contains(2));
        assert_eq!(
            table.take_events(),
            vec![ReceiverEvent::FileRemoved {
                file_id: 1,
                filename: "a.bin".into()
            }]
        );
        // 부분 파일은 남는다
        assert!(dir.path().join("a.bin.data").exists());
    }

    #[test]
    fn test_unknown_and_invalid_data_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = DownloadTable::new(dir.path()).unwrap();
        let data = file_bytes(10_000);
        table
            .on_announcement(&announcement(1, "a.bin", &data), Instant::now())
            .unwrap();

        table.on_data(&packet(9, &data, 0)).unwrap();
        table
            .on_data(&DataPacket::new(1, 7, Bytes::from_static(b"x")))
            .unwrap();
        assert_eq!(table.stats().dropped_packets, 2);
        assert_eq!(table.progress()[0].received, 0);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a.bin").unwrap(), "a.bin");
        assert_eq!(sanitize_filename("/etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("..\\..\\boot.ini").unwrap(), "boot.ini");
        assert!(sanitize_filename("dir/").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("a/.").is_err());
    }
}
