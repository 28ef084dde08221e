//! # FBP (File Broadcast Protocol)
//!
//! UDP 브로드캐스트 기반 단일 송신자 → 다수 수신자 파일 배포 프로토콜
//!
//! ## 핵심 특징
//! - **announce 기반**: 송신자가 파일 메타데이터를 주기적으로 브로드캐스트
//! - **범위 요청**: 수신자는 누락된 패킷 범위만 요청
//! - **연결 없음**: 수신자별 상태를 송신자가 들고 있지 않음
//! - **패킷 캐시**: 반복 요청되는 패킷은 디스크를 다시 읽지 않음
//! - **속도 제어**: 초당 패킷 예산 + 송신 버퍼 포화 시 가산 백오프
//! - **체크섬 검증**: 전체 파일 SHA-1 불일치 시 처음부터 다시 받기
//! - **이어받기**: 수신측 비트맵을 사이드카 파일로 유지

pub mod bitmap;
pub mod cache;
pub mod checksum;
pub mod compact;
pub mod config;
pub mod download;
pub mod error;
pub mod message;
pub mod rate;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod store;
pub mod transfer;

pub use bitmap::PresenceBitmap;
pub use cache::PacketCache;
pub use config::Config;
pub use download::{DownloadTable, FileProgress, ReceiverEvent};
pub use error::{Error, ErrorKind, Result};
pub use message::{Announcement, DataPacket, Packet, Range, RequestPacket, Role, TransferStatus};
pub use rate::RateController;
pub use receiver::Receiver;
pub use sender::Sender;
pub use stats::TransferStats;
pub use store::{DiskStore, FileStore, SeekStore};
pub use transfer::{ReceiverTransfer, SenderTransfer};

/// 파일 식별자 (1..=255, 0 은 Announcement 표시용)
pub type FileId = u8;

/// Announcement 프로토콜 버전
pub const ANNOUNCE_VERSION: u8 = 1;

/// 기본 UDP 포트
pub const DEFAULT_PORT: u16 = 1026;

/// 패킷 하나에 담기는 파일 데이터 크기 (바이트)
pub const PACKET_SIZE: usize = 4096;

/// RequestPacket 하나에 담기는 최대 범위 수
pub const REQUESTS_PER_PACKET: usize = 30;

/// Announcement 의 파일 이름 필드 크기 (NUL 포함)
pub const FILENAME_LEN: usize = 256;

/// SHA-1 hex 문자열 길이
pub const CHECKSUM_LEN: usize = 40;

/// 파일 크기에 필요한 패킷 수 (`ceil(size / PACKET_SIZE)`)
///
/// u32 를 넘으면 None.
pub fn packets_for_size(size: u64) -> Option<u32> {
    let n = size.div_ceil(PACKET_SIZE as u64);
    u32::try_from(n).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packets_for_size() {
        assert_eq!(packets_for_size(0), Some(0));
        assert_eq!(packets_for_size(1), Some(1));
        assert_eq!(packets_for_size(PACKET_SIZE as u64), Some(1));
        assert_eq!(packets_for_size(10_000), Some(3));
        assert_eq!(packets_for_size(u64::MAX), None);
    }
}
