//! 에러 타입 정의

use std::io;

use thiserror::Error;

use crate::FileId;

/// FBP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] io::Error),

    #[error("파일 {op} 실패: {source}")]
    FileIo {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("패킷 길이 부족 ({kind}): expected {expected}, got {got}")]
    Truncated {
        kind: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("유효하지 않은 announcement 마커: {0}")]
    InvalidMarker(u8),

    #[error("유효하지 않은 프로토콜 버전: expected {expected}, got {got}")]
    InvalidVersion { expected: u8, got: u8 },

    #[error("유효하지 않은 파일 ID: {0}")]
    InvalidFileId(u8),

    #[error("유효하지 않은 상태 값: {0}")]
    InvalidStatus(u8),

    #[error("유효하지 않은 데이터 크기: size={size}, max={max}")]
    InvalidDataSize { size: usize, max: usize },

    #[error("유효하지 않은 체크섬 문자열")]
    InvalidChecksum,

    #[error("유효하지 않은 파일 이름: {0:?}")]
    InvalidFilename(String),

    #[error("요청 범위 초과: file_id={file_id}, offset={offset}, count={count}, num_packets={num_packets}")]
    InvalidRange {
        file_id: FileId,
        offset: u32,
        count: u32,
        num_packets: u32,
    },

    #[error("패킷 오프셋 초과: offset={offset}, num_packets={num_packets}")]
    OffsetOutOfRange { offset: u32, num_packets: u32 },

    #[error("알 수 없는 파일 ID: {0}")]
    UnknownFileId(FileId),

    #[error("파일 읽기 결과 없음: offset={offset}")]
    ShortRead { offset: u32 },

    #[error("송신 버퍼 포화: {retries}회 재시도 후 포기")]
    SendBufferExhausted { retries: u32 },

    #[error("설정 에러: {0}")]
    InvalidConfig(String),

    #[error("채널 에러")]
    ChannelError,
}

/// 에러 분류 (처리 정책 결정용)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 잘못된 패킷: 해당 패킷만 버리고 계속
    ProtocolViolation,
    /// 지원하지 않는 announcement 버전: 버리고 로그
    VersionMismatch,
    /// 송신 버퍼 포화: 백오프 후 재시도, 한도 초과 시 치명적
    ResourceExhaustion,
    /// 소켓/파일 I/O 실패: 프로세스 중단
    FatalIo,
    /// 잘못된 설정 또는 사용법
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::FileIo { .. } | Error::ShortRead { .. } | Error::ChannelError => {
                ErrorKind::FatalIo
            }
            Error::InvalidVersion { .. } => ErrorKind::VersionMismatch,
            Error::SendBufferExhausted { .. } => ErrorKind::ResourceExhaustion,
            Error::InvalidConfig(_) => ErrorKind::Config,
            Error::Truncated { .. }
            | Error::InvalidMarker(_)
            | Error::InvalidFileId(_)
            | Error::InvalidStatus(_)
            | Error::InvalidDataSize { .. }
            | Error::InvalidChecksum
            | Error::InvalidFilename(_)
            | Error::InvalidRange { .. }
            | Error::OffsetOutOfRange { .. }
            | Error::UnknownFileId(_) => ErrorKind::ProtocolViolation,
        }
    }

    /// 패킷 단위로 버리고 계속 진행해도 되는 에러인지
    pub fn is_droppable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ProtocolViolation | ErrorKind::VersionMismatch
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

/// io::Result 에 실패한 파일 작업 이름을 붙인다
pub(crate) trait IoContext<T> {
    fn op(self, op: &'static str) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn op(self, op: &'static str) -> Result<T> {
        self.map_err(|source| Error::FileIo { op, source })
    }
}
