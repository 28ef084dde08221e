//! 프로토콜 메시지 정의
//!
//! 모든 정수는 little-endian, 패딩 없음.
//!
//! ```text
//! Announcement  [0] zero=0  [1] version  [2] file_id  [3] status
//!               [4..8] num_packets  [8..264] filename  [264..304] checksum
//! RequestPacket [0] file_id  [1..241] { u32 offset, u32 count } x 30
//! DataPacket    [0] file_id  [1] reserved  [2..4] size  [4..8] offset  [8..] data
//! ```
//!
//! 데이터그램의 첫 바이트가 0 이면 Announcement, 그 외에는 역할에 따라
//! RequestPacket (송신측이 받음) 또는 DataPacket (수신측이 받음).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    Error, FileId, Result, ANNOUNCE_VERSION, CHECKSUM_LEN, FILENAME_LEN, PACKET_SIZE,
    REQUESTS_PER_PACKET,
};

/// Announcement 크기
pub const ANNOUNCEMENT_LEN: usize = 8 + FILENAME_LEN + CHECKSUM_LEN;

/// 요청 범위 하나의 크기
pub const RANGE_LEN: usize = 8;

/// RequestPacket 크기 (빈 항목 포함 고정)
pub const REQUEST_LEN: usize = 1 + REQUESTS_PER_PACKET * RANGE_LEN;

/// DataPacket 헤더 크기
pub const DATA_HEADER_LEN: usize = 8;

/// 가장 큰 데이터그램 (수신 버퍼 크기)
pub const MAX_DATAGRAM_LEN: usize = DATA_HEADER_LEN + PACKET_SIZE;

/// 송신자 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransferStatus {
    /// 대기 중인 요청 없음: announce 만 보냄
    Waiting = 0,

    /// 요청 처리 중: 데이터 전송 중
    Transferring = 1,
}

impl TryFrom<u8> for TransferStatus {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(TransferStatus::Waiting),
            1 => Ok(TransferStatus::Transferring),
            other => Err(Error::InvalidStatus(other)),
        }
    }
}

/// 파일 announcement (송신자 → 모든 수신자, 브로드캐스트)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub file_id: FileId,
    pub status: TransferStatus,
    pub num_packets: u32,
    pub filename: String,
    /// SHA-1, 소문자 hex 40자
    pub checksum: String,
}

impl Announcement {
    /// 같은 파일을 가리키는지 (상태는 무시)
    pub fn same_file(&self, other: &Announcement) -> bool {
        self.num_packets == other.num_packets
            && self.checksum == other.checksum
            && self.filename == other.filename
    }

    /// 바이트로 직렬화 (항상 ANNOUNCEMENT_LEN 바이트)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(ANNOUNCEMENT_LEN);
        buf.put_u8(0);
        buf.put_u8(ANNOUNCE_VERSION);
        buf.put_u8(self.file_id);
        buf.put_u8(self.status as u8);
        buf.put_u32_le(self.num_packets);

        let name = truncate_utf8(&self.filename, FILENAME_LEN - 1);
        buf.put_slice(name.as_bytes());
        buf.put_bytes(0, FILENAME_LEN - name.len());

        let checksum = self.checksum.as_bytes();
        let n = checksum.len().min(CHECKSUM_LEN);
        buf.put_slice(&checksum[..n]);
        buf.put_bytes(0, CHECKSUM_LEN - n);

        buf.to_vec()
    }

    /// 바이트에서 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::Truncated {
                kind: "announcement",
                expected: ANNOUNCEMENT_LEN,
                got: bytes.len(),
            });
        }
        if bytes[0] != 0 {
            return Err(Error::InvalidMarker(bytes[0]));
        }
        if bytes[1] != ANNOUNCE_VERSION {
            return Err(Error::InvalidVersion {
                expected: ANNOUNCE_VERSION,
                got: bytes[1],
            });
        }
        if bytes.len() < ANNOUNCEMENT_LEN {
            return Err(Error::Truncated {
                kind: "announcement",
                expected: ANNOUNCEMENT_LEN,
                got: bytes.len(),
            });
        }

        let mut buf = &bytes[2..ANNOUNCEMENT_LEN];
        let file_id = buf.get_u8();
        if file_id == 0 {
            return Err(Error::InvalidFileId(file_id));
        }
        let status = TransferStatus::try_from(buf.get_u8())?;
        let num_packets = buf.get_u32_le();

        let name_field = &buf[..FILENAME_LEN];
        let name_end = name_field.iter().position(|&b| b == 0).unwrap_or(FILENAME_LEN);
        let filename = String::from_utf8_lossy(&name_field[..name_end]).into_owned();
        if filename.is_empty() {
            return Err(Error::InvalidFilename(filename));
        }
        buf.advance(FILENAME_LEN);

        let checksum_field = &buf[..CHECKSUM_LEN];
        if !checksum_field.iter().all(u8::is_ascii_hexdigit) {
            return Err(Error::InvalidChecksum);
        }
        let checksum = String::from_utf8_lossy(checksum_field).to_ascii_lowercase();

        Ok(Self {
            file_id,
            status,
            num_packets,
            filename,
            checksum,
        })
    }
}

/// 누락 패킷 범위 (offset 부터 count 개)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub offset: u32,
    pub count: u32,
}

impl Range {
    pub fn new(offset: u32, count: u32) -> Self {
        Self { offset, count }
    }

    /// 범위 끝 (exclusive). u32 를 넘을 수 있으므로 u64
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.count as u64
    }
}

/// 누락 패킷 요청 (수신자 → 송신자)
///
/// 패킷 하나에 최대 REQUESTS_PER_PACKET 개 범위.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPacket {
    pub file_id: FileId,
    pub ranges: Vec<Range>,
}

impl RequestPacket {
    pub fn new(file_id: FileId) -> Self {
        Self {
            file_id,
            ranges: Vec::with_capacity(REQUESTS_PER_PACKET),
        }
    }

    /// 범위 추가. 이미 가득 찼으면 false
    pub fn push(&mut self, range: Range) -> bool {
        if self.is_full() {
            return false;
        }
        self.ranges.push(range);
        true
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.ranges.len() >= REQUESTS_PER_PACKET
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// 모든 범위가 `[0, num_packets]` 안에 있는지 검사
    ///
    /// 범위 하나라도 잘못되면 패킷 전체가 무효. 잘못된 범위만 건너뛰지 않는다
    /// (기존 구현과의 호환을 위해 유지).
    pub fn validate(&self, num_packets: u32) -> Result<()> {
        for range in &self.ranges {
            if range.offset > num_packets || range.end() > num_packets as u64 {
                return Err(Error::InvalidRange {
                    file_id: self.file_id,
                    offset: range.offset,
                    count: range.count,
                    num_packets,
                });
            }
        }
        Ok(())
    }

    /// 바이트로 직렬화. 사용하지 않는 항목은 0 으로 채움
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(REQUEST_LEN);
        buf.put_u8(self.file_id);
        for range in self.ranges.iter().take(REQUESTS_PER_PACKET) {
            buf.put_u32_le(range.offset);
            buf.put_u32_le(range.count);
        }
        buf.put_bytes(0, REQUEST_LEN - buf.len());
        buf.to_vec()
    }

    /// 바이트에서 역직렬화. (0, 0) 항목은 빈 칸으로 보고 버린다
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < REQUEST_LEN {
            return Err(Error::Truncated {
                kind: "request",
                expected: REQUEST_LEN,
                got: bytes.len(),
            });
        }
        let mut buf = &bytes[..REQUEST_LEN];
        let file_id = buf.get_u8();
        if file_id == 0 {
            return Err(Error::InvalidFileId(file_id));
        }

        let mut packet = Self::new(file_id);
        for _ in 0..REQUESTS_PER_PACKET {
            let offset = buf.get_u32_le();
            let count = buf.get_u32_le();
            if offset != 0 || count != 0 {
                packet.ranges.push(Range::new(offset, count));
            }
        }
        Ok(packet)
    }
}

/// 파일 데이터 패킷 (송신자 → 모든 수신자, 브로드캐스트)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub file_id: FileId,
    /// 패킷 인덱스
    pub offset: u32,
    /// 유효 데이터. 마지막 패킷만 PACKET_SIZE 보다 짧을 수 있다
    pub data: Bytes,
}

impl DataPacket {
    pub fn new(file_id: FileId, offset: u32, data: Bytes) -> Self {
        debug_assert!(data.len() <= PACKET_SIZE, "데이터 {} bytes > PACKET_SIZE", data.len());
        Self {
            file_id,
            offset,
            data,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 바이트로 직렬화 (헤더 + 유효 데이터만)
    pub fn to_bytes(&self) -> Vec<u8> {
        // size 필드는 u16: PACKET_SIZE 를 넘는 데이터는 잘려 나간다
        debug_assert!(self.data.len() <= PACKET_SIZE);
        let mut buf = BytesMut::with_capacity(DATA_HEADER_LEN + self.data.len());
        buf.put_u8(self.file_id);
        buf.put_u8(0);
        buf.put_u16_le(self.data.len() as u16);
        buf.put_u32_le(self.offset);
        buf.put_slice(&self.data);
        buf.to_vec()
    }

    /// 바이트에서 역직렬화
    ///
    /// size 가 0 이거나 PACKET_SIZE 보다 크면 무효 (길이 0 파일은 DataPacket 이 없다).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DATA_HEADER_LEN {
            return Err(Error::Truncated {
                kind: "data",
                expected: DATA_HEADER_LEN,
                got: bytes.len(),
            });
        }
        let mut buf = bytes;
        let file_id = buf.get_u8();
        if file_id == 0 {
            return Err(Error::InvalidFileId(file_id));
        }
        let _reserved = buf.get_u8();
        let size = buf.get_u16_le() as usize;
        let offset = buf.get_u32_le();

        if size == 0 || size > PACKET_SIZE {
            return Err(Error::InvalidDataSize {
                size,
                max: PACKET_SIZE,
            });
        }
        if buf.len() < size {
            return Err(Error::Truncated {
                kind: "data",
                expected: DATA_HEADER_LEN + size,
                got: bytes.len(),
            });
        }

        Ok(Self {
            file_id,
            offset,
            data: Bytes::copy_from_slice(&buf[..size]),
        })
    }
}

/// 데이터그램을 해석하는 쪽의 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// 통합 메시지 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Announcement(Announcement),
    Request(RequestPacket),
    Data(DataPacket),
}

impl Packet {
    /// 첫 바이트(file_id)로 종류를 판별해 역직렬화
    pub fn decode(bytes: &[u8], role: Role) -> Result<Self> {
        let first = *bytes.first().ok_or(Error::Truncated {
            kind: "datagram",
            expected: 1,
            got: 0,
        })?;

        if first == 0 {
            return Announcement::from_bytes(bytes).map(Packet::Announcement);
        }
        match role {
            Role::Sender => RequestPacket::from_bytes(bytes).map(Packet::Request),
            Role::Receiver => DataPacket::from_bytes(bytes).map(Packet::Data),
        }
    }

    pub fn file_id(&self) -> FileId {
        match self {
            Packet::Announcement(a) => a.file_id,
            Packet::Request(r) => r.file_id,
            Packet::Data(d) => d.file_id,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Packet::Announcement(a) => a.to_bytes(),
            Packet::Request(r) => r.to_bytes(),
            Packet::Data(d) => d.to_bytes(),
        }
    }
}

/// UTF-8 경계를 지키며 최대 `max` 바이트로 자른다
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_announcement() -> Announcement {
        Announcement {
            file_id: 7,
            status: TransferStatus::Waiting,
            num_packets: 3,
            filename: "image.iso".into(),
            checksum: "a9993e364706816aba3e25717850c26c9cd0d89d".into(),
        }
    }

    #[test]
    fn test_announcement_layout() {
        let bytes = sample_announcement().to_bytes();
        assert_eq!(bytes.len(), ANNOUNCEMENT_LEN);
        assert_eq!(bytes.len(), 304);
        assert_eq!(&bytes[..4], &[0, ANNOUNCE_VERSION, 7, 0]);
        assert_eq!(&bytes[4..8], &3u32.to_le_bytes());
        assert_eq!(&bytes[8..17], b"image.iso");
        assert_eq!(bytes[17], 0);
        assert_eq!(&bytes[264..304], b"a9993e364706816aba3e25717850c26c9cd0d89d");

        let decoded = Announcement::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, sample_announcement());
    }

    #[test]
    fn test_announcement_version_mismatch() {
        let mut bytes = sample_announcement().to_bytes();
        bytes[1] = ANNOUNCE_VERSION + 1;
        let err = Announcement::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidVersion { got, .. } if got == ANNOUNCE_VERSION + 1));
    }

    #[test]
    fn test_announcement_rejects_bad_fields() {
        let good = sample_announcement().to_bytes();

        let mut bad_status = good.clone();
        bad_status[3] = 9;
        assert!(matches!(
            Announcement::from_bytes(&bad_status),
            Err(Error::InvalidStatus(9))
        ));

        let mut bad_checksum = good.clone();
        bad_checksum[270] = b'z';
        assert!(matches!(
            Announcement::from_bytes(&bad_checksum),
            Err(Error::InvalidChecksum)
        ));

        assert!(matches!(
            Announcement::from_bytes(&good[..100]),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn test_long_filename_is_truncated() {
        let mut a = sample_announcement();
        a.filename = "é".repeat(200); // 400 바이트
        let decoded = Announcement::from_bytes(&a.to_bytes()).unwrap();
        assert!(decoded.filename.len() <= FILENAME_LEN - 1);
        assert!(decoded.filename.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_request_zero_fill() {
        let mut req = RequestPacket::new(4);
        req.push(Range::new(0, 2));
        req.push(Range::new(10, 1));
        let bytes = req.to_bytes();
        assert_eq!(bytes.len(), REQUEST_LEN);
        assert!(bytes[17..].iter().all(|&b| b == 0));

        let decoded = RequestPacket::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_request_validation_is_all_or_nothing() {
        let mut req = RequestPacket::new(1);
        req.push(Range::new(0, 2));
        req.push(Range::new(8, 5)); // 8 + 5 > 10
        assert!(matches!(
            req.validate(10),
            Err(Error::InvalidRange { offset: 8, count: 5, .. })
        ));

        let mut ok = RequestPacket::new(1);
        ok.push(Range::new(0, 10));
        ok.push(Range::new(10, 0));
        assert!(ok.validate(10).is_ok());

        let mut overflow = RequestPacket::new(1);
        overflow.push(Range::new(5, u32::MAX));
        assert!(overflow.validate(10).is_err());
    }

    #[test]
    fn test_request_push_bound() {
        let mut req = RequestPacket::new(1);
        for i in 0..REQUESTS_PER_PACKET as u32 {
            assert!(req.push(Range::new(i * 2, 1)));
        }
        assert!(req.is_full());
        assert!(!req.push(Range::new(100, 1)));
    }

    #[test]
    fn test_same_file_ignores_status() {
        let a = sample_announcement();
        let mut b = a.clone();
        b.status = TransferStatus::Transferring;
        assert!(a.same_file(&b));

        b.num_packets = 4;
        assert!(!a.same_file(&b));

        let mut c = a.clone();
        c.checksum = "0".repeat(CHECKSUM_LEN);
        assert!(!a.same_file(&c));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn test_oversized_data_packet_panics_in_debug() {
        DataPacket::new(1, 0, Bytes::from(vec![0u8; PACKET_SIZE + 1]));
    }

    #[test]
    fn test_data_packet_size_rules() {
        let pkt = DataPacket::new(3, 2, Bytes::from(vec![9u8; 1808]));
        let bytes = pkt.to_bytes();
        assert_eq!(bytes.len(), DATA_HEADER_LEN + 1808);
        assert_eq!(DataPacket::from_bytes(&bytes).unwrap(), pkt);

        // size == 0
        let mut zero = bytes.clone();
        zero[2..4].copy_from_slice(&0u16.to_le_bytes());
        assert!(matches!(
            DataPacket::from_bytes(&zero),
            Err(Error::InvalidDataSize { size: 0, .. })
        ));

        // size > PACKET_SIZE
        let mut big = bytes.clone();
        big[2..4].copy_from_slice(&((PACKET_SIZE + 1) as u16).to_le_bytes());
        assert!(matches!(
            DataPacket::from_bytes(&big),
            Err(Error::InvalidDataSize { .. })
        ));

        // 헤더보다 데이터가 짧음
        assert!(matches!(
            DataPacket::from_bytes(&bytes[..100]),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn test_packet_discriminator() {
        let ann = sample_announcement().to_bytes();
        assert!(matches!(
            Packet::decode(&ann, Role::Sender),
            Ok(Packet::Announcement(_))
        ));

        let mut req = RequestPacket::new(5);
        req.push(Range::new(1, 1));
        let decoded = Packet::decode(&req.to_bytes(), Role::Sender).unwrap();
        assert_eq!(decoded.file_id(), 5);
        assert!(matches!(decoded, Packet::Request(_)));

        let data = DataPacket::new(5, 0, Bytes::from_static(b"hello")).to_bytes();
        assert!(matches!(
            Packet::decode(&data, Role::Receiver),
            Ok(Packet::Data(_))
        ));

        assert!(Packet::decode(&[], Role::Receiver).is_err());
    }
}
