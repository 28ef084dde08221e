//! 누락 범위 압축
//!
//! 비트맵의 "없음" 구간을 (offset, count) 범위로 바꾸고,
//! 범위들을 REQUESTS_PER_PACKET 개씩 RequestPacket 으로 묶는다.

use crate::bitmap::PresenceBitmap;
use crate::message::{Range, RequestPacket};
use crate::FileId;

/// 비트맵에서 연속된 해제 비트 구간을 오름차순으로 내놓는 반복자
pub struct MissingRanges<'a> {
    have: &'a PresenceBitmap,
    end: usize,
    pos: usize,
}

impl<'a> MissingRanges<'a> {
    /// `[0, num_packets)` 구간을 검사한다
    pub fn new(have: &'a PresenceBitmap, num_packets: u32) -> Self {
        Self {
            have,
            end: (num_packets as usize).min(have.len()),
            pos: 0,
        }
    }
}

impl Iterator for MissingRanges<'_> {
    type Item = Range;

    fn next(&mut self) -> Option<Range> {
        let start = self.have.first_clear_in(self.pos, self.end)?;
        let stop = self.have.first_set_in(start, self.end).unwrap_or(self.end);
        self.pos = stop;
        Some(Range::new(start as u32, (stop - start) as u32))
    }
}

/// 누락 범위를 RequestPacket 단위로 묶어 내놓는 반복자
///
/// 패킷이 가득 차면 바로 내보내고 새 패킷을 시작한다. 범위가 하나도 없으면 아무것도 내놓지 않는다.
pub struct RequestBatches<'a> {
    file_id: FileId,
    ranges: MissingRanges<'a>,
}

impl<'a> RequestBatches<'a> {
    pub fn new(file_id: FileId, have: &'a PresenceBitmap, num_packets: u32) -> Self {
        Self {
            file_id,
            ranges: MissingRanges::new(have, num_packets),
        }
    }
}

impl Iterator for RequestBatches<'_> {
    type Item = RequestPacket;

    fn next(&mut self) -> Option<RequestPacket> {
        let mut packet = RequestPacket::new(self.file_id);
        while !packet.is_full() {
            match self.ranges.next() {
                Some(range) => {
                    packet.push(range);
                }
                None => break,
            }
        }
        (!packet.is_empty()).then_some(packet)
    }
}

/// 송신측: 마지막으로 보낸 위치부터 순환하며 다음 대기 중인 패킷을 고른다
///
/// 0 부터가 아니라 커서부터 찾으므로 여러 요청 사이에 라운드로빈이 된다.
pub fn next_pending(pending: &PresenceBitmap, cursor: u32) -> Option<u32> {
    pending.find_next_set(cursor as usize).map(|i| i as u32)
}
