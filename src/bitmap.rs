//! 패킷 존재 비트맵
//!
//! 파일 하나의 패킷 인덱스 `[0, num_bits)` 마다 1비트.
//! - 송신측: "요청은 왔지만 아직 보내지 않은 패킷"
//! - 수신측: "이미 디스크에 기록된 패킷"
//!
//! 64비트 워드 배열로 저장하며, 사이드카 파일에는 워드를 little-endian 으로 그대로 덤프한다.

/// 워드당 비트 수
pub const BITS_PER_WORD: usize = 64;

/// 사이드카 파일에서 워드 하나가 차지하는 바이트 수
pub const WORD_BYTES: usize = BITS_PER_WORD / 8;

/// 패킷 존재 비트맵
#[derive(Clone, PartialEq, Eq)]
pub struct PresenceBitmap {
    words: Vec<u64>,
    num_bits: usize,
}

impl PresenceBitmap {
    /// 모든 비트가 0 인 비트맵 생성
    pub fn new(num_bits: usize) -> Self {
        Self {
            words: vec![0u64; Self::word_count(num_bits)],
            num_bits,
        }
    }

    fn word_count(num_bits: usize) -> usize {
        num_bits.div_ceil(BITS_PER_WORD)
    }

    /// `num_bits` 비트 비트맵의 사이드카 파일 크기 (바이트)
    pub fn byte_len(num_bits: usize) -> usize {
        Self::word_count(num_bits) * WORD_BYTES
    }

    /// 비트 수
    #[inline]
    pub fn len(&self) -> usize {
        self.num_bits
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// 비트 설정. 새로 설정된 경우 true
    #[inline]
    pub fn set(&mut self, i: usize) -> bool {
        if i >= self.num_bits {
            return false;
        }
        let mask = 1u64 << (i % BITS_PER_WORD);
        let word = &mut self.words[i / BITS_PER_WORD];
        if *word & mask != 0 {
            return false;
        }
        *word |= mask;
        true
    }

    /// 비트 해제. 설정되어 있던 경우 true
    #[inline]
    pub fn clear(&mut self, i: usize) -> bool {
        if i >= self.num_bits {
            return false;
        }
        let mask = 1u64 << (i % BITS_PER_WORD);
        let word = &mut self.words[i / BITS_PER_WORD];
        if *word & mask == 0 {
            return false;
        }
        *word &= !mask;
        true
    }

    #[inline]
    pub fn is_set(&self, i: usize) -> bool {
        if i >= self.num_bits {
            return false;
        }
        self.words[i / BITS_PER_WORD] & (1u64 << (i % BITS_PER_WORD)) != 0
    }

    /// 전체 초기화 (재시작)
    pub fn clear_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// 설정된 비트 수
    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// 모든 비트가 설정되었는지
    pub fn is_full(&self) -> bool {
        self.count_set() == self.num_bits
    }

    /// `from` 부터 순환하며 처음 설정된 비트. 한 바퀴 돌아도 없으면 None
    pub fn find_next_set(&self, from: usize) -> Option<usize> {
        self.find_next(from, true)
    }

    /// `from` 부터 순환하며 처음 해제된 비트. 한 바퀴 돌아도 없으면 None
    pub fn find_next_clear(&self, from: usize) -> Option<usize> {
        self.find_next(from, false)
    }

    fn find_next(&self, from: usize, set: bool) -> Option<usize> {
        if self.num_bits == 0 {
            return None;
        }
        let from = from % self.num_bits;
        self.first_in(from, self.num_bits, set)
            .or_else(|| self.first_in(0, from, set))
    }

    /// `[start, end)` 구간에서 처음 설정된 비트 (순환 없음)
    pub fn first_set_in(&self, start: usize, end: usize) -> Option<usize> {
        self.first_in(start, end.min(self.num_bits), true)
    }

    /// `[start, end)` 구간에서 처음 해제된 비트 (순환 없음)
    pub fn first_clear_in(&self, start: usize, end: usize) -> Option<usize> {
        self.first_in(start, end.min(self.num_bits), false)
    }

    fn first_in(&self, start: usize, end: usize, set: bool) -> Option<usize> {
        let mut i = start;
        while i < end {
            let word_idx = i / BITS_PER_WORD;
            let mut word = self.words[word_idx];
            if !set {
                word = !word;
            }
            word &= u64::MAX << (i % BITS_PER_WORD);
            if word != 0 {
                let idx = word_idx * BITS_PER_WORD + word.trailing_zeros() as usize;
                // 같은 워드 안에서 end 를 넘은 경우: 구간 안에는 없음
                return (idx < end).then_some(idx);
            }
            i = (word_idx + 1) * BITS_PER_WORD;
        }
        None
    }

    /// 사이드카 파일용 바이트 덤프
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.words.len() * WORD_BYTES);
        for word in &self.words {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        buf
    }

    /// 사이드카 파일 바이트에서 복원. 크기가 맞지 않으면 None
    pub fn from_bytes(num_bits: usize, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::byte_len(num_bits) {
            return None;
        }
        let mut words: Vec<u64> = bytes
            .chunks_exact(WORD_BYTES)
            .map(|c| {
                let mut word = [0u8; WORD_BYTES];
                word.copy_from_slice(c);
                u64::from_le_bytes(word)
            })
            .collect();

        // num_bits 이후의 비트는 사용하지 않으므로 지운다
        let tail = num_bits % BITS_PER_WORD;
        if tail != 0 {
            if let Some(last) = words.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }

        Some(Self { words, num_bits })
    }
}

impl std::fmt::Debug for PresenceBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceBitmap")
            .field("num_bits", &self.num_bits)
            .field("set", &self.count_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        for num_bits in [1usize, 7, 63, 64, 65, 130] {
            let mut bm = PresenceBitmap::new(num_bits);
            for i in 0..num_bits {
                assert!(!bm.is_set(i));
                assert!(bm.set(i));
                assert!(bm.is_set(i));
                assert!(!bm.set(i)); // 중복
                assert!(bm.clear(i));
                assert!(!bm.is_set(i));
            }
        }
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut bm = PresenceBitmap::new(10);
        assert!(!bm.set(10));
        assert!(!bm.is_set(10));
        assert_eq!(bm.count_set(), 0);
    }

    #[test]
    fn test_find_next_wraps() {
        let mut bm = PresenceBitmap::new(100);
        bm.set(3);
        bm.set(70);
        assert_eq!(bm.find_next_set(0), Some(3));
        assert_eq!(bm.find_next_set(4), Some(70));
        assert_eq!(bm.find_next_set(71), Some(3));
        assert_eq!(bm.find_next_set(170), Some(70)); // from 은 num_bits 로 나눈 나머지

        bm.clear(3);
        bm.clear(70);
        assert_eq!(bm.find_next_set(50), None);
    }

    #[test]
    fn test_find_next_clear_full_cycle() {
        let mut bm = PresenceBitmap::new(65);
        for i in 0..65 {
            bm.set(i);
        }
        assert!(bm.is_full());
        assert_eq!(bm.find_next_clear(10), None);

        bm.clear(64);
        assert_eq!(bm.find_next_clear(0), Some(64));
        assert_eq!(bm.find_next_clear(64), Some(64));
    }

    #[test]
    fn test_find_visits_every_index_once_per_cycle() {
        let n = 77;
        let mut bm = PresenceBitmap::new(n);
        for i in 0..n {
            bm.set(i);
        }
        for start in [0usize, 13, 63, 64, 76] {
            let mut seen = vec![false; n];
            let mut cursor = start;
            let mut copy = bm.clone();
            while let Some(i) = copy.find_next_set(cursor) {
                assert!(!seen[i]);
                seen[i] = true;
                copy.clear(i);
                cursor = i + 1;
            }
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn test_empty_bitmap() {
        let bm = PresenceBitmap::new(0);
        assert!(bm.is_full());
        assert_eq!(bm.find_next_set(0), None);
        assert_eq!(bm.find_next_clear(0), None);
        assert_eq!(PresenceBitmap::byte_len(0), 0);
    }

    #[test]
    fn test_sidecar_bytes() {
        let mut bm = PresenceBitmap::new(70);
        bm.set(0);
        bm.set(65);
        let bytes = bm.to_bytes();
        assert_eq!(bytes.len(), PresenceBitmap::byte_len(70));
        assert_eq!(bytes.len(), 16);

        let restored = PresenceBitmap::from_bytes(70, &bytes).unwrap();
        assert_eq!(restored, bm);
        assert!(PresenceBitmap::from_bytes(70, &bytes[..8]).is_none());
    }

    #[test]
    fn test_sidecar_ignores_unused_tail_bits() {
        let bytes = [0xFFu8; 8];
        let bm = PresenceBitmap::from_bytes(4, &bytes).unwrap();
        assert_eq!(bm.count_set(), 4);
        assert!(bm.is_full());
    }
}
