//! 전송 통계

use std::time::{Duration, Instant};

/// 전송 통계 (송신/수신 공용)
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 보낸 announce 수
    pub announcements_sent: u64,

    /// 받은 announce 수
    pub announcements_received: u64,

    /// 보낸 요청 패킷 수
    pub requests_sent: u64,

    /// 받은 요청 패킷 수
    pub requests_received: u64,

    /// 범위 검사에 실패해 버린 요청 패킷 수
    pub invalid_requests: u64,

    /// 요청으로 새로 대기열에 들어간 패킷 수
    pub packets_queued: u64,

    /// 보낸 데이터 패킷 수
    pub data_packets_sent: u64,

    /// 받은(기록한) 데이터 패킷 수
    pub data_packets_received: u64,

    /// 이미 가진 패킷을 다시 받은 수
    pub duplicate_packets: u64,

    /// 잘못되었거나 알 수 없는 파일이라 버린 패킷 수
    pub dropped_packets: u64,

    /// 보낸 데이터 바이트
    pub bytes_sent: u64,

    /// 받은 데이터 바이트
    pub bytes_received: u64,

    /// 송신 버퍼 포화 횟수
    pub congestion_events: u64,

    /// 체크섬 불일치로 재시작한 횟수
    pub checksum_restarts: u64,

    /// 완료된 파일 수
    pub completed_files: u64,

    /// 패킷 캐시 적중/미스
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            announcements_sent: 0,
            announcements_received: 0,
            requests_sent: 0,
            requests_received: 0,
            invalid_requests: 0,
            packets_queued: 0,
            data_packets_sent: 0,
            data_packets_received: 0,
            duplicate_packets: 0,
            dropped_packets: 0,
            bytes_sent: 0,
            bytes_received: 0,
            congestion_events: 0,
            checksum_restarts: 0,
            completed_files: 0,
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 송신 처리율 (bytes/sec)
    pub fn send_throughput(&self) -> f64 {
        Self::rate(self.bytes_sent, self.elapsed())
    }

    /// 수신 처리율 (bytes/sec)
    pub fn receive_throughput(&self) -> f64 {
        Self::rate(self.bytes_received, self.elapsed())
    }

    fn rate(bytes: u64, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        bytes as f64 / secs
    }

    /// 캐시 적중률
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }

    /// 중복 수신 비율
    pub fn duplicate_ratio(&self) -> f64 {
        let total = self.data_packets_received + self.duplicate_packets;
        if total == 0 {
            return 0.0;
        }
        self.duplicate_packets as f64 / total as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Announce: {}/{} | Requests: {}/{} (invalid {}) | Data: {}/{} (dup {:.1}%) | Out: {:.2} MB/s | In: {:.2} MB/s | Congestion: {} | Restarts: {} | Completed: {}",
            self.elapsed().as_secs_f64(),
            self.announcements_sent,
            self.announcements_received,
            self.requests_sent,
            self.requests_received,
            self.invalid_requests,
            self.data_packets_sent,
            self.data_packets_received,
            self.duplicate_ratio() * 100.0,
            self.send_throughput() / 1_000_000.0,
            self.receive_throughput() / 1_000_000.0,
            self.congestion_events,
            self.checksum_restarts,
            self.completed_files,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
