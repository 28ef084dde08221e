//! 프로토콜 설정

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result, DEFAULT_PORT};

/// 송신 속도/캐시 크기의 허용 상한 (exclusive)
pub const MAX_LIMIT: u32 = 1_000_000;

/// FBP 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 수신자가 바인드하고 송신자가 보내는 UDP 포트
    pub port: u16,

    /// 송신자가 announce/데이터를 보낼 주소 (브로드캐스트 주소)
    pub broadcast_addr: IpAddr,

    /// 초당 최대 데이터 패킷 수
    pub rate_limit_pps: u32,

    /// 송신측 패킷 캐시 크기 (패킷 수)
    pub cache_size: usize,

    /// 여유 시간에 다음 패킷 미리 읽기
    pub prefetch: bool,

    /// 송신 버퍼 포화 시 패킷 간격 증가폭 (마이크로초)
    pub backoff_step_us: u64,

    /// 송신 버퍼 포화 후 재시도 전 대기 (마이크로초)
    pub retry_sleep_us: u64,

    /// 연속 포화 재시도 한도. 넘으면 치명적 에러
    pub max_send_retries: u32,

    /// 기본 announce 간격 (밀리초)
    pub announce_interval_ms: u64,

    /// announce 간격 상한 (밀리초)
    pub max_announce_interval_ms: u64,

    /// announce 가 이 시간 동안 없으면 수신측에서 파일을 잊는다 (밀리초)
    pub liveness_timeout_ms: u64,

    /// 수신측 만료 검사 주기 (밀리초)
    pub sweep_interval_ms: u64,

    /// 수신 파일 저장 디렉터리
    pub download_dir: PathBuf,

    /// I/O 태스크 → 엔진 태스크 채널 크기
    pub channel_capacity: usize,

    /// 수신 버퍼 크기
    pub recv_buffer_size: usize,

    /// 송신 버퍼 크기
    pub send_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            broadcast_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            rate_limit_pps: 10_000,
            cache_size: 1,
            prefetch: true,
            backoff_step_us: 500,
            retry_sleep_us: 1_000,
            max_send_retries: 64,
            announce_interval_ms: 1_000,
            max_announce_interval_ms: 4_000,
            liveness_timeout_ms: 10_000,
            sweep_interval_ms: 1_000,
            download_dir: PathBuf::from("data"),
            channel_capacity: 1024,
            recv_buffer_size: 2 * 1024 * 1024, // 2MB
            send_buffer_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 고속 LAN 용 설정
    pub fn high_throughput() -> Self {
        Self {
            rate_limit_pps: 100_000,
            cache_size: 64,
            backoff_step_us: 100,
            retry_sleep_us: 200,
            channel_capacity: 8192,
            recv_buffer_size: 8 * 1024 * 1024, // 8MB
            send_buffer_size: 8 * 1024 * 1024,
            ..Self::default()
        }
    }

    /// 혼잡한 네트워크용 설정
    pub fn congested_network() -> Self {
        Self {
            rate_limit_pps: 2_000,
            cache_size: 16,
            backoff_step_us: 1_000,
            retry_sleep_us: 5_000,
            max_send_retries: 256,
            max_announce_interval_ms: 8_000,
            liveness_timeout_ms: 20_000,
            ..Self::default()
        }
    }

    pub fn backoff_step(&self) -> Duration {
        Duration::from_micros(self.backoff_step_us)
    }

    pub fn retry_sleep(&self) -> Duration {
        Duration::from_micros(self.retry_sleep_us)
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }

    pub fn max_announce_interval(&self) -> Duration {
        Duration::from_millis(self.max_announce_interval_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit_pps < 1 || self.rate_limit_pps >= MAX_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "rate limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        if self.cache_size < 1 || self.cache_size >= MAX_LIMIT as usize {
            return Err(Error::InvalidConfig(format!(
                "cachesize must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        if self.announce_interval_ms == 0
            || self.max_announce_interval_ms < self.announce_interval_ms
        {
            return Err(Error::InvalidConfig(
                "announce interval must be positive and not above its maximum".into(),
            ));
        }
        // 수신자가 파일을 잊기 전에 적어도 한 번은 announce 가 가야 한다
        if self.max_announce_interval_ms >= self.liveness_timeout_ms {
            return Err(Error::InvalidConfig(
                "max announce interval must be below the liveness timeout".into(),
            ));
        }
        if self.sweep_interval_ms == 0 || self.channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "sweep interval and channel capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::high_throughput().validate().is_ok());
        assert!(Config::congested_network().validate().is_ok());
    }

    #[test]
    fn test_limits() {
        let mut c = Config::default();
        c.rate_limit_pps = 0;
        assert!(c.validate().is_err());
        c.rate_limit_pps = MAX_LIMIT;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.cache_size = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.max_announce_interval_ms = c.liveness_timeout_ms;
        assert!(c.validate().is_err());
    }
}
