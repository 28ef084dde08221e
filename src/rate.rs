//! 송신 속도 제어
//!
//! - 초 단위 윈도우마다 `limit_pps` 만큼의 송신 예산
//! - 패킷 사이 최소 간격 (`1s / limit_pps + backoff`) 으로 고르게 분산
//! - 송신 버퍼 포화 시 간격을 가산적으로 늘리고 잠시 후 재시도
//! - announce 주기는 현재 백오프에서 유도 (간격이 길수록 announce 도 드물게)

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::{Config, Error, Result};

/// 예산 윈도우 길이
const WINDOW: Duration = Duration::from_secs(1);

/// 패킷 간격 상한
pub const MAX_PACKET_INTERVAL: Duration = Duration::from_secs(1);

/// 송신 속도 제어기
#[derive(Debug)]
pub struct RateController {
    limit_pps: u32,
    budget: u32,
    window_start: Instant,
    base_interval: Duration,
    backoff: Duration,
    backoff_step: Duration,
    next_send: Option<Instant>,
    congested_in_window: bool,

    base_announce: Duration,
    max_announce: Duration,
    next_announce: Instant,

    retry_sleep: Duration,
    max_retries: u32,
    consecutive_failures: u32,
}

impl RateController {
    /// 첫 announce 는 즉시 나가도록 시작
    pub fn new(config: &Config, now: Instant) -> Self {
        let limit_pps = config.rate_limit_pps.max(1);
        Self {
            limit_pps,
            budget: limit_pps,
            window_start: now,
            base_interval: Duration::from_nanos(1_000_000_000 / limit_pps as u64),
            backoff: Duration::ZERO,
            backoff_step: config.backoff_step(),
            next_send: None,
            congested_in_window: false,
            base_announce: config.announce_interval(),
            max_announce: config.max_announce_interval(),
            next_announce: now,
            retry_sleep: config.retry_sleep(),
            max_retries: config.max_send_retries,
            consecutive_failures: 0,
        }
    }

    /// 윈도우가 지났으면 예산을 채운다. 새 윈도우가 시작되면 true
    ///
    /// 포화 없이 지나간 윈도우마다 백오프를 한 단계 줄인다.
    pub fn refresh(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) < WINDOW {
            return false;
        }
        self.window_start = now;
        self.budget = self.limit_pps;
        if !self.congested_in_window && !self.backoff.is_zero() {
            self.backoff = self.backoff.saturating_sub(self.backoff_step);
            debug!("백오프 감소: {:?}", self.backoff);
        }
        self.congested_in_window = false;
        true
    }

    /// 현재 패킷 간 최소 간격
    pub fn packet_interval(&self) -> Duration {
        (self.base_interval + self.backoff).min(MAX_PACKET_INTERVAL)
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// 이번 윈도우의 남은 예산
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// 지금 데이터 패킷을 보내도 되는지
    pub fn can_send(&self, now: Instant) -> bool {
        self.budget > 0 && self.next_send.map_or(true, |t| now >= t)
    }

    /// 데이터 패킷 송신 성공 기록
    pub fn on_sent(&mut self, now: Instant) {
        self.budget = self.budget.saturating_sub(1);
        self.next_send = Some(now + self.packet_interval());
        self.on_send_ok();
    }

    /// 데이터그램 하나가 소켓에 들어감 (announce 포함). 연속 포화 횟수를 되돌린다
    pub fn on_send_ok(&mut self) {
        self.consecutive_failures = 0;
    }

    /// 지금까지 연속된 포화 횟수
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// 송신 버퍼 포화 기록. 재시도 전 대기 시간을 돌려준다
    ///
    /// 연속 포화가 `max_send_retries` 를 넘으면 에러.
    pub fn on_congestion(&mut self) -> Result<Duration> {
        self.consecutive_failures += 1;
        if self.consecutive_failures > self.max_retries {
            return Err(Error::SendBufferExhausted {
                retries: self.max_retries,
            });
        }
        let ceiling = MAX_PACKET_INTERVAL.saturating_sub(self.base_interval);
        self.backoff = (self.backoff + self.backoff_step).min(ceiling);
        self.congested_in_window = true;
        warn!(
            "송신 버퍼 포화 ({}회): 패킷 간격 {:?}, announce 간격 {:?}",
            self.consecutive_failures,
            self.packet_interval(),
            self.announce_interval(false)
        );
        Ok(self.retry_sleep)
    }

    /// announce 주기: `base × (1 + 백오프 단계)`, 전송 중이면 2배, 상한 `max_announce_interval`
    pub fn announce_interval(&self, transferring: bool) -> Duration {
        let steps = if self.backoff_step.is_zero() {
            0
        } else {
            (self.backoff.as_nanos() / self.backoff_step.as_nanos()).min(u32::MAX as u128) as u32
        };
        let mut interval = self.base_announce.saturating_mul(steps.saturating_add(1));
        if transferring {
            interval = interval.saturating_mul(2);
        }
        interval.min(self.max_announce)
    }

    pub fn announce_due(&self, now: Instant) -> bool {
        now >= self.next_announce
    }

    pub fn on_announced(&mut self, now: Instant, transferring: bool) {
        self.next_announce = now + self.announce_interval(transferring);
    }

    /// 다음 대기 시간: 윈도우 경계, 다음 announce, (대기 요청이 있으면) 다음 송신 허용 시각 중 가장 이른 것
    pub fn wait_timeout(&self, now: Instant, pending: bool) -> Duration {
        let mut timeout = (self.window_start + WINDOW).saturating_duration_since(now);
        timeout = timeout.min(self.next_announce.saturating_duration_since(now));
        if pending && self.budget > 0 {
            let until_send = self
                .next_send
                .map_or(Duration::ZERO, |t| t.saturating_duration_since(now));
            timeout = timeout.min(until_send);
        }
        timeout
    }
}
