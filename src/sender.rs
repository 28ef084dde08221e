//! 송신자 (서버측)
//!
//! - 단일 태스크가 소켓 하나를 다중화: 요청 수신 / 쓰기 가능 / 타이머
//! - 한 번에 하나만 처리: 요청 처리, 데이터 패킷 송신, announce 송신
//! - 송신 버퍼 포화 시 `RateController` 백오프 후 재시도

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use crate::message::{Packet, Role, TransferStatus, MAX_DATAGRAM_LEN};
use crate::rate::RateController;
use crate::stats::TransferStats;
use crate::store::{DiskStore, FileStore};
use crate::transfer::SenderTransfer;
use crate::{Config, Error, ErrorKind, Result};

#[cfg(target_os = "linux")]
const ENOBUFS: i32 = 105;
#[cfg(windows)]
const ENOBUFS: i32 = 10055;
#[cfg(not(any(target_os = "linux", windows)))]
const ENOBUFS: i32 = 55;

/// 송신 버퍼가 가득 찬 경우인지 (재시도 대상)
fn is_congestion(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == Some(ENOBUFS)
}

/// 논블로킹 데이터그램 송신
pub(crate) trait DatagramSocket {
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// 다시 쓸 수 있을 때까지 대기
    fn writable(&self) -> impl Future<Output = io::Result<()>> + Send + '_;
}

impl DatagramSocket for UdpSocket {
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::try_send_to(self, buf, target)
    }

    fn writable(&self) -> impl Future<Output = io::Result<()>> + Send + '_ {
        UdpSocket::writable(self)
    }
}

/// 송신. 버퍼 포화면 백오프 후 재시도, 연속 포화가 한도를 넘으면 에러
///
/// 성공한 송신은 종류와 관계없이 연속 포화 횟수를 되돌린다.
async fn send_datagram<T: DatagramSocket>(
    socket: &T,
    dest: SocketAddr,
    bytes: &[u8],
    rate: &mut RateController,
    stats: &RwLock<TransferStats>,
) -> Result<()> {
    loop {
        match socket.try_send_to(bytes, dest) {
            Ok(_) => {
                rate.on_send_ok();
                return Ok(());
            }
            Err(e) if is_congestion(&e) => {
                let wait = rate.on_congestion()?;
                stats.write().congestion_events += 1;
                tokio::time::sleep(wait).await;
                socket.writable().await?;
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

/// 브로드캐스트 송신 소켓 생성
fn create_broadcast_socket(config: &Config, dest: &SocketAddr) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(*dest), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.set_reuse_address(true)?;
    socket.set_send_buffer_size(config.send_buffer_size)?;
    socket.set_recv_buffer_size(config.recv_buffer_size)?;
    socket.set_nonblocking(true)?;

    let any: IpAddr = match dest {
        SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    socket.bind(&SocketAddr::new(any, 0).into())?;
    Ok(socket.into())
}

/// 실행 중인 송신자 제어용 핸들
#[derive(Clone)]
pub struct SenderHandle {
    stats: Arc<RwLock<TransferStats>>,
    running: Arc<AtomicBool>,
}

impl SenderHandle {
    /// 정지 (다음 루프 반복에서 빠져나간다)
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 통계 반환
    pub fn stats(&self) -> TransferStats {
        self.stats.read().clone()
    }
}

/// 송신자
pub struct Sender<S = DiskStore> {
    /// 설정
    config: Config,

    socket: UdpSocket,

    /// announce/데이터 목적지 (브로드캐스트 주소:포트)
    dest: SocketAddr,

    transfer: SenderTransfer<S>,
    rate: RateController,

    /// 전송 통계
    stats: Arc<RwLock<TransferStats>>,

    /// 실행 중 플래그
    running: Arc<AtomicBool>,
}

impl<S: FileStore> Sender<S> {
    /// 소켓을 만들고 송신 준비
    pub async fn bind(config: Config, transfer: SenderTransfer<S>) -> Result<Self> {
        config.validate()?;
        let dest = SocketAddr::new(config.broadcast_addr, config.port);
        let socket = UdpSocket::from_std(create_broadcast_socket(&config, &dest)?)?;

        info!(
            "FBP Sender bound on {}, broadcasting to {}",
            socket.local_addr()?,
            dest
        );

        Ok(Self {
            rate: RateController::new(&config, Instant::now()),
            config,
            socket,
            dest,
            transfer,
            stats: Arc::new(RwLock::new(TransferStats::new())),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn dest(&self) -> SocketAddr {
        self.dest
    }

    pub fn transfer(&self) -> &SenderTransfer<S> {
        &self.transfer
    }

    pub fn handle(&self) -> SenderHandle {
        SenderHandle {
            stats: self.stats.clone(),
            running: self.running.clone(),
        }
    }

    /// 정지
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// 통계 반환
    pub fn stats(&self) -> TransferStats {
        self.stats.read().clone()
    }

    /// 메인 루프. `stop` 되거나 치명적 에러가 날 때까지 돈다
    pub async fn run(&mut self) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        info!(
            "Serving file_id={} ({} packets) at {} pps",
            self.transfer.file_id(),
            self.transfer.num_packets(),
            self.config.rate_limit_pps
        );

        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            self.rate.refresh(now);

            let pending = self.transfer.has_pending();
            let announce_due = self.rate.announce_due(now);
            let data_ready = pending && self.rate.can_send(now);
            let want_write = announce_due || data_ready;
            let timeout = self.rate.wait_timeout(now, pending);

            // 여유 시간에 다음 패킷을 캐시에 올려 둔다
            if !want_write && pending && self.config.prefetch {
                self.transfer.prefetch()?;
            }

            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, addr)) => self.handle_datagram(&buf[..len], addr),
                        Err(e) => warn!("수신 에러: {}", e),
                    }
                }
                ready = self.socket.writable(), if want_write => {
                    ready?;
                    if announce_due {
                        self.send_announcement().await?;
                    } else {
                        self.send_next_packet().await?;
                    }
                }
                _ = tokio::time::sleep(timeout), if !want_write => {}
            }
        }

        info!("Sender stopped: {}", self.stats.read().summary());
        Ok(())
    }

    /// 수신한 데이터그램 처리. 잘못된 것은 버리고 계속
    fn handle_datagram(&mut self, bytes: &[u8], from: SocketAddr) {
        match Packet::decode(bytes, Role::Sender) {
            Ok(Packet::Request(request)) => {
                self.stats.write().requests_received += 1;
                match self.transfer.handle_request(&request) {
                    Ok(queued) => {
                        self.stats.write().packets_queued += queued as u64;
                    }
                    Err(e) => {
                        self.stats.write().invalid_requests += 1;
                        debug!("요청 버림 (from {}): {}", from, e);
                    }
                }
            }
            Ok(other) => {
                trace!("송신측에서 무시하는 패킷 (from {}): file_id={}", from, other.file_id());
            }
            Err(e) => {
                self.stats.write().dropped_packets += 1;
                if e.kind() == ErrorKind::VersionMismatch {
                    warn!("지원하지 않는 announce 버전 (from {}): {}", from, e);
                } else {
                    debug!("잘못된 패킷 버림 (from {}): {}", from, e);
                }
            }
        }
    }

    async fn send_announcement(&mut self) -> Result<()> {
        let announcement = self.transfer.announcement();
        let transferring = announcement.status == TransferStatus::Transferring;
        self.send_with_retry(&announcement.to_bytes()).await?;

        self.rate.on_announced(Instant::now(), transferring);
        self.stats.write().announcements_sent += 1;
        trace!(
            "announce: file_id={}, status={:?}, pending={}",
            announcement.file_id,
            announcement.status,
            self.transfer.pending_count()
        );
        Ok(())
    }

    async fn send_next_packet(&mut self) -> Result<()> {
        let Some(packet) = self.transfer.next_data_packet()? else {
            return Ok(());
        };
        self.send_with_retry(&packet.to_bytes()).await?;

        self.rate.on_sent(Instant::now());
        self.transfer.mark_sent(packet.offset);

        let cache = self.transfer.cache();
        let mut stats = self.stats.write();
        stats.data_packets_sent += 1;
        stats.bytes_sent += packet.size() as u64;
        stats.cache_hits = cache.hits();
        stats.cache_misses = cache.misses();
        Ok(())
    }

    async fn send_with_retry(&mut self, bytes: &[u8]) -> Result<()> {
        send_datagram(&self.socket, self.dest, bytes, &mut self.rate, &self.stats).await
    }
}
