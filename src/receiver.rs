//! 수신자 (클라이언트측)
//!
//! - I/O 태스크: 데이터그램 수신, 디코딩, 엔진 채널로 전달
//! - 타이머 태스크: 주기적으로 만료 검사 명령
//! - 엔진 태스크: `DownloadTable` 단독 소유, 요청 패킷 송신

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::download::{DownloadTable, FileProgress, ReceiverEvent};
use crate::message::{Packet, Role, MAX_DATAGRAM_LEN};
use crate::stats::TransferStats;
use crate::{Config, Error, ErrorKind, Result};

/// 수신 이벤트 채널 수신기 타입
pub type EventReceiver = mpsc::Receiver<ReceiverEvent>;

/// I/O 태스크의 recv 대기 시간 (running 플래그 확인 주기)
const RECV_POLL: Duration = Duration::from_millis(100);

/// 내부 명령
enum ReceiverCmd {
    Packet(Packet, SocketAddr),
    Sweep,
    Stop,
}

/// 수신자 내부 상태 (엔진 태스크에서만 접근)
struct ReceiverInner {
    config: Config,
    table: DownloadTable,
    socket: Arc<UdpSocket>,
    event_tx: mpsc::Sender<ReceiverEvent>,
}

impl ReceiverInner {
    async fn handle_packet(&mut self, packet: Packet, from: SocketAddr) -> Result<()> {
        match packet {
            Packet::Announcement(announcement) => {
                let requests = match self.table.on_announcement(&announcement, Instant::now()) {
                    Ok(requests) => requests,
                    Err(e) if e.is_droppable() => {
                        self.table.stats_mut().dropped_packets += 1;
                        debug!("announcement 버림 (from {}): {}", from, e);
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };

                for request in requests {
                    if let Err(e) = self.socket.send_to(&request.to_bytes(), from).await {
                        warn!("요청 전송 실패 ({}): {}", from, e);
                        break;
                    }
                    self.table.stats_mut().requests_sent += 1;
                    debug!(
                        "요청 전송: file_id={}, ranges={} → {}",
                        request.file_id,
                        request.ranges.len(),
                        from
                    );
                }
            }
            Packet::Data(data) => self.table.on_data(&data)?,
            Packet::Request(_) => {}
        }
        Ok(())
    }

    fn sweep(&mut self) {
        let removed = self
            .table
            .sweep(Instant::now(), self.config.liveness_timeout());
        if removed > 0 {
            debug!("만료된 파일 {}개 제거", removed);
        }
    }

    /// 쌓인 이벤트 전달. 진행률 이벤트는 채널이 가득 차면 버린다
    async fn flush_events(&mut self) {
        for event in self.table.take_events() {
            if matches!(event, ReceiverEvent::Progress { .. }) {
                let _ = self.event_tx.try_send(event);
            } else {
                let _ = self.event_tx.send(event).await;
            }
        }
    }
}

/// 수신 소켓 생성: 같은 포트를 여러 수신자가 쓸 수 있도록 주소 재사용
fn create_listen_socket(config: &Config) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_recv_buffer_size(config.recv_buffer_size)?;
    socket.set_send_buffer_size(config.send_buffer_size)?;
    socket.set_nonblocking(true)?;
    let addr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), config.port);
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// 수신자 핸들 (외부에서 제어용)
pub struct Receiver {
    cmd_tx: mpsc::Sender<ReceiverCmd>,
    stats: Arc<RwLock<TransferStats>>,
    progress: Arc<RwLock<Vec<FileProgress>>>,
    running: Arc<AtomicBool>,
    local_addr: SocketAddr,
    engine: JoinHandle<Result<()>>,
}

impl Receiver {
    /// 새 수신자 생성 및 시작
    pub async fn start(config: Config) -> Result<(Self, EventReceiver)> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::from_std(create_listen_socket(&config)?)?);
        let local_addr = socket.local_addr()?;
        let table = DownloadTable::new(&config.download_dir)?;

        // 채널 생성
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ReceiverCmd>(config.channel_capacity);
        let (event_tx, event_rx) = mpsc::channel::<ReceiverEvent>(config.channel_capacity);

        // 공유 상태
        let stats = Arc::new(RwLock::new(TransferStats::new()));
        let progress = Arc::new(RwLock::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));
        let decode_drops = Arc::new(AtomicU64::new(0));

        info!(
            "FBP Receiver listening on {}, saving to {}",
            local_addr,
            config.download_dir.display()
        );

        // 수신 태스크
        let socket_recv = socket.clone();
        let cmd_tx_recv = cmd_tx.clone();
        let running_recv = running.clone();
        let drops_recv = decode_drops.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_LEN];

            while running_recv.load(Ordering::SeqCst) {
                match tokio::time::timeout(RECV_POLL, socket_recv.recv_from(&mut buf)).await {
                    Ok(Ok((len, addr))) => match Packet::decode(&buf[..len], Role::Receiver) {
                        Ok(packet) => {
                            if cmd_tx_recv
                                .send(ReceiverCmd::Packet(packet, addr))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            drops_recv.fetch_add(1, Ordering::Relaxed);
                            if e.kind() == ErrorKind::VersionMismatch {
                                warn!("지원하지 않는 announce 버전 (from {}): {}", addr, e);
                            } else {
                                debug!("잘못된 패킷 버림 (from {}): {}", addr, e);
                            }
                        }
                    },
                    Ok(Err(e)) => {
                        warn!("수신 에러: {}", e);
                    }
                    Err(_) => {
                        // 타임아웃, 계속
                    }
                }
            }
        });

        // 만료 검사 타이머 태스크
        let cmd_tx_sweep = cmd_tx.clone();
        let running_sweep = running.clone();
        let sweep_interval = config.sweep_interval();

        tokio::spawn(async move {
            while running_sweep.load(Ordering::SeqCst) {
                tokio::time::sleep(sweep_interval).await;
                if cmd_tx_sweep.send(ReceiverCmd::Sweep).await.is_err() {
                    break;
                }
            }
        });

        // 메인 처리 태스크
        let mut inner = ReceiverInner {
            config,
            table,
            socket,
            event_tx,
        };
        let stats_main = stats.clone();
        let progress_main = progress.clone();
        let running_main = running.clone();

        let engine = tokio::spawn(async move {
            let result = async {
                while let Some(cmd) = cmd_rx.recv().await {
                    match cmd {
                        ReceiverCmd::Packet(packet, from) => {
                            inner.handle_packet(packet, from).await?;
                        }
                        ReceiverCmd::Sweep => inner.sweep(),
                        ReceiverCmd::Stop => break,
                    }

                    // 통계 업데이트 (이벤트보다 먼저)
                    let mut snapshot = inner.table.stats().clone();
                    snapshot.dropped_packets += decode_drops.load(Ordering::Relaxed);
                    *stats_main.write() = snapshot;
                    *progress_main.write() = inner.table.progress();

                    inner.flush_events().await;
                }
                Ok::<(), Error>(())
            }
            .await;

            running_main.store(false, Ordering::SeqCst);
            match &result {
                Ok(()) => info!("Receiver stopped: {}", inner.table.stats().summary()),
                Err(e) => error!("수신 엔진 중단: {}", e),
            }
            result
        });

        let receiver = Self {
            cmd_tx,
            stats,
            progress,
            running,
            local_addr,
            engine,
        };

        Ok((receiver, event_rx))
    }

    /// 정지
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.cmd_tx.send(ReceiverCmd::Stop).await;
    }

    /// 엔진 태스크 종료를 기다린다. 치명적 에러로 멈췄으면 그 에러
    pub async fn join(self) -> Result<()> {
        self.engine.await.map_err(|_| Error::ChannelError)?
    }

    /// 통계 반환
    pub fn get_stats(&self) -> TransferStats {
        self.stats.read().clone()
    }

    /// 파일별 진행 상황
    pub fn progress(&self) -> Vec<FileProgress> {
        self.progress.read().clone()
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
