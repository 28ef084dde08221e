//! fbpd - FBP 송신자
//!
//! 파일 하나를 announce 하고, 수신자들이 요청한 패킷을 브로드캐스트한다.
//!
//! 사용법:
//!   fbpd [-b <broadcast addr>] [-p <pps>] [-c <cache size>] [-P <port>] <fid> <file>
//!
//! 예시:
//!   # 로컬 네트워크에 file_id 1 로 배포
//!   fbpd -b 192.168.0.255 -p 20000 1 image.iso
//!
//! 로그 레벨은 RUST_LOG 로 조절 (기본 info).

use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fbp::config::MAX_LIMIT;
use fbp::{Config, FileId, Sender, SenderTransfer};

/// 서버 설정
struct ServerArgs {
    file_id: FileId,
    file_path: PathBuf,
    config: Config,
}

fn usage() -> ! {
    eprintln!(
        r#"fbpd - File Broadcast Protocol sender

Usage:
  fbpd [OPTIONS] <fid> <file>

Arguments:
  <fid>                 file id (1-255)
  <file>                file to distribute

Options:
  -b <ADDR>             broadcast address (default: 127.0.0.1)
  -p <PPS>              rate limit in packets per second (default: 10000)
  -c <N>                packet cache size (default: 1)
  -P <PORT>             UDP port (default: 1026)
  -h                    print this help
"#
    );
    process::exit(1);
}

fn parse_number<T: std::str::FromStr>(value: Option<&String>, what: &str) -> T {
    match value.and_then(|v| v.parse().ok()) {
        Some(n) => n,
        None => {
            eprintln!("invalid {}", what);
            usage();
        }
    }
}

fn parse_args() -> ServerArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-b" => {
                config.broadcast_addr = parse_number::<IpAddr>(args.get(i + 1), "broadcast address");
                i += 1;
            }
            "-p" => {
                config.rate_limit_pps = parse_number(args.get(i + 1), "rate limit");
                i += 1;
            }
            "-c" => {
                config.cache_size = parse_number(args.get(i + 1), "cache size");
                i += 1;
            }
            "-P" => {
                config.port = parse_number(args.get(i + 1), "port");
                i += 1;
            }
            "-h" | "--help" => usage(),
            flag if flag.starts_with('-') => {
                eprintln!("unknown option: {}", flag);
                usage();
            }
            value => positional.push(value.to_string()),
        }
        i += 1;
    }

    if positional.len() != 2 {
        usage();
    }
    if config.rate_limit_pps < 1 || config.rate_limit_pps >= MAX_LIMIT {
        eprintln!("rate limit must be between 1 and {}", MAX_LIMIT);
        usage();
    }
    if config.cache_size < 1 || config.cache_size >= MAX_LIMIT as usize {
        eprintln!("cache size must be between 1 and {}", MAX_LIMIT);
        usage();
    }

    let file_id: FileId = parse_number(positional.first(), "file id");
    if file_id == 0 {
        eprintln!("file id must be between 1 and 255");
        usage();
    }

    ServerArgs {
        file_id,
        file_path: PathBuf::from(&positional[1]),
        config,
    }
}

async fn run(args: ServerArgs) -> fbp::Result<()> {
    info!("FBP Sender starting...");
    info!("File: {:?} (file_id={})", args.file_path, args.file_id);
    info!("Broadcast: {}:{}", args.config.broadcast_addr, args.config.port);
    info!(
        "Rate limit: {} pps, cache: {} packets",
        args.config.rate_limit_pps, args.config.cache_size
    );

    let transfer = SenderTransfer::open(&args.file_path, args.file_id, args.config.cache_size)?;
    let mut sender = Sender::bind(args.config, transfer).await?;

    // Ctrl-C → 정지
    let handle = sender.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping...");
            handle.stop();
        }
    });

    // 주기적 통계 출력
    let handle = sender.handle();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        ticker.tick().await;
        while handle.is_running() {
            ticker.tick().await;
            info!("{}", handle.stats().summary());
        }
    });

    sender.run().await
}

#[tokio::main]
async fn main() {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {}", e);
    }

    let args = parse_args();

    if let Err(e) = run(args).await {
        error!("fatal: {}", e);
        process::exit(2);
    }
}
