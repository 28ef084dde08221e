//! fbpc - FBP 수신자
//!
//! announce 된 파일을 모두 받아 저장 디렉터리에 쓴다. Ctrl-C 로 정지하며,
//! 받던 파일은 다음 실행에서 이어받는다.
//!
//! 사용법:
//!   fbpc [-d <dir>] [-P <port>]
//!
//! 로그 레벨은 RUST_LOG 로 조절 (기본 info).

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fbp::{Config, Receiver, ReceiverEvent};

fn usage() -> ! {
    eprintln!(
        r#"fbpc - File Broadcast Protocol receiver

Usage:
  fbpc [OPTIONS]

Options:
  -d <DIR>              download directory (default: data)
  -P <PORT>             UDP port (default: 1026)
  -h                    print this help
"#
    );
    process::exit(1);
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" => match args.get(i + 1) {
                Some(dir) => {
                    config.download_dir = PathBuf::from(dir);
                    i += 1;
                }
                None => usage(),
            },
            "-P" => match args.get(i + 1).and_then(|p| p.parse().ok()) {
                Some(port) => {
                    config.port = port;
                    i += 1;
                }
                None => usage(),
            },
            "-h" | "--help" => usage(),
            other => {
                eprintln!("unknown argument: {}", other);
                usage();
            }
        }
        i += 1;
    }

    config
}

fn log_event(event: &ReceiverEvent) {
    match event {
        ReceiverEvent::FileAdded {
            file_id,
            filename,
            num_packets,
        } => info!("New file [{}] {} ({} packets)", file_id, filename, num_packets),
        ReceiverEvent::FileRemoved { file_id, filename } => {
            info!("File gone [{}] {}", file_id, filename)
        }
        ReceiverEvent::Progress { .. } => {}
        ReceiverEvent::DownloadFinished {
            file_id,
            filename,
            path,
        } => info!("Finished [{}] {} -> {}", file_id, filename, path.display()),
        ReceiverEvent::ChecksumMismatch { file_id, filename } => {
            warn!("Checksum mismatch [{}] {}, restarting", file_id, filename)
        }
    }
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

    let config = parse_args();

    info!("FBP Receiver starting...");
    info!("Port: {}", config.port);
    info!("Download directory: {}", config.download_dir.display());

    let (receiver, mut events) = match Receiver::start(config).await {
        Ok(started) => started,
        Err(e) => {
            error!("fatal: {}", e);
            process::exit(2);
        }
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping...");
                receiver.stop().await;
                break;
            }
            Some(event) = events.recv() => log_event(&event),
            _ = ticker.tick() => {
                if !receiver.is_running() {
                    break;
                }
                for file in receiver.progress().iter().filter(|f| !f.finished) {
                    info!(
                        "[{}] {}: {}/{} packets ({:.1}%)",
                        file.file_id,
                        file.filename,
                        file.received,
                        file.num_packets,
                        file.percent()
                    );
                }
            }
        }
    }

    let stats = receiver.get_stats();
    if let Err(e) = receiver.join().await {
        error!("fatal: {}", e);
        process::exit(2);
    }
    info!("{}", stats.summary());
}
