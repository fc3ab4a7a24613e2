//! speedcheck 서버
//!
//! - Offer를 주기적으로 브로드캐스트
//! - TCP/UDP 요청마다 핸들러 태스크로 filler 전송
//!
//! 사용법:
//!   cargo run --release --bin speedcheck-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 포트
//!   cargo run --release --bin speedcheck-server
//!
//!   # 10% 무작위 손실 시뮬레이션
//!   cargo run --release --bin speedcheck-server -- --loss 0.1

use std::net::Ipv4Addr;
use std::str::FromStr;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use speedcheck::{Beacon, Config, LossModel, OfferMessage, TcpResponder, UdpResponder};

const HELP: &str = r#"speedcheck Server - TCP/UDP 처리량 측정 서버

Offer를 브로드캐스트하고, 요청받은 크기만큼 TCP 스트림과 UDP 세그먼트로 전송

사용법:
  cargo run --release --bin speedcheck-server -- [OPTIONS]

옵션:
  --tcp-port <PORT>        TCP 응답 포트 (기본: 65432, 0 = 자동 할당)
  --udp-port <PORT>        UDP 응답 포트 (기본: 13118, 0 = 자동 할당)
  --discovery-port <PORT>  Offer 브로드캐스트 포트 (기본: 13117)
  --broadcast <ADDR>       Offer 목적지 주소 (기본: 255.255.255.255)
  --interval-ms <MS>       Offer 주기 (기본: 1000)
  --loss <RATIO>           UDP 세그먼트 무작위 손실 비율 0.0~1.0
  --drop-every <N>         N번째 UDP 세그먼트마다 버림
  --local                  단일 호스트 모드 (127.0.0.1로 Offer, 자동 포트)
  -v, --verbose            debug 로그 출력
  -h, --help               이 도움말 출력

예시:
  # 같은 호스트에서 클라이언트와 함께 실행
  cargo run --release --bin speedcheck-server -- --local

  # 세그먼트 2개 중 1개 손실
  cargo run --release --bin speedcheck-server -- --drop-every 2
"#;

/// 서버 실행 옵션
struct ServerArgs {
    config: Config,
    verbose: bool,
}

fn value<T: FromStr>(args: &[String], i: usize, flag: &str) -> Result<T, String> {
    args.get(i + 1)
        .ok_or_else(|| format!("{} 값 필요", flag))?
        .parse()
        .map_err(|_| format!("{} 값이 유효하지 않음: {}", flag, args[i + 1]))
}

fn parse_args() -> Result<ServerArgs, String> {
    let args: Vec<String> = std::env::args().collect();

    // --local은 다른 옵션보다 먼저 적용
    let mut config = if args.iter().any(|a| a == "--local") {
        Config::local()
    } else {
        Config::default()
    };
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--tcp-port" => {
                config.tcp_port = value(&args, i, "--tcp-port")?;
                i += 1;
            }
            "--udp-port" => {
                config.udp_port = value(&args, i, "--udp-port")?;
                i += 1;
            }
            "--discovery-port" => {
                config.discovery_port = value(&args, i, "--discovery-port")?;
                i += 1;
            }
            "--broadcast" => {
                config.broadcast_addr = value::<Ipv4Addr>(&args, i, "--broadcast")?;
                i += 1;
            }
            "--interval-ms" => {
                config.offer_interval_ms = value(&args, i, "--interval-ms")?;
                i += 1;
            }
            "--loss" => {
                config.loss = LossModel::random(value(&args, i, "--loss")?);
                i += 1;
            }
            "--drop-every" => {
                config.loss = LossModel::DropEvery(value(&args, i, "--drop-every")?);
                i += 1;
            }
            "--local" => {}
            "--verbose" | "-v" => verbose = true,
            "--help" | "-h" => {
                println!("{}", HELP);
                std::process::exit(0);
            }
            other => eprintln!("알 수 없는 옵션 무시: {}", other),
        }
        i += 1;
    }

    Ok(ServerArgs { config, verbose })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args()?;

    // 로깅 설정
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.config;
    info!("speedcheck Server starting...");
    info!("Discovery port: {}", config.discovery_port);
    info!("Loss model: {:?}", config.loss);

    // 서비스별 바인드 실패는 해당 서비스만 중단
    let tcp = match TcpResponder::bind(&config).await {
        Ok(responder) => Some(responder),
        Err(e) => {
            error!("TCP responder failed to start: {}", e);
            None
        }
    };
    let udp = match UdpResponder::bind(&config) {
        Ok(responder) => Some(responder),
        Err(e) => {
            error!("UDP responder failed to start: {}", e);
            None
        }
    };

    if tcp.is_none() && udp.is_none() {
        return Err("no transfer service could be started".into());
    }

    // Offer에는 실제 바인드된 포트를 싣는다
    let tcp_port = match &tcp {
        Some(responder) => responder.local_addr()?.port(),
        None => config.tcp_port,
    };
    let udp_port = match &udp {
        Some(responder) => responder.local_addr()?.port(),
        None => config.udp_port,
    };

    if let Some(responder) = tcp {
        tokio::spawn(async move {
            if let Err(e) = responder.run().await {
                error!("TCP responder stopped: {}", e);
            }
        });
    }
    if let Some(responder) = udp {
        tokio::spawn(async move {
            if let Err(e) = responder.run().await {
                error!("UDP responder stopped: {}", e);
            }
        });
    }

    let beacon = Beacon::bind(&config, OfferMessage::new(udp_port, tcp_port))?;

    tokio::select! {
        result = beacon.run() => {
            // 브로드캐스트 없이는 탐색 불가
            if let Err(e) = result {
                error!("Offer broadcast failed: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Server shutting down");
        }
    }

    Ok(())
}
