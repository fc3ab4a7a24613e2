//! speedcheck 클라이언트
//!
//! - Offer로 서버 탐색
//! - 요청 크기를 입력받아 TCP/UDP 동시 전송, 결과 출력
//! - 끝나면 다시 탐색
//!
//! 사용법:
//!   cargo run --release --bin speedcheck-client -- [OPTIONS]
//!
//! 예시:
//!   # 대화형 (세션마다 크기 입력)
//!   cargo run --release --bin speedcheck-client
//!
//!   # 10MB 3회, JSON 출력
//!   cargo run --release --bin speedcheck-client -- --size 10485760 --sessions 3 --json

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use speedcheck::{
    parse_file_size, Config, Error, FixedSize, Session, SessionReport, SizeSource, TransferOrder,
};

const HELP: &str = r#"speedcheck Client - TCP/UDP 처리량 측정 클라이언트

서버 Offer를 기다린 뒤 같은 크기를 TCP와 UDP로 동시에 받아 속도와 수신률 측정

사용법:
  cargo run --release --bin speedcheck-client -- [OPTIONS]

옵션:
  --discovery-port <PORT>  Offer 수신 포트 (기본: 13117)
  --size <BYTES>           요청 크기 고정 (생략 시 세션마다 입력)
  --sessions <N>           N회 세션 후 종료 (기본: 무한)
  --udp-idle-ms <MS>       UDP 유휴 타임아웃 (기본: 1000)
  --tcp-idle-ms <MS>       TCP 유휴 타임아웃 (기본: 3000)
  --json                   전송 결과를 JSON 한 줄씩 출력
  --local                  단일 호스트 모드 (짧은 타임아웃)
  -v, --verbose            debug 로그 출력
  -h, --help               이 도움말 출력

예시:
  # 1MB 요청을 계속 반복
  cargo run --release --bin speedcheck-client -- --size 1048576
"#;

/// 클라이언트 실행 옵션
struct ClientArgs {
    config: Config,
    size: Option<u64>,
    sessions: Option<u64>,
    json: bool,
    verbose: bool,
}

fn value<T: FromStr>(args: &[String], i: usize, flag: &str) -> Result<T, String> {
    args.get(i + 1)
        .ok_or_else(|| format!("{} 값 필요", flag))?
        .parse()
        .map_err(|_| format!("{} 값이 유효하지 않음: {}", flag, args[i + 1]))
}

fn parse_args() -> Result<ClientArgs, String> {
    let args: Vec<String> = std::env::args().collect();

    let config = if args.iter().any(|a| a == "--local") {
        Config::local()
    } else {
        Config::default()
    };
    let mut parsed = ClientArgs {
        config,
        size: None,
        sessions: None,
        json: false,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--discovery-port" => {
                parsed.config.discovery_port = value(&args, i, "--discovery-port")?;
                i += 1;
            }
            "--size" => {
                let raw: String = value(&args, i, "--size")?;
                parsed.size = Some(parse_file_size(&raw).map_err(|e| e.to_string())?);
                i += 1;
            }
            "--sessions" => {
                parsed.sessions = Some(value(&args, i, "--sessions")?);
                i += 1;
            }
            "--udp-idle-ms" => {
                parsed.config.udp_idle_timeout_ms = value(&args, i, "--udp-idle-ms")?;
                i += 1;
            }
            "--tcp-idle-ms" => {
                parsed.config.tcp_idle_timeout_ms = value(&args, i, "--tcp-idle-ms")?;
                i += 1;
            }
            "--json" => parsed.json = true,
            "--local" => {}
            "--verbose" | "-v" => parsed.verbose = true,
            "--help" | "-h" => {
                println!("{}", HELP);
                std::process::exit(0);
            }
            other => eprintln!("알 수 없는 옵션 무시: {}", other),
        }
        i += 1;
    }

    Ok(parsed)
}

/// 표준 입력에서 세션마다 크기를 읽음
struct ConsolePrompt {
    lines: Lines<BufReader<Stdin>>,
}

impl ConsolePrompt {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl SizeSource for ConsolePrompt {
    async fn next_size(&mut self) -> speedcheck::Result<u64> {
        print!("Enter file size to download (in bytes): ");
        std::io::stdout().flush()?;

        match self.lines.next_line().await? {
            Some(line) => parse_file_size(&line),
            None => Err(Error::Shutdown),
        }
    }
}

/// 세션 결과 출력
fn report(session: &SessionReport, json: bool) {
    info!(
        "Session with {} finished in {:.2}s",
        session.server.addr,
        session.elapsed.as_secs_f64()
    );

    if !json {
        return;
    }
    for done in session.reliable.iter().chain(session.unreliable.iter()) {
        match done.to_json() {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("JSON 직렬화 실패: {}", e),
        }
    }
}

async fn run_sessions<S: SizeSource>(
    args: &ClientArgs,
    sizes: S,
    shutdown: watch::Receiver<bool>,
) -> speedcheck::Result<()> {
    let order = Arc::new(TransferOrder::new());
    let mut session = Session::new(args.config.clone(), order, sizes, shutdown.clone())?;
    let json = args.json;

    let mut stop = shutdown;
    tokio::select! {
        result = session.run(args.sessions, |r| report(r, json)) => result,
        Ok(_) = stop.wait_for(|stopped| *stopped) => {
            info!("Client shutting down");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args()?;

    // 로깅 설정
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Client started, listening for offer requests...");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    match args.size {
        Some(size) => run_sessions(&args, FixedSize(size), shutdown_rx).await?,
        None => run_sessions(&args, ConsolePrompt::new(), shutdown_rx).await?,
    }

    Ok(())
}
