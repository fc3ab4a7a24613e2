//! 세션 오케스트레이터 (클라이언트측)
//!
//! 탐색 → 크기 입력 → TCP/UDP 동시 전송 → 결과 보고 → 다시 탐색

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::discovery::{DiscoveredServer, OfferListener};
use crate::requester::Requester;
use crate::stats::{CompletedTransfer, TransferOrder};
use crate::{Config, Error, Result};

/// 세션마다 요청 크기를 공급하는 외부 입력 (콘솔 프롬프트 등)
pub trait SizeSource {
    /// 다음 요청 크기. 잘못된 입력이면 `Error::InvalidFileSize`, 입력 종료면 `Error::Shutdown`
    fn next_size(&mut self) -> impl Future<Output = Result<u64>> + Send;
}

/// 매 세션 같은 크기
#[derive(Debug, Clone, Copy)]
pub struct FixedSize(pub u64);

impl SizeSource for FixedSize {
    async fn next_size(&mut self) -> Result<u64> {
        Ok(self.0)
    }
}

/// 사용자 입력을 파일 크기로 변환
///
/// 양의 정수만 허용
pub fn parse_file_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    match trimmed.parse::<u64>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(Error::InvalidFileSize(trimmed.to_string())),
    }
}

/// 세션 1회 결과
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub server: DiscoveredServer,

    pub file_size: u64,

    /// TCP 결과 (연결 실패 시 None)
    pub reliable: Option<CompletedTransfer>,

    /// UDP 결과 (소켓 실패 시 None)
    pub unreliable: Option<CompletedTransfer>,

    /// 두 전송이 모두 끝날 때까지 걸린 시간
    pub elapsed: Duration,
}

/// 클라이언트 세션 루프
pub struct Session<S> {
    listener: OfferListener,
    requester: Requester,
    sizes: S,
}

impl<S: SizeSource> Session<S> {
    /// 탐색 포트 바인드 후 세션 생성
    ///
    /// `order`는 세션들 사이에 공유되는 완료 순서 카운터
    pub fn new(
        config: Config,
        order: Arc<TransferOrder>,
        sizes: S,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let listener = OfferListener::bind(&config, shutdown)?;
        Ok(Self {
            listener,
            requester: Requester::new(Arc::new(config), order),
            sizes,
        })
    }

    /// 탐색 소켓 주소
    pub fn listener_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 세션 1회 실행
    pub async fn run_once(&mut self) -> Result<SessionReport> {
        let server = self.listener.listen().await?;
        let file_size = self.sizes.next_size().await?;

        info!(
            "Starting transfers of {} bytes from {} (tcp={}, udp={})",
            file_size, server.addr, server.tcp_port, server.udp_port
        );

        // 둘 다 시작한 뒤 기다림 (세션 시간 = max)
        let start = Instant::now();
        let tcp = {
            let requester = self.requester.clone();
            tokio::spawn(async move { requester.reliable(server.tcp_addr(), file_size).await })
        };
        let udp = {
            let requester = self.requester.clone();
            tokio::spawn(async move { requester.unreliable(server.udp_addr(), file_size).await })
        };
        let (tcp, udp) = tokio::join!(tcp, udp);
        let elapsed = start.elapsed();

        let reliable = match tcp {
            Ok(Ok(done)) => Some(done),
            Ok(Err(e)) => {
                error!("Error during TCP download: {}", e);
                None
            }
            Err(e) => {
                error!("TCP transfer task failed: {}", e);
                None
            }
        };
        let unreliable = match udp {
            Ok(Ok(done)) => Some(done),
            Ok(Err(e)) => {
                error!("Error during UDP download: {}", e);
                None
            }
            Err(e) => {
                error!("UDP transfer task failed: {}", e);
                None
            }
        };

        info!("All transfers complete. listening for offer requests");

        Ok(SessionReport {
            server,
            file_size,
            reliable,
            unreliable,
            elapsed,
        })
    }

    /// 세션 반복 실행
    ///
    /// 종료 신호나 입력 종료 시 `Ok(())`. `max_sessions`만큼 성공하면 반환
    pub async fn run<F>(&mut self, max_sessions: Option<u64>, mut on_report: F) -> Result<()>
    where
        F: FnMut(&SessionReport),
    {
        let mut completed = 0u64;

        loop {
            if max_sessions.is_some_and(|max| completed >= max) {
                return Ok(());
            }

            match self.run_once().await {
                Ok(report) => {
                    on_report(&report);
                    completed += 1;
                }
                Err(Error::Shutdown) => {
                    info!("Client shutting down after {} sessions", completed);
                    return Ok(());
                }
                Err(Error::InvalidFileSize(input)) => {
                    warn!("Invalid file size {:?}, restarting discovery", input);
                }
                Err(e) => {
                    warn!("Error in client session: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_size() {
        assert_eq!(parse_file_size("1024").unwrap(), 1024);
        assert_eq!(parse_file_size("  42\n").unwrap(), 42);

        for bad in ["0", "-5", "abc", "", "1.5", "99999999999999999999999"] {
            assert!(
                matches!(parse_file_size(bad), Err(Error::InvalidFileSize(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_fixed_size() {
        let mut sizes = FixedSize(7);
        assert_eq!(sizes.next_size().await.unwrap(), 7);
        assert_eq!(sizes.next_size().await.unwrap(), 7);
    }
}
