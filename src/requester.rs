//! 전송 요청자 (클라이언트측)
//!
//! 상태: Idle → RequestSent → Receiving → Completed
//!
//! - TCP: 요청 크기 도달 또는 상대 종료까지 읽기
//! - UDP: 모든 세그먼트 수신 또는 유휴 타임아웃까지 읽기
//!
//! 전송 도중 에러는 부분 통계로 끝남. 연결/바인드 실패만 에러로 반환

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::message::{PayloadMessage, RequestMessage};
use crate::net::{bind_udp, UdpOptions};
use crate::segment::SegmentTracker;
use crate::stats::{CompletedTransfer, TransferOrder, TransferStats};
use crate::{Config, Error, Result, MAX_DATAGRAM_LEN};

/// TCP 읽기 버퍼 크기
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// 불완전 전송 시 로그에 남길 누락 인덱스 수
const MISSING_LOG_LIMIT: usize = 16;

/// 전송 요청자
///
/// 완료 순서 카운터는 외부에서 주입 (여러 세션이 공유)
#[derive(Clone)]
pub struct Requester {
    config: Arc<Config>,
    order: Arc<TransferOrder>,
}

impl Requester {
    pub fn new(config: Arc<Config>, order: Arc<TransferOrder>) -> Self {
        Self { config, order }
    }

    /// TCP 전송 후 완료 순서 부여 및 기록
    pub async fn reliable(&self, server: SocketAddr, file_size: u64) -> Result<CompletedTransfer> {
        let stats = reliable_transfer(server, file_size, &self.config).await?;
        Ok(self.finish(stats))
    }

    /// UDP 전송 후 완료 순서 부여 및 기록
    pub async fn unreliable(&self, server: SocketAddr, file_size: u64) -> Result<CompletedTransfer> {
        let stats = unreliable_transfer(server, file_size, &self.config).await?;
        Ok(self.finish(stats))
    }

    fn finish(&self, stats: TransferStats) -> CompletedTransfer {
        let done = self.order.complete(stats);
        info!(
            order = done.order,
            transport = %done.stats.transport,
            bytes = done.stats.bytes_received,
            elapsed_ms = done.stats.elapsed.as_millis() as u64,
            "{}",
            done
        );
        done
    }
}

/// TCP 전송 1회
pub async fn reliable_transfer(
    server: SocketAddr,
    file_size: u64,
    config: &Config,
) -> Result<TransferStats> {
    // Idle → RequestSent
    let mut stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(server))
        .await
        .map_err(|_| Error::Timeout("tcp connect"))??;
    stream.write_all(&RequestMessage::new(file_size).to_bytes()).await?;

    // RequestSent → Receiving
    let idle = config.tcp_idle_timeout();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut received = 0u64;
    let start = Instant::now();

    while received < file_size {
        let want = (file_size - received).min(buf.len() as u64) as usize;
        match tokio::time::timeout(idle, stream.read(&mut buf[..want])).await {
            Ok(Ok(0)) => {
                debug!("TCP peer closed after {} bytes", received);
                break;
            }
            Ok(Ok(n)) => received += n as u64,
            Ok(Err(e)) => {
                warn!("TCP 수신 에러 ({} bytes 수신 후): {}", received, e);
                break;
            }
            Err(_) => {
                warn!("TCP idle timeout after {} bytes", received);
                break;
            }
        }
    }

    // Receiving → Completed
    let stats = TransferStats::reliable(file_size, received, start.elapsed());
    if stats.is_short() {
        warn!("Short TCP transfer: {}/{} bytes", received, file_size);
    }
    Ok(stats)
}

/// UDP 전송 1회
pub async fn unreliable_transfer(
    server: SocketAddr,
    file_size: u64,
    config: &Config,
) -> Result<TransferStats> {
    let bind_addr = match server {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = bind_udp(
        bind_addr,
        UdpOptions {
            recv_buffer_size: config.recv_buffer_size,
            ..UdpOptions::default()
        },
    )?;

    // Idle → RequestSent
    socket
        .send_to(&RequestMessage::new(file_size).to_bytes(), server)
        .await?;

    // RequestSent → Receiving
    let idle = config.udp_idle_timeout();
    let mut tracker = SegmentTracker::new(file_size);
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    let start = Instant::now();
    let mut last_arrival = None;

    while !tracker.is_complete() {
        let (len, from) = match tokio::time::timeout(idle, socket.recv_from(&mut buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                warn!("UDP 수신 에러: {}", e);
                break;
            }
            Err(_) => {
                debug!("UDP idle timeout, {} segments seen", tracker.received_count);
                break;
            }
        };

        let payload = match PayloadMessage::from_bytes(&buf[..len]) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Received an invalid packet of size {} bytes from {}: {}", len, from, e);
                continue;
            }
        };

        match tracker.record(payload.segment_index, payload.total_size, payload.data.len()) {
            Ok(true) => last_arrival = Some(Instant::now()),
            Ok(false) => debug!("Duplicate segment {}", payload.segment_index),
            Err(e) => warn!("Rejected segment from {}: {}", from, e),
        }
    }

    // Receiving → Completed
    if !tracker.is_complete() {
        let missing: Vec<_> = tracker.missing().take(MISSING_LOG_LIMIT).collect();
        debug!(
            "UDP transfer incomplete, {}/{} segments, first missing: {:?}",
            tracker.received_count,
            tracker.expected(),
            missing
        );
    }

    // 경과 시간은 마지막 유효 세그먼트까지 (유휴 타임아웃 제외)
    let elapsed = match last_arrival {
        Some(at) => at.duration_since(start),
        None => start.elapsed(),
    };

    Ok(TransferStats::unreliable(
        file_size,
        tracker.bytes_received,
        elapsed,
        tracker.expected(),
        tracker.received_count,
        tracker.duplicate_count,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::net::{TcpListener, UdpSocket};

    use crate::segment::filler;

    #[tokio::test]
    async fn test_reliable_zero_size() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 13];
            stream.read_exact(&mut buf).await.unwrap();
            RequestMessage::from_bytes(&buf).unwrap()
        });

        let stats = reliable_transfer(addr, 0, &Config::local()).await.unwrap();
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(server.await.unwrap().file_size, 0);
    }

    #[tokio::test]
    async fn test_reliable_early_close_is_short() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 13];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&[b'A'; 100]).await.unwrap();
            // drop → 연결 종료
        });

        let stats = reliable_transfer(addr, 5000, &Config::local()).await.unwrap();
        assert_eq!(stats.bytes_received, 100);
        assert!(stats.is_short());
    }

    #[tokio::test]
    async fn test_unreliable_ignores_duplicates_and_garbage() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, client) = server.recv_from(&mut buf).await.unwrap();
            let request = RequestMessage::from_bytes(&buf[..len]).unwrap();

            let frames = [
                PayloadMessage::new(2, request.file_size, filler(1024)).to_bytes(),
                Bytes::from_static(b"not a frame"),
                PayloadMessage::new(2, request.file_size, filler(1024)).to_bytes(),
                PayloadMessage::new(99, request.file_size, filler(1024)).to_bytes(),
                PayloadMessage::new(1, request.file_size, filler(1024)).to_bytes(),
            ];
            for frame in frames {
                server.send_to(&frame, client).await.unwrap();
            }
        });

        let stats = unreliable_transfer(server_addr, 2048, &Config::local())
            .await
            .unwrap();
        responder.await.unwrap();

        assert_eq!(stats.bytes_received, 2048);
        assert_eq!(stats.segments_received, Some(2));
        assert_eq!(stats.duplicate_segments, Some(1));
        assert_eq!(stats.delivery_ratio(), Some(1.0));
    }

    #[tokio::test]
    async fn test_unreliable_nothing_arrives() {
        // 요청을 받기만 하고 응답하지 않는 서버
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let stats = unreliable_transfer(server_addr, 4096, &Config::local())
            .await
            .unwrap();

        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.delivery_ratio(), Some(0.0));
        assert!(stats.elapsed >= Config::local().udp_idle_timeout());
        drop(server);
    }

    #[tokio::test]
    async fn test_requester_assigns_order() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let order = Arc::new(TransferOrder::new());
        let requester = Requester::new(Arc::new(Config::local()), order.clone());

        let first = requester.unreliable(server_addr, 0).await.unwrap();
        let second = requester.unreliable(server_addr, 0).await.unwrap();

        assert_eq!(first.order, 1);
        assert_eq!(second.order, 2);
        assert_eq!(first.stats.delivery_ratio(), Some(1.0));
        assert_eq!(order.completed(), 2);
    }
}
