//! 전송 응답자 (서버측)
//!
//! - TcpResponder: 연결마다 핸들러 태스크, 요청 크기만큼 filler 스트림 전송
//! - UdpResponder: 요청 datagram마다 핸들러 태스크, 번호 붙은 세그먼트 전송
//!
//! 핸들러 에러는 해당 핸들러 안에서 끝나며 accept/recv 루프를 멈추지 않음

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tracing::{debug, info, warn};

use crate::message::{PayloadMessage, RequestMessage};
use crate::net::{bind_udp, UdpOptions};
use crate::segment::{filler, SegmentSplitter};
use crate::{Config, Error, Result, MAX_DATAGRAM_LEN, REQUEST_LEN, SEGMENT_SIZE};

/// accept/recv 실패 후 재시도 간격
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// TCP 응답자
pub struct TcpResponder {
    listener: TcpListener,
    config: Arc<Config>,
}

impl TcpResponder {
    /// TCP 포트 바인드
    pub async fn bind(config: &Config) -> Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.tcp_port);
        let listener = TcpListener::bind(addr).await?;
        info!("TCP server listening on port {}.", listener.local_addr()?.port());

        Ok(Self {
            listener,
            config: Arc::new(config.clone()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// accept 루프
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept 에러: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            debug!("Accepted connection from {}.", peer);
            let config = self.config.clone();

            tokio::spawn(async move {
                match handle_stream(stream, peer, &config).await {
                    Ok(sent) => {
                        info!("Completed TCP transfer to {}, total bytes: {}.", peer, sent);
                    }
                    Err(e) if e.is_format_error() => {
                        warn!("Invalid request format from {}: {}", peer, e);
                    }
                    Err(e) => {
                        warn!("Error handling client {}: {}", peer, e);
                    }
                }
            });
        }
    }
}

/// TCP 연결 1개 처리: Request 읽기 → filler 전송 → 종료
///
/// 쓰기 단위는 SEGMENT_SIZE 이하
async fn handle_stream<S>(mut stream: S, peer: SocketAddr, config: &Config) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; REQUEST_LEN];
    match tokio::time::timeout(config.request_timeout(), stream.read_exact(&mut buf)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::ConnectionClosed);
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(Error::Timeout("request read")),
    }

    // 유효하지 않은 요청이면 응답 없이 연결 종료 (stream drop)
    let request = RequestMessage::from_bytes(&buf)?;
    info!(
        "Received valid request from {}, file size: {} bytes.",
        peer, request.file_size
    );

    let idle = config.tcp_idle_timeout();
    let mut sent = 0u64;
    while sent < request.file_size {
        let len = (request.file_size - sent).min(SEGMENT_SIZE as u64) as usize;
        let chunk = filler(len);
        tokio::time::timeout(idle, stream.write_all(&chunk))
            .await
            .map_err(|_| Error::Timeout("stream write"))??;
        sent += len as u64;
    }

    stream.shutdown().await?;
    Ok(sent)
}

/// UDP 응답자
pub struct UdpResponder {
    socket: UdpSocket,
    config: Arc<Config>,
}

impl UdpResponder {
    /// UDP 포트 바인드
    pub fn bind(config: &Config) -> Result<Self> {
        let socket = bind_udp(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.udp_port),
            UdpOptions {
                recv_buffer_size: config.recv_buffer_size,
                ..UdpOptions::default()
            },
        )?;
        info!("UDP server listening on port {}.", socket.local_addr()?.port());

        Ok(Self {
            socket,
            config: Arc::new(config.clone()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 수신 루프
    pub async fn run(self) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("UDP 수신 에러: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let datagram = buf[..len].to_vec();
            let config = self.config.clone();

            tokio::spawn(async move {
                match handle_datagram(&datagram, peer, &config).await {
                    Ok(report) => {
                        info!(
                            "Completed UDP transfer to {}, total segments: {} (dropped {}), {:.2}s.",
                            peer,
                            report.sent,
                            report.dropped,
                            report.elapsed.as_secs_f64()
                        );
                    }
                    Err(e) if e.is_format_error() => {
                        warn!("Invalid UDP request format from {}: {}", peer, e);
                    }
                    Err(e) => {
                        warn!("Error handling UDP request from {}: {}", peer, e);
                    }
                }
            });
        }
    }
}

/// UDP 핸들러 결과
#[derive(Debug, Clone, Copy)]
struct SegmentReport {
    sent: u64,
    dropped: u64,
    elapsed: Duration,
}

/// UDP 요청 1개 처리: 전용 소켓으로 세그먼트 1..=N 연속 전송
///
/// pacing, 재전송, 종료 프레임 없음
async fn handle_datagram(datagram: &[u8], peer: SocketAddr, config: &Config) -> Result<SegmentReport> {
    let request = RequestMessage::from_bytes(datagram)?;
    info!(
        "Valid UDP request from {}, file size: {} bytes.",
        peer, request.file_size
    );

    let bind_addr = match peer {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = bind_udp(
        bind_addr,
        UdpOptions {
            send_buffer_size: config.send_buffer_size,
            ..UdpOptions::default()
        },
    )?;

    let start = Instant::now();
    let mut report = SegmentReport {
        sent: 0,
        dropped: 0,
        elapsed: Duration::ZERO,
    };

    for (index, data) in SegmentSplitter::new(request.file_size) {
        if config.loss.should_drop(index) {
            report.dropped += 1;
            continue;
        }

        let frame = PayloadMessage::new(index, request.file_size, data).to_bytes();
        socket.send_to(&frame, peer).await?;
        report.sent += 1;
    }

    report.elapsed = start.elapsed();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::ReadBuf;

    use crate::segment::LossModel;
    use crate::MAGIC_COOKIE;

    /// 미리 넣은 요청을 읽히고 write 호출마다 길이를 기록하는 스트림
    struct RecordingStream {
        request: Vec<u8>,
        read_pos: usize,
        writes: Vec<usize>,
        shut_down: bool,
    }

    impl RecordingStream {
        fn new(request: Vec<u8>) -> Self {
            Self {
                request,
                read_pos: 0,
                writes: Vec::new(),
                shut_down: false,
            }
        }
    }

    impl AsyncRead for RecordingStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            let n = (this.request.len() - this.read_pos).min(buf.remaining());
            buf.put_slice(&this.request[this.read_pos..this.read_pos + n]);
            this.read_pos += n;
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for RecordingStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            data: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.get_mut().writes.push(data.len());
            Poll::Ready(Ok(data.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.get_mut().shut_down = true;
            Poll::Ready(Ok(()))
        }
    }

    fn local_peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9)
    }

    #[tokio::test]
    async fn test_handle_stream_writes_bounded_chunks() {
        let mut stream = RecordingStream::new(RequestMessage::new(2500).to_bytes());

        let sent = handle_stream(&mut stream, local_peer(), &Config::local())
            .await
            .unwrap();

        assert_eq!(sent, 2500);
        assert_eq!(stream.writes, vec![1024, 1024, 452]);
        assert!(stream.shut_down);
    }

    #[tokio::test]
    async fn test_handle_stream_zero_size_writes_nothing() {
        let mut stream = RecordingStream::new(RequestMessage::new(0).to_bytes());

        let sent = handle_stream(&mut stream, local_peer(), &Config::local())
            .await
            .unwrap();

        assert_eq!(sent, 0);
        assert!(stream.writes.is_empty());
        assert!(stream.shut_down);
    }

    #[tokio::test]
    async fn test_handle_stream_invalid_request_writes_nothing() {
        let mut request = RequestMessage::new(4096).to_bytes();
        request[4] = 0x2;
        let mut stream = RecordingStream::new(request);

        let err = handle_stream(&mut stream, local_peer(), &Config::local())
            .await
            .unwrap_err();

        assert!(err.is_format_error());
        assert!(stream.writes.is_empty());
        assert!(!stream.shut_down);
    }

    #[tokio::test]
    async fn test_handle_stream_short_request_is_closed() {
        let mut stream = RecordingStream::new(vec![0xab, 0xcd]);

        let err = handle_stream(&mut stream, local_peer(), &Config::local())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_handle_datagram_segments() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = receiver.local_addr().unwrap();
        let config = Config::local();

        let request = RequestMessage::new(2500).to_bytes();
        let report = handle_datagram(&request, peer, &config).await.unwrap();
        assert_eq!(report.sent, 3);
        assert_eq!(report.dropped, 0);

        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        let mut lens = Vec::new();
        for expected_index in 1..=3u64 {
            let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
            let payload = PayloadMessage::from_bytes(&buf[..len]).unwrap();
            // 루프백에서는 순서대로 도착
            assert_eq!(payload.segment_index, expected_index);
            assert_eq!(payload.total_size, 2500);
            lens.push(payload.data.len());
        }
        assert_eq!(lens, vec![1024, 1024, 452]);
    }

    #[tokio::test]
    async fn test_handle_datagram_drop_every() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = receiver.local_addr().unwrap();
        let config = Config {
            loss: LossModel::DropEvery(2),
            ..Config::local()
        };

        let request = RequestMessage::new(4096).to_bytes();
        let report = handle_datagram(&request, peer, &config).await.unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(report.dropped, 2);
    }

    #[tokio::test]
    async fn test_handle_datagram_rejects_bad_magic() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = receiver.local_addr().unwrap();

        let mut request = RequestMessage::new(1024).to_bytes();
        request[..4].copy_from_slice(&(MAGIC_COOKIE ^ 1).to_be_bytes());

        let err = handle_datagram(&request, peer, &Config::local())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMagicNumber { .. }));
    }
}
