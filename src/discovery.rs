//! 서버 탐색
//!
//! - Beacon: 서버가 Offer를 주기적으로 브로드캐스트
//! - OfferListener: 클라이언트가 첫 유효 Offer를 기다림

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::message::OfferMessage;
use crate::net::{bind_udp, UdpOptions};
use crate::{Config, Error, Result, MAX_DATAGRAM_LEN};

/// 수신 실패 후 재시도 간격
const RECV_BACKOFF: Duration = Duration::from_millis(100);

/// Offer 브로드캐스터 (서버측)
pub struct Beacon {
    socket: UdpSocket,
    target: SocketAddr,
    offer: OfferMessage,
    interval: Duration,
}

impl Beacon {
    /// 브로드캐스트 소켓 준비
    pub fn bind(config: &Config, offer: OfferMessage) -> Result<Self> {
        let socket = bind_udp(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            UdpOptions {
                broadcast: true,
                ..UdpOptions::default()
            },
        )?;

        Ok(Self {
            socket,
            target: SocketAddr::new(IpAddr::V4(config.broadcast_addr), config.discovery_port),
            offer,
            interval: config.offer_interval(),
        })
    }

    /// Offer 목적지
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// 알리는 Offer
    pub fn offer(&self) -> OfferMessage {
        self.offer
    }

    /// 브로드캐스트 루프
    ///
    /// 정상적으로는 반환하지 않음. 송신 실패 시 에러 반환 (서버에 치명적)
    pub async fn run(self) -> Result<()> {
        let bytes = self.offer.to_bytes();
        let mut ticker = tokio::time::interval(self.interval);

        info!(
            "Broadcasting offers to {} every {:?} (udp={}, tcp={})",
            self.target, self.interval, self.offer.udp_port, self.offer.tcp_port
        );

        loop {
            ticker.tick().await;
            self.socket.send_to(&bytes, self.target).await?;
            debug!("Broadcasted offer packet.");
        }
    }
}

/// 탐색된 서버
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredServer {
    /// Offer를 보낸 주소
    pub addr: IpAddr,

    pub tcp_port: u16,

    pub udp_port: u16,
}

impl DiscoveredServer {
    pub fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.tcp_port)
    }

    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.udp_port)
    }
}

/// Offer 수신기 (클라이언트측)
pub struct OfferListener {
    socket: UdpSocket,
    poll: Duration,
    shutdown: watch::Receiver<bool>,
}

impl OfferListener {
    /// 탐색 포트에 바인드 (SO_REUSEADDR)
    pub fn bind(config: &Config, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let socket = bind_udp(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.discovery_port),
            UdpOptions {
                reuse_address: true,
                ..UdpOptions::default()
            },
        )?;

        Ok(Self {
            socket,
            poll: config.discovery_poll(),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 첫 유효 Offer를 받을 때까지 대기
    ///
    /// 타임아웃 없음. 폴링 간격마다 종료 신호를 확인하고, 종료 시 `Error::Shutdown`
    pub async fn listen(&mut self) -> Result<DiscoveredServer> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];

        // 이전 세션 동안 쌓인 Offer는 버림
        let mut stale = 0usize;
        while self.socket.try_recv_from(&mut buf).is_ok() {
            stale += 1;
        }
        if stale > 0 {
            trace!("Discarded {} queued datagrams", stale);
        }

        loop {
            if *self.shutdown.borrow() {
                return Err(Error::Shutdown);
            }

            let (len, from) =
                match tokio::time::timeout(self.poll, self.socket.recv_from(&mut buf)).await {
                    Ok(Ok(received)) => received,
                    Ok(Err(e)) => {
                        warn!("탐색 수신 에러: {}", e);
                        tokio::time::sleep(RECV_BACKOFF).await;
                        continue;
                    }
                    Err(_) => {
                        trace!("No offer yet, still listening...");
                        continue;
                    }
                };

            match OfferMessage::from_bytes(&buf[..len]) {
                Ok(offer) => {
                    info!("Received offer from {}", from.ip());
                    return Ok(DiscoveredServer {
                        addr: from.ip(),
                        tcp_port: offer.tcp_port,
                        udp_port: offer.udp_port,
                    });
                }
                Err(e) => {
                    debug!("Ignoring datagram from {}: {}", from, e);
                }
            }
        }
    }
}
