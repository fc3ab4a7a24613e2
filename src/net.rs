//! 소켓 생성 도우미
//!
//! tokio UdpSocket은 바인드 전 옵션 설정이 불가하므로 socket2로 생성 후 변환

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// UDP 소켓 옵션
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpOptions {
    /// SO_REUSEADDR (같은 호스트의 여러 클라이언트가 탐색 포트 공유)
    pub reuse_address: bool,

    /// SO_BROADCAST
    pub broadcast: bool,

    /// SO_RCVBUF (0이면 OS 기본값)
    pub recv_buffer_size: usize,

    /// SO_SNDBUF (0이면 OS 기본값)
    pub send_buffer_size: usize,
}

/// 옵션을 적용해 UDP 소켓 바인드
pub fn bind_udp(addr: SocketAddr, options: UdpOptions) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    // 버퍼 크기는 커널이 제한할 수 있으므로 실패해도 계속 진행
    if options.recv_buffer_size > 0 {
        if let Err(e) = socket.set_recv_buffer_size(options.recv_buffer_size) {
            warn!("SO_RCVBUF 설정 실패: {}", e);
        }
    }
    if options.send_buffer_size > 0 {
        if let Err(e) = socket.set_send_buffer_size(options.send_buffer_size) {
            warn!("SO_SNDBUF 설정 실패: {}", e);
        }
    }

    if options.reuse_address {
        socket.set_reuse_address(true)?;
    }
    if options.broadcast {
        socket.set_broadcast(true)?;
    }

    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    let udp = UdpSocket::from_std(std_socket)?;

    debug!("UDP socket bound to {} ({:?})", udp.local_addr()?, options);
    Ok(udp)
}
