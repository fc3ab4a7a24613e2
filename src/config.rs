//! 측정 도구 설정

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::segment::LossModel;
use crate::DISCOVERY_PORT;

/// 기본 TCP 응답 포트
pub const DEFAULT_TCP_PORT: u16 = 65432;

/// 기본 UDP 응답 포트 (탐색 포트와 분리)
pub const DEFAULT_UDP_PORT: u16 = 13118;

/// 주기 설정의 하한 (밀리초). 0 주기는 허용하지 않음
pub const MIN_PERIOD_MS: u64 = 1;

/// speedcheck 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// Offer 브로드캐스트/수신 포트
    pub discovery_port: u16,

    /// Offer 목적지 주소
    pub broadcast_addr: Ipv4Addr,

    /// TCP 응답 포트 (0이면 OS 할당)
    pub tcp_port: u16,

    /// UDP 응답 포트 (0이면 OS 할당)
    pub udp_port: u16,

    /// Offer 브로드캐스트 주기 (밀리초)
    pub offer_interval_ms: u64,

    /// 탐색 대기 중 폴링 간격 (밀리초)
    /// 이 간격마다 종료 신호 확인
    pub discovery_poll_ms: u64,

    /// TCP 연결 타임아웃 (밀리초)
    pub connect_timeout_ms: u64,

    /// 서버측 Request 프레임 수신 타임아웃 (밀리초)
    pub request_timeout_ms: u64,

    /// TCP 수신 유휴 타임아웃 (밀리초)
    pub tcp_idle_timeout_ms: u64,

    /// UDP 수신 유휴 타임아웃 (밀리초)
    /// 이 시간 동안 세그먼트가 없으면 전송 종료로 간주
    pub udp_idle_timeout_ms: u64,

    /// UDP 수신 버퍼 크기
    pub recv_buffer_size: usize,

    /// UDP 송신 버퍼 크기
    pub send_buffer_size: usize,

    /// 서버측 손실 시뮬레이션
    pub loss: LossModel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_port: DISCOVERY_PORT,
            broadcast_addr: Ipv4Addr::BROADCAST,
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            offer_interval_ms: 1000,           // 1초
            discovery_poll_ms: 1000,
            connect_timeout_ms: 3000,
            request_timeout_ms: 3000,
            tcp_idle_timeout_ms: 3000,
            udp_idle_timeout_ms: 1000,
            recv_buffer_size: 2 * 1024 * 1024, // 2MB
            send_buffer_size: 2 * 1024 * 1024, // 2MB
            loss: LossModel::None,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 단일 호스트용 설정
    ///
    /// 루프백으로 Offer를 보내고 응답 포트는 OS가 할당
    pub fn local() -> Self {
        Self {
            broadcast_addr: Ipv4Addr::LOCALHOST,
            tcp_port: 0,
            udp_port: 0,
            offer_interval_ms: 100,
            discovery_poll_ms: 100,
            connect_timeout_ms: 1000,
            request_timeout_ms: 1000,
            tcp_idle_timeout_ms: 1000,
            udp_idle_timeout_ms: 300,
            ..Self::default()
        }
    }

    /// Offer 주기 (최소 1ms)
    pub fn offer_interval(&self) -> Duration {
        Duration::from_millis(self.offer_interval_ms.max(MIN_PERIOD_MS))
    }

    /// 탐색 폴링 간격 (최소 1ms)
    pub fn discovery_poll(&self) -> Duration {
        Duration::from_millis(self.discovery_poll_ms.max(MIN_PERIOD_MS))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn tcp_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_idle_timeout_ms)
    }

    pub fn udp_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.udp_idle_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports_are_split() {
        let config = Config::default();
        assert_eq!(config.discovery_port, DISCOVERY_PORT);
        assert_ne!(config.udp_port, config.discovery_port);
        assert_eq!(config.offer_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_periods_clamped() {
        let config = Config {
            offer_interval_ms: 0,
            discovery_poll_ms: 0,
            ..Config::local()
        };
        assert_eq!(config.offer_interval(), Duration::from_millis(1));
        assert_eq!(config.discovery_poll(), Duration::from_millis(1));
    }
}
