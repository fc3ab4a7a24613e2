//! # speedcheck
//!
//! 네트워크 처리량 측정 도구
//!
//! ## 동작 방식
//! - **탐색**: 서버가 Offer를 주기적으로 브로드캐스트, 클라이언트는 첫 유효 Offer 수신
//! - **이중 전송**: 같은 크기를 TCP(스트림)와 UDP(세그먼트)로 동시에 요청
//! - **측정**: 경과 시간, 비트레이트, UDP 세그먼트 수신률
//! - **손실 허용**: UDP는 재전송 없음, 손실 자체가 측정 대상

pub mod config;
pub mod discovery;
pub mod error;
pub mod message;
pub mod net;
pub mod requester;
pub mod responder;
pub mod segment;
pub mod session;
pub mod stats;

pub use config::Config;
pub use discovery::{Beacon, DiscoveredServer, OfferListener};
pub use error::{Error, Result};
pub use message::{MessageType, OfferMessage, PayloadMessage, RequestMessage};
pub use requester::Requester;
pub use responder::{TcpResponder, UdpResponder};
pub use segment::{expected_segments, LossModel, SegmentSplitter, SegmentTracker};
pub use session::{parse_file_size, FixedSize, Session, SessionReport, SizeSource};
pub use stats::{CompletedTransfer, TransferOrder, TransferStats, Transport};

/// 매직 쿠키 (모든 프레임 선두 4바이트)
pub const MAGIC_COOKIE: u32 = 0xabcd_dcba;

/// 탐색용 well-known UDP 포트
pub const DISCOVERY_PORT: u16 = 13117;

/// 세그먼트/청크당 최대 filler 크기 (바이트)
pub const SEGMENT_SIZE: usize = 1024;

/// Offer 프레임 길이: magic(4) + type(1) + udp_port(2) + tcp_port(2)
pub const OFFER_LEN: usize = 9;

/// Request 프레임 길이: magic(4) + type(1) + file_size(8)
pub const REQUEST_LEN: usize = 13;

/// Payload 헤더 길이: magic(4) + type(1) + segment_index(8) + total_size(8)
pub const PAYLOAD_HEADER_LEN: usize = 21;

/// 수신 버퍼 크기 (Payload 최대 길이보다 여유 있게)
pub const MAX_DATAGRAM_LEN: usize = 2048;
