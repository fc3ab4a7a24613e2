//! 프로토콜 메시지 정의
//!
//! 모든 정수는 네트워크 바이트 순서(big-endian)
//!
//! | 메시지 | 레이아웃 |
//! |---|---|
//! | Offer | magic(4) type(1) udp_port(2) tcp_port(2) |
//! | Request | magic(4) type(1) file_size(8) |
//! | Payload | magic(4) type(1) segment_index(8) total_size(8) data(..1024) |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result, MAGIC_COOKIE, OFFER_LEN, PAYLOAD_HEADER_LEN, REQUEST_LEN};

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// 서버 존재 알림 (브로드캐스트)
    Offer = 0x2,

    /// 전송 요청
    Request = 0x3,

    /// UDP 데이터 세그먼트
    Payload = 0x4,
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x2 => Ok(MessageType::Offer),
            0x3 => Ok(MessageType::Request),
            0x4 => Ok(MessageType::Payload),
            other => Err(Error::UnknownMessageType(other)),
        }
    }
}

/// 공통 헤더 검증 후 타입 뒤의 본문 반환
fn check_header(bytes: &[u8], min_len: usize, expected: MessageType) -> Result<&[u8]> {
    if bytes.len() < min_len {
        return Err(Error::FrameTooShort {
            expected: min_len,
            got: bytes.len(),
        });
    }

    let mut buf = bytes;
    let magic = buf.get_u32();
    if magic != MAGIC_COOKIE {
        return Err(Error::InvalidMagicNumber {
            expected: MAGIC_COOKIE,
            got: magic,
        });
    }

    let msg_type = MessageType::try_from(buf.get_u8())?;
    if msg_type != expected {
        return Err(Error::MessageTypeMismatch {
            expected: expected as u8,
            got: msg_type as u8,
        });
    }

    Ok(buf)
}

/// Offer 메시지 (서버 → 브로드캐스트)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferMessage {
    /// UDP 응답 포트
    pub udp_port: u16,

    /// TCP 응답 포트
    pub tcp_port: u16,
}

impl OfferMessage {
    pub fn new(udp_port: u16, tcp_port: u16) -> Self {
        Self { udp_port, tcp_port }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(OFFER_LEN);
        buf.put_u32(MAGIC_COOKIE);
        buf.put_u8(MessageType::Offer as u8);
        buf.put_u16(self.udp_port);
        buf.put_u16(self.tcp_port);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut body = check_header(bytes, OFFER_LEN, MessageType::Offer)?;
        let udp_port = body.get_u16();
        let tcp_port = body.get_u16();
        Ok(Self { udp_port, tcp_port })
    }
}

/// Request 메시지 (클라이언트 → 서버, TCP/UDP 공통)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestMessage {
    /// 요청 파일 크기 (바이트)
    pub file_size: u64,
}

impl RequestMessage {
    pub fn new(file_size: u64) -> Self {
        Self { file_size }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(REQUEST_LEN);
        buf.put_u32(MAGIC_COOKIE);
        buf.put_u8(MessageType::Request as u8);
        buf.put_u64(self.file_size);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut body = check_header(bytes, REQUEST_LEN, MessageType::Request)?;
        Ok(Self {
            file_size: body.get_u64(),
        })
    }
}

/// Payload 메시지 (서버 → 클라이언트, UDP 전용)
///
/// `total_size`는 세그먼트 수가 아니라 원래 요청된 파일 크기(바이트)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMessage {
    /// 세그먼트 인덱스 (1부터 시작)
    pub segment_index: u64,

    /// 요청된 전체 파일 크기 (바이트)
    pub total_size: u64,

    /// filler 데이터
    pub data: Bytes,
}

impl PayloadMessage {
    pub fn new(segment_index: u64, total_size: u64, data: Bytes) -> Self {
        Self {
            segment_index,
            total_size,
            data,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PAYLOAD_HEADER_LEN + self.data.len());
        buf.put_u32(MAGIC_COOKIE);
        buf.put_u8(MessageType::Payload as u8);
        buf.put_u64(self.segment_index);
        buf.put_u64(self.total_size);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut body = check_header(bytes, PAYLOAD_HEADER_LEN, MessageType::Payload)?;
        let segment_index = body.get_u64();
        let total_size = body.get_u64();
        Ok(Self {
            segment_index,
            total_size,
            data: Bytes::copy_from_slice(body),
        })
    }
}
