//! 에러 타입 정의

use thiserror::Error;

/// speedcheck 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("프레임 길이 부족: expected {expected} bytes 이상, got {got}")]
    FrameTooShort { expected: usize, got: usize },

    #[error("유효하지 않은 매직 넘버: expected {expected:08X}, got {got:08X}")]
    InvalidMagicNumber { expected: u32, got: u32 },

    #[error("메시지 타입 불일치: expected {expected:#04x}, got {got:#04x}")]
    MessageTypeMismatch { expected: u8, got: u8 },

    #[error("알 수 없는 메시지 타입: {0:#04x}")]
    UnknownMessageType(u8),

    #[error("범위를 벗어난 세그먼트 인덱스: {index} (expected 1..={expected})")]
    SegmentOutOfRange { index: u64, expected: u64 },

    #[error("총 크기 불일치: expected {expected}, got {got}")]
    TotalSizeMismatch { expected: u64, got: u64 },

    #[error("유효하지 않은 파일 크기: {0:?}")]
    InvalidFileSize(String),

    #[error("타임아웃: {0}")]
    Timeout(&'static str),

    #[error("연결 종료")]
    ConnectionClosed,

    #[error("종료 요청")]
    Shutdown,
}

impl Error {
    /// 프레임 형식 오류 여부 (해당 프레임만 버리고 계속 진행)
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::FrameTooShort { .. }
                | Error::InvalidMagicNumber { .. }
                | Error::MessageTypeMismatch { .. }
                | Error::UnknownMessageType(_)
                | Error::SegmentOutOfRange { .. }
                | Error::TotalSizeMismatch { .. }
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
