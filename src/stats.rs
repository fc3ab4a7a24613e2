//! 전송 통계

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::Result;

/// 전송 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transport {
    /// TCP 스트림
    Reliable,

    /// UDP 세그먼트
    Unreliable,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Reliable => write!(f, "TCP"),
            Transport::Unreliable => write!(f, "UDP"),
        }
    }
}

/// 전송 1회의 통계
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferStats {
    /// 전송 방식
    pub transport: Transport,

    /// 요청 크기 (바이트)
    pub requested_bytes: u64,

    /// 수신 바이트 (UDP는 중복 제외)
    pub bytes_received: u64,

    /// 경과 시간
    pub elapsed: Duration,

    /// 예상 세그먼트 수 (UDP 전용)
    pub expected_segments: Option<u64>,

    /// 서로 다른 세그먼트 수신 수 (UDP 전용)
    pub segments_received: Option<u64>,

    /// 중복 수신된 세그먼트 수 (UDP 전용)
    pub duplicate_segments: Option<u64>,
}

impl TransferStats {
    /// TCP 전송 통계
    pub fn reliable(requested_bytes: u64, bytes_received: u64, elapsed: Duration) -> Self {
        Self {
            transport: Transport::Reliable,
            requested_bytes,
            bytes_received,
            elapsed,
            expected_segments: None,
            segments_received: None,
            duplicate_segments: None,
        }
    }

    /// UDP 전송 통계
    pub fn unreliable(
        requested_bytes: u64,
        bytes_received: u64,
        elapsed: Duration,
        expected_segments: u64,
        segments_received: u64,
        duplicate_segments: u64,
    ) -> Self {
        Self {
            transport: Transport::Unreliable,
            requested_bytes,
            bytes_received,
            elapsed,
            expected_segments: Some(expected_segments),
            segments_received: Some(segments_received),
            duplicate_segments: Some(duplicate_segments),
        }
    }

    /// 비트레이트 (bits/sec)
    ///
    /// 경과 시간이 0이면 0
    pub fn bitrate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes_received as f64 * 8.0 / secs
    }

    /// 세그먼트 수신률 (0.0 ~ 1.0, UDP 전용)
    ///
    /// 예상 세그먼트가 0개면 1.0
    pub fn delivery_ratio(&self) -> Option<f64> {
        let expected = self.expected_segments?;
        let received = self.segments_received.unwrap_or(0);
        if expected == 0 {
            return Some(1.0);
        }
        Some((received as f64 / expected as f64).min(1.0))
    }

    /// 요청 크기만큼 수신하지 못했는지
    pub fn is_short(&self) -> bool {
        self.bytes_received < self.requested_bytes
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} bytes, time: {:.2}s, speed: {:.2} bps",
            self.bytes_received,
            self.elapsed.as_secs_f64(),
            self.bitrate(),
        );
        if let Some(ratio) = self.delivery_ratio() {
            line.push_str(&format!(", packets received: {:.2}%", ratio * 100.0));
        }
        if let Some(duplicates) = self.duplicate_segments.filter(|&d| d > 0) {
            line.push_str(&format!(", duplicates: {}", duplicates));
        }
        line
    }
}

/// 완료 순서가 붙은 전송 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTransfer {
    /// 완료 순서 (1부터)
    pub order: u64,

    pub stats: TransferStats,
}

impl CompletedTransfer {
    /// JSON 한 줄
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for CompletedTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transfer #{} finished: {}",
            self.stats.transport,
            self.order,
            self.stats.summary()
        )
    }
}

/// 전송 완료 순서 카운터
///
/// 모든 세션과 전송 방식이 공유. 완료 시점에 다음 값을 받는다.
#[derive(Debug)]
pub struct TransferOrder {
    next: Mutex<u64>,
}

impl TransferOrder {
    pub fn new() -> Self {
        Self { next: Mutex::new(1) }
    }

    /// 다음 순서 값
    pub fn next(&self) -> u64 {
        let mut next = self.next.lock();
        let order = *next;
        *next += 1;
        order
    }

    /// 통계에 완료 순서 부여
    pub fn complete(&self, stats: TransferStats) -> CompletedTransfer {
        CompletedTransfer {
            order: self.next(),
            stats,
        }
    }

    /// 지금까지 완료된 전송 수
    pub fn completed(&self) -> u64 {
        *self.next.lock() - 1
    }
}

impl Default for TransferOrder {
    fn default() -> Self {
        Self::new()
    }
}
