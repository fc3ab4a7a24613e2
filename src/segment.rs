//! 세그먼트 분할과 수신 집계
//!
//! - SegmentSplitter: 요청 크기를 1024바이트 이하 세그먼트로 분할 (송신측)
//! - SegmentTracker: 서로 다른 세그먼트 인덱스 집계 (수신측)
//! - LossModel: 송신측 손실 시뮬레이션

use std::collections::HashSet;

use bytes::Bytes;
use rand::Rng;

use crate::{Error, Result, SEGMENT_SIZE};

/// 세그먼트 인덱스 (1부터 시작)
pub type SegmentIndex = u64;

static FILLER: [u8; SEGMENT_SIZE] = [b'A'; SEGMENT_SIZE];

/// filler 데이터 (최대 SEGMENT_SIZE)
pub fn filler(len: usize) -> Bytes {
    Bytes::from_static(&FILLER[..len.min(SEGMENT_SIZE)])
}

/// 파일 크기에 대한 예상 세그먼트 수: ceil(file_size / 1024)
pub fn expected_segments(file_size: u64) -> u64 {
    let segment_size = SEGMENT_SIZE as u64;
    file_size / segment_size + u64::from(file_size % segment_size != 0)
}

/// 세그먼트 분할기 (송신측)
///
/// `(index, data)`를 1..=N 순서로 생성
#[derive(Debug, Clone)]
pub struct SegmentSplitter {
    file_size: u64,
    next_index: SegmentIndex,
    total: u64,
}

impl SegmentSplitter {
    pub fn new(file_size: u64) -> Self {
        Self {
            file_size,
            next_index: 1,
            total: expected_segments(file_size),
        }
    }

    /// 총 세그먼트 수
    pub fn total(&self) -> u64 {
        self.total
    }

    /// 주어진 인덱스의 데이터 길이 (index는 1..=total)
    fn segment_len(&self, index: SegmentIndex) -> usize {
        let offset = (index - 1) * SEGMENT_SIZE as u64;
        (self.file_size - offset).min(SEGMENT_SIZE as u64) as usize
    }
}

impl Iterator for SegmentSplitter {
    type Item = (SegmentIndex, Bytes);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index > self.total {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        Some((index, filler(self.segment_len(index))))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total + 1 - self.next_index) as usize;
        (remaining, Some(remaining))
    }
}

/// 세그먼트 수신 집계 (수신측)
///
/// 도착 순서와 무관하게 서로 다른 인덱스만 센다.
/// 범위 밖 인덱스는 거부하므로 집합 크기는 예상 세그먼트 수를 넘지 않음
#[derive(Debug)]
pub struct SegmentTracker {
    /// 요청 크기 (바이트)
    file_size: u64,

    /// 예상 세그먼트 수
    expected: u64,

    /// 수신된 세그먼트 인덱스
    received: HashSet<SegmentIndex>,

    /// 서로 다른 세그먼트 수
    pub received_count: u64,

    /// 중복 수신 수
    pub duplicate_count: u64,

    /// 유효 수신 바이트 (중복 제외)
    pub bytes_received: u64,
}

impl SegmentTracker {
    pub fn new(file_size: u64) -> Self {
        Self {
            file_size,
            expected: expected_segments(file_size),
            received: HashSet::new(),
            received_count: 0,
            duplicate_count: 0,
            bytes_received: 0,
        }
    }

    /// 예상 세그먼트 수
    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// 세그먼트 기록
    ///
    /// 새 인덱스면 `Ok(true)`, 중복이면 `Ok(false)`
    pub fn record(&mut self, index: SegmentIndex, total_size: u64, data_len: usize) -> Result<bool> {
        if total_size != self.file_size {
            return Err(Error::TotalSizeMismatch {
                expected: self.file_size,
                got: total_size,
            });
        }

        if index == 0 || index > self.expected() {
            return Err(Error::SegmentOutOfRange {
                index,
                expected: self.expected(),
            });
        }

        if !self.received.insert(index) {
            self.duplicate_count += 1;
            return Ok(false);
        }

        self.received_count += 1;
        self.bytes_received += data_len.min(SEGMENT_SIZE) as u64;
        Ok(true)
    }

    /// 모든 세그먼트 수신 여부
    pub fn is_complete(&self) -> bool {
        self.received_count >= self.expected()
    }

    /// 수신률 (0.0 ~ 1.0)
    ///
    /// 예상 세그먼트가 0개면 1.0
    pub fn delivery_ratio(&self) -> f64 {
        if self.expected() == 0 {
            return 1.0;
        }
        self.received_count as f64 / self.expected() as f64
    }

    /// 누락된 세그먼트 인덱스 (오름차순)
    pub fn missing(&self) -> impl Iterator<Item = SegmentIndex> + '_ {
        (1..=self.expected).filter(move |index| !self.received.contains(index))
    }
}

/// 송신측 손실 시뮬레이션
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LossModel {
    /// 손실 없음
    #[default]
    None,

    /// 세그먼트마다 `rate` 확률로 버림
    Random { rate: f64 },

    /// n번째 세그먼트마다 버림 (index % n == 0)
    DropEvery(u64),
}

impl LossModel {
    /// 무작위 손실 (비율은 0.0~1.0으로 제한)
    pub fn random(rate: f64) -> Self {
        LossModel::Random {
            rate: rate.clamp(0.0, 1.0),
        }
    }

    /// 이 세그먼트를 보내지 않을지 결정
    pub fn should_drop(&self, index: SegmentIndex) -> bool {
        match *self {
            LossModel::None => false,
            LossModel::Random { rate } => rate > 0.0 && rand::thread_rng().gen::<f64>() < rate,
            LossModel::DropEvery(n) => n > 0 && index % n == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_segments() {
        assert_eq!(expected_segments(0), 0);
        assert_eq!(expected_segments(1), 1);
        assert_eq!(expected_segments(1024), 1);
        assert_eq!(expected_segments(1025), 2);
        assert_eq!(expected_segments(2048), 2);
        assert_eq!(expected_segments(u64::MAX), u64::MAX / 1024 + 1);
    }

    #[test]
    fn test_splitter_segments() {
        let segments: Vec<_> = SegmentSplitter::new(2500).collect();

        assert_eq!(segments.len(), 3);
        let indices: Vec<u64> = segments.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(segments[0].1.len(), 1024);
        assert_eq!(segments[1].1.len(), 1024);
        assert_eq!(segments[2].1.len(), 452);
    }

    #[test]
    fn test_splitter_empty() {
        let mut splitter = SegmentSplitter::new(0);
        assert_eq!(splitter.total(), 0);
        assert!(splitter.next().is_none());
    }

    #[test]
    fn test_tracker_out_of_order_complete() {
        let mut tracker = SegmentTracker::new(3000);

        for index in [3, 1, 2] {
            let len = SegmentSplitter::new(3000).segment_len(index);
            assert!(tracker.record(index, 3000, len).unwrap());
        }

        assert!(tracker.is_complete());
        assert_eq!(tracker.delivery_ratio(), 1.0);
        assert_eq!(tracker.bytes_received, 3000);
    }

    #[test]
    fn test_tracker_duplicates_not_counted() {
        let mut tracker = SegmentTracker::new(2048);

        assert!(tracker.record(1, 2048, 1024).unwrap());
        assert!(!tracker.record(1, 2048, 1024).unwrap());
        assert!(!tracker.record(1, 2048, 1024).unwrap());

        assert_eq!(tracker.received_count, 1);
        assert_eq!(tracker.duplicate_count, 2);
        assert_eq!(tracker.bytes_received, 1024);
        assert_eq!(tracker.delivery_ratio(), 0.5);
        assert_eq!(tracker.missing().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_tracker_rejects_out_of_range() {
        let mut tracker = SegmentTracker::new(2048);

        assert!(matches!(
            tracker.record(0, 2048, 1024),
            Err(Error::SegmentOutOfRange { index: 0, .. })
        ));
        assert!(matches!(
            tracker.record(3, 2048, 1024),
            Err(Error::SegmentOutOfRange { index: 3, expected: 2 })
        ));
        assert!(matches!(
            tracker.record(1, 4096, 1024),
            Err(Error::TotalSizeMismatch { .. })
        ));
        assert_eq!(tracker.received_count, 0);
    }

    #[test]
    fn test_tracker_zero_size() {
        let tracker = SegmentTracker::new(0);
        assert!(tracker.is_complete());
        assert_eq!(tracker.delivery_ratio(), 1.0);
    }

    #[test]
    fn test_loss_model() {
        assert!(!LossModel::None.should_drop(1));
        assert!(LossModel::DropEvery(2).should_drop(2));
        assert!(!LossModel::DropEvery(2).should_drop(3));
        assert!(!LossModel::DropEvery(0).should_drop(4));
        assert!(LossModel::Random { rate: 1.0 }.should_drop(1));
        assert!(!LossModel::Random { rate: 0.0 }.should_drop(1));
    }

    #[test]
    fn test_random_rate_clamped() {
        assert_eq!(LossModel::random(1.5), LossModel::Random { rate: 1.0 });
        assert_eq!(LossModel::random(-0.2), LossModel::Random { rate: 0.0 });
    }

    #[test]
    fn test_missing_is_lazy_over_large_sizes() {
        let mut tracker = SegmentTracker::new(u64::MAX);
        tracker.record(2, u64::MAX, 1024).unwrap();

        let first: Vec<_> = tracker.missing().take(3).collect();
        assert_eq!(first, vec![1, 3, 4]);
    }
}
