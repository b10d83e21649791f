//! 배치 버퍼.
//!
//! 추적된 레코드를 삽입 순서대로 보관한다. 매니저 액터만 접근하므로 내부 잠금은 없다.
//! 최대 레코드 수를 넘으면 가장 오래된(앞쪽) 레코드부터 버린다.

use pulse_core::models::metric::MetricRecord;
use std::collections::VecDeque;

/// 메모리 배치 버퍼
#[derive(Debug)]
pub struct BatchBuffer {
    records: VecDeque<MetricRecord>,
    max_records: usize,
}

impl BatchBuffer {
    /// 새 버퍼 생성
    pub fn new(max_records: usize) -> Self {
        Self {
            records: VecDeque::new(),
            max_records: max_records.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// 최대 레코드 수 변경
    ///
    /// # Returns
    /// 줄어든 용량 때문에 버려진 레코드 수
    pub fn set_max_records(&mut self, max_records: usize) -> usize {
        self.max_records = max_records.max(1);
        self.trim_front()
    }

    /// 뒤에 추가
    ///
    /// # Returns
    /// 용량 초과로 버려진 레코드 수
    pub fn append(&mut self, record: MetricRecord) -> usize {
        self.records.push_back(record);
        self.trim_front()
    }

    /// 앞에 다시 삽입 (순서 유지)
    ///
    /// # Returns
    /// 용량 초과로 버려진 레코드 수
    pub fn prepend(&mut self, records: Vec<MetricRecord>) -> usize {
        for record in records.into_iter().rev() {
            self.records.push_front(record);
        }
        self.trim_front()
    }

    /// 전체를 떼어내 반환 (버퍼는 비워짐)
    pub fn drain_all(&mut self) -> Vec<MetricRecord> {
        self.records.drain(..).collect()
    }

    /// 전달 없이 버림
    ///
    /// # Returns
    /// 버린 레코드 수
    pub fn clear(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }

    /// 즉시 flush 임계치 도달 여부
    pub fn reached(&self, batch_size: usize) -> bool {
        self.records.len() >= batch_size
    }

    fn trim_front(&mut self) -> usize {
        let excess = self.records.len().saturating_sub(self.max_records);
        self.records.drain(..excess);
        excess
    }
}
