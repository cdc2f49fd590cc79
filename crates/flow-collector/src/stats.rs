//! 수집 통계 구조체.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// EOD 수집 작업 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    /// 총 시도 횟수
    pub total: usize,
    /// 성공 횟수
    pub success: usize,
    /// 에러 횟수
    pub errors: usize,
    /// 빈 데이터 (휴장 등 조회 성공, 데이터 없음)
    pub empty: usize,
    /// 저장된 총 레코드 수
    pub total_records: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CollectionStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 성공률 계산 (%)
    ///
    /// empty(휴장 등 정상 데이터 없음)는 분모에서 제외.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.total.saturating_sub(self.empty);
        if attempted == 0 {
            0.0
        } else {
            (self.success as f64 / attempted as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            success = self.success,
            errors = self.errors,
            empty = self.empty,
            total_records = self.total_records,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "수집 완료"
        );
    }
}

/// 프로그램 매매 수집 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    /// 시작한 연결 세션 수
    pub sessions: u32,
    /// 재연결 횟수
    pub reconnects: u32,
    /// 수신한 틱 수
    pub ticks_received: u64,
    /// 저장 성공한 틱 수
    pub ticks_stored: u64,
    /// 단조 증가 위반으로 버린 틱 수
    pub ticks_dropped: u64,
    /// 저장 실패 횟수 (링버퍼에는 반영됨)
    pub storage_failures: u64,
    /// 재연결 한도 초과로 중단했는지 여부
    pub gave_up: bool,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl IngestStats {
    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            sessions = self.sessions,
            reconnects = self.reconnects,
            ticks_received = self.ticks_received,
            ticks_stored = self.ticks_stored,
            ticks_dropped = self.ticks_dropped,
            storage_failures = self.storage_failures,
            gave_up = self.gave_up,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "프로그램 매매 수집 종료"
        );
    }
}
