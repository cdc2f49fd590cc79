//! 종목별 프로그램 매매 창 캐시.
//!
//! 쓰기 핸들(`ProgramWindowCache`)은 수집 태스크가 단독 소유하고,
//! 평가기는 읽기 핸들(`ProgramWindowReader`)로 복사본만 받습니다.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use flow_core::{DurableAppend, FastRead, ProgramFlowTick, StorageResult, WindowSnapshot};
use tracing::{info, warn};

use super::RingBuffer;

/// 기본 링버퍼 용량 (종목당 틱 수).
pub const DEFAULT_RING_CAPACITY: usize = 300;
/// 허용 최소 용량.
pub const MIN_RING_CAPACITY: usize = 100;
/// 허용 최대 용량.
pub const MAX_RING_CAPACITY: usize = 5000;

type Windows = HashMap<String, RingBuffer<ProgramFlowTick>>;

/// 링버퍼 쓰기 핸들. 복제할 수 없습니다.
pub struct ProgramWindowCache {
    windows: Arc<RwLock<Windows>>,
    capacity: usize,
}

impl ProgramWindowCache {
    /// 용량은 [`MIN_RING_CAPACITY`, `MAX_RING_CAPACITY`]로 제한됩니다.
    pub fn new(capacity: usize) -> Self {
        let clamped = capacity.clamp(MIN_RING_CAPACITY, MAX_RING_CAPACITY);
        if clamped != capacity {
            warn!(requested = capacity, applied = clamped, "링버퍼 용량 범위 조정");
        }
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            capacity: clamped,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 읽기 핸들 생성.
    pub fn reader(&self) -> ProgramWindowReader {
        ProgramWindowReader {
            windows: Arc::clone(&self.windows),
            capacity: self.capacity,
        }
    }

    /// 종목 추적 시작 (빈 창 생성).
    pub fn track(&mut self, ticker: &str) {
        let mut windows = self.windows.write().unwrap_or_else(|e| e.into_inner());
        windows
            .entry(ticker.to_string())
            .or_insert_with(|| RingBuffer::new(self.capacity));
    }

    /// 틱 추가. 가득 찼으면 가장 오래된 틱이 밀려납니다.
    pub fn push(&mut self, tick: ProgramFlowTick) {
        let mut windows = self.windows.write().unwrap_or_else(|e| e.into_inner());
        windows
            .entry(tick.ticker.clone())
            .or_insert_with(|| RingBuffer::new(self.capacity))
            .push(tick);
    }

    /// 종목의 가장 최근 틱.
    pub fn latest(&self, ticker: &str) -> Option<ProgramFlowTick> {
        let windows = self.windows.read().unwrap_or_else(|e| e.into_inner());
        windows.get(ticker).and_then(|w| w.latest().cloned())
    }

    /// 영구 저장소의 최근 틱으로 창 재구성.
    ///
    /// 반환값은 적재한 전체 틱 수입니다.
    pub async fn rebuild(
        &mut self,
        store: &dyn DurableAppend,
        tickers: &[String],
    ) -> StorageResult<usize> {
        let mut loaded = 0;
        for ticker in tickers {
            let ticks = store.recent_ticks(ticker, self.capacity).await?;
            loaded += ticks.len();

            let mut buffer = RingBuffer::new(self.capacity);
            buffer.extend(ticks);

            let mut windows = self.windows.write().unwrap_or_else(|e| e.into_inner());
            windows.insert(ticker.clone(), buffer);
        }

        info!(
            tickers = tickers.len(),
            ticks = loaded,
            capacity = self.capacity,
            "프로그램 매매 링버퍼 재구성 완료"
        );
        Ok(loaded)
    }
}

/// 링버퍼 읽기 핸들. 잠금은 복사하는 동안만 잡습니다.
#[derive(Clone)]
pub struct ProgramWindowReader {
    windows: Arc<RwLock<Windows>>,
    capacity: usize,
}

impl FastRead for ProgramWindowReader {
    fn snapshot(&self, ticker: &str) -> Option<WindowSnapshot> {
        let windows = self.windows.read().unwrap_or_else(|e| e.into_inner());
        windows.get(ticker).map(|w| WindowSnapshot {
            ticks: w.to_vec(),
            capacity: self.capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryProgramTickStore;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn tick(ticker: &str, seq: i64) -> ProgramFlowTick {
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap() + Duration::seconds(seq);
        ProgramFlowTick::new(ts, ticker, 10, 700_000, dec!(70000), seq * 10)
    }

    #[test]
    fn test_capacity_clamped() {
        assert_eq!(ProgramWindowCache::new(10).capacity(), MIN_RING_CAPACITY);
        assert_eq!(ProgramWindowCache::new(100_000).capacity(), MAX_RING_CAPACITY);
        assert_eq!(ProgramWindowCache::new(300).capacity(), 300);
    }

    #[test]
    fn test_reader_gets_copy() {
        let mut cache = ProgramWindowCache::new(MIN_RING_CAPACITY);
        let reader = cache.reader();
        assert!(reader.snapshot("005930").is_none());

        cache.track("005930");
        assert_eq!(reader.snapshot("005930").unwrap().ticks.len(), 0);

        for seq in 0..(MIN_RING_CAPACITY as i64 + 5) {
            cache.push(tick("005930", seq));
        }
        let snapshot = reader.snapshot("005930").unwrap();
        assert!(snapshot.is_full());
        assert_eq!(snapshot.ticks.first().unwrap().total_volume_to_date, 50);

        // 스냅샷 이후 쓰기는 기존 복사본에 영향 없음
        cache.push(tick("005930", 1000));
        assert_eq!(snapshot.ticks.len(), MIN_RING_CAPACITY);
        assert_eq!(cache.latest("005930").unwrap().total_volume_to_date, 10_000);
    }

    #[tokio::test]
    async fn test_rebuild_from_storage() {
        let store = InMemoryProgramTickStore::new();
        for seq in 0..150 {
            store.append(&tick("005930", seq)).await.unwrap();
        }
        store.append(&tick("000660", 1)).await.unwrap();

        let mut cache = ProgramWindowCache::new(MIN_RING_CAPACITY);
        let loaded = cache
            .rebuild(&store, &["005930".to_string(), "035720".to_string()])
            .await
            .unwrap();
        assert_eq!(loaded, MIN_RING_CAPACITY);

        let reader = cache.reader();
        let snapshot = reader.snapshot("005930").unwrap();
        assert_eq!(snapshot.ticks.len(), MIN_RING_CAPACITY);
        assert_eq!(snapshot.ticks.last().unwrap().total_volume_to_date, 1490);
        assert!(reader.snapshot("035720").unwrap().ticks.is_empty());
        assert!(reader.snapshot("000660").is_none());
    }
}
