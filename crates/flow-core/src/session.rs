//! KRX 정규장 세션 헬퍼 (Asia/Seoul).

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// 거래소 시간대.
pub const KST: Tz = chrono_tz::Asia::Seoul;

/// 정규장 시작 (09:00 KST).
pub const SESSION_OPEN: NaiveTime = match NaiveTime::from_hms_opt(9, 0, 0) {
    Some(t) => t,
    None => NaiveTime::MIN,
};

/// 정규장 종료 (15:30 KST).
pub const SESSION_CLOSE: NaiveTime = match NaiveTime::from_hms_opt(15, 30, 0) {
    Some(t) => t,
    None => NaiveTime::MIN,
};

/// 기준 시각이 속한 KST 거래일.
pub fn session_date(reference_time: DateTime<Utc>) -> NaiveDate {
    reference_time.with_timezone(&KST).date_naive()
}

/// KST 로컬 일시를 UTC로 변환.
pub fn kst_to_utc(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let local = date.and_time(time);
    // 현행 KST에는 서머타임 공백이 없어 항상 단일 시각으로 변환됨
    KST.from_local_datetime(&local)
        .earliest()
        .unwrap_or_else(|| KST.from_utc_datetime(&local))
        .with_timezone(&Utc)
}

/// 해당 거래일 정규장 시작 시각 (UTC).
pub fn session_open(date: NaiveDate) -> DateTime<Utc> {
    kst_to_utc(date, SESSION_OPEN)
}

/// 해당 거래일 정규장 종료 시각 (UTC).
pub fn session_close(date: NaiveDate) -> DateTime<Utc> {
    kst_to_utc(date, SESSION_CLOSE)
}

/// 해당 KST 일자 00:00 (UTC).
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    kst_to_utc(date, NaiveTime::MIN)
}

/// KRX 종목코드 형식 검사 (영숫자 6자리, 예: "005930", "0001A0").
pub fn is_kr_stock_code(ticker: &str) -> bool {
    ticker.len() == 6 && ticker.chars().all(|c| c.is_ascii_alphanumeric())
}
