//! 기준 표본 통계.

/// 산술 평균. 빈 표본이면 `None`.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// 선형 보간 백분위.
///
/// 오름차순 정렬 후 순위 `p·(n−1)`의 값을 인접한 두 표본 사이에서 보간합니다.
/// `p`는 [0, 1]로 제한됩니다. 빈 표본이면 `None`.
pub fn percentile_linear(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}
