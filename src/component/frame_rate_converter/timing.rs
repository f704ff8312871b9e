//! 時間戳縮放與音訊速度計算

use crate::error::{ConvertError, ConvertResult, ErrorCode};

/// atempo 濾鏡可接受的單段範圍
pub const TEMPO_STAGE_MIN: f64 = 0.5;
pub const TEMPO_STAGE_MAX: f64 = 2.0;

/// 一個檔案的時間轉換計畫
#[derive(Debug, Clone, PartialEq)]
pub struct TimingPlan {
    /// source_fps / target_fps
    pub pts_scale: f64,
    /// target_fps / source_fps
    pub tempo_factor: f64,
    /// 每段皆在 [0.5, 2.0] 之內，乘積等於 tempo_factor
    pub tempo_stages: Vec<f64>,
}

impl TimingPlan {
    pub fn new(source_fps: f64, target_fps: f64) -> ConvertResult<Self> {
        if !(source_fps.is_finite() && target_fps.is_finite())
            || source_fps <= 0.0
            || target_fps <= 0.0
        {
            return Err(ConvertError::new(
                ErrorCode::InvalidFps,
                format!("src_fps={source_fps} target_fps={target_fps}"),
            ));
        }

        let tempo_factor = target_fps / source_fps;
        let pts_scale = source_fps / target_fps;
        let tempo_stages = decompose_tempo(tempo_factor);
        if !pts_scale.is_finite() || tempo_stages.is_empty() {
            return Err(ConvertError::new(
                ErrorCode::InvalidFps,
                format!("src_fps={source_fps} target_fps={target_fps}"),
            ));
        }

        Ok(Self {
            pts_scale,
            tempo_factor,
            tempo_stages,
        })
    }

    /// 轉換後的播放長度
    #[must_use]
    pub fn scaled_duration(&self, source_duration: f64) -> f64 {
        source_duration * self.pts_scale
    }

    /// `-vf` 使用的 setpts 濾鏡
    #[must_use]
    pub fn setpts_filter(&self) -> String {
        format!("setpts={:.5}*PTS", self.pts_scale)
    }

    /// `-af` 使用的 atempo 濾鏡鏈
    #[must_use]
    pub fn atempo_filter(&self) -> String {
        self.tempo_stages
            .iter()
            .map(|stage| format!("atempo={stage:.3}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// 將超出 [0.5, 2.0] 的速度拆成多段
///
/// 大於 2 時重複輸出 2.0，小於 0.5 時重複輸出 0.5，最後輸出剩餘值（取到小數三位）。
/// 非有限值或不大於 0 時回傳空序列。
#[must_use]
pub fn decompose_tempo(tempo_factor: f64) -> Vec<f64> {
    if !tempo_factor.is_finite() || tempo_factor <= 0.0 {
        return Vec::new();
    }

    let mut stages = Vec::new();
    let mut remaining = tempo_factor;

    while remaining > TEMPO_STAGE_MAX {
        stages.push(TEMPO_STAGE_MAX);
        remaining /= TEMPO_STAGE_MAX;
    }
    while remaining < TEMPO_STAGE_MIN {
        stages.push(TEMPO_STAGE_MIN);
        remaining /= TEMPO_STAGE_MIN;
    }

    let last = (remaining * 1000.0).round() / 1000.0;
    stages.push(last.clamp(TEMPO_STAGE_MIN, TEMPO_STAGE_MAX));
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stages: &[f64]) -> f64 {
        stages.iter().product()
    }

    #[test]
    fn test_30_to_25() {
        let plan = TimingPlan::new(30.0, 25.0).unwrap();
        assert!((plan.pts_scale - 1.2).abs() < 1e-9);
        assert!((plan.tempo_factor - 0.83333).abs() < 1e-5);
        assert_eq!(plan.tempo_stages, vec![0.833]);
        assert_eq!(plan.setpts_filter(), "setpts=1.20000*PTS");
        assert_eq!(plan.atempo_filter(), "atempo=0.833");
    }

    #[test]
    fn test_60_to_12_decomposes() {
        let plan = TimingPlan::new(60.0, 12.0).unwrap();
        assert!((plan.tempo_factor - 0.2).abs() < 1e-9);
        assert_eq!(plan.tempo_stages, vec![0.5, 0.5, 0.8]);
        assert_eq!(plan.atempo_filter(), "atempo=0.500,atempo=0.500,atempo=0.800");
    }

    #[test]
    fn test_large_speedup_decomposes() {
        let stages = decompose_tempo(10.0);
        assert_eq!(stages, vec![2.0, 2.0, 2.0, 1.25]);
    }

    #[test]
    fn test_reciprocal_for_many_rates() {
        let rates = [0.1, 1.0, 12.0, 23.976, 24.0, 25.0, 29.97, 30.0, 50.0, 60.0, 120.0, 240.0, 1000.0];
        for &src in &rates {
            for &dst in &rates {
                let plan = TimingPlan::new(src, dst).unwrap();
                assert!(
                    (plan.pts_scale * plan.tempo_factor - 1.0).abs() < 1e-4,
                    "src={src} dst={dst}"
                );
            }
        }
    }

    #[test]
    fn test_stages_in_range_and_product_matches() {
        let mut factor = 0.001;
        while factor < 1000.0 {
            let stages = decompose_tempo(factor);
            assert!(
                stages
                    .iter()
                    .all(|s| (TEMPO_STAGE_MIN..=TEMPO_STAGE_MAX).contains(s)),
                "factor={factor} stages={stages:?}"
            );
            let relative = (product(&stages) - factor).abs() / factor;
            assert!(relative < 1e-3, "factor={factor} stages={stages:?}");
            factor *= 1.37;
        }
    }

    #[test]
    fn test_in_range_factor_single_stage() {
        assert_eq!(decompose_tempo(1.0), vec![1.0]);
        assert_eq!(decompose_tempo(2.0), vec![2.0]);
        assert_eq!(decompose_tempo(0.5), vec![0.5]);
    }

    #[test]
    fn test_non_finite_or_non_positive_tempo_has_no_stages() {
        assert!(decompose_tempo(f64::INFINITY).is_empty());
        assert!(decompose_tempo(f64::NAN).is_empty());
        assert!(decompose_tempo(0.0).is_empty());
        assert!(decompose_tempo(-2.0).is_empty());
    }

    #[test]
    fn test_invalid_fps() {
        assert_eq!(
            TimingPlan::new(0.0, 25.0).unwrap_err().code,
            ErrorCode::InvalidFps
        );
        assert_eq!(
            TimingPlan::new(30.0, -1.0).unwrap_err().code,
            ErrorCode::InvalidFps
        );
        assert!(TimingPlan::new(f64::NAN, 25.0).is_err());
        assert!(TimingPlan::new(f64::MIN_POSITIVE, 1.0e300).is_err());
    }

    #[test]
    fn test_scaled_duration() {
        let plan = TimingPlan::new(30.0, 25.0).unwrap();
        assert!((plan.scaled_duration(60.0) - 72.0).abs() < 1e-9);
    }
}
