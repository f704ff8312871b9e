//! 畫質策略：固定 CRF 或依檔案大小計算目標位元率

use crate::error::{ConvertError, ErrorCode};
use crate::tools::ProbeResult;
use log::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum QualityPlan {
    ConstantQuality { crf: u8 },
    TargetBitrate { kbps: u64, new_duration: f64 },
}

/// 畫質規劃結果；位元率模式無法使用時附帶說明
#[derive(Debug, Clone, PartialEq)]
pub struct QualityDecision {
    pub plan: QualityPlan,
    pub notice: Option<ConvertError>,
}

impl QualityDecision {
    const fn plain(plan: QualityPlan) -> Self {
        Self { plan, notice: None }
    }
}

/// 依檔案大小與轉換後長度計算目標位元率（kbps，至少為 1）
#[must_use]
pub fn target_bitrate_kbps(file_size_bytes: u64, new_duration: f64) -> u64 {
    let kbps = (file_size_bytes as f64 * 8.0) / new_duration / 1000.0;
    kbps.round().max(1.0) as u64
}

/// 決定畫質策略
///
/// 位元率模式的任何前提不成立時改回固定 CRF，不視為錯誤
#[must_use]
pub fn plan_quality(
    probe: &ProbeResult,
    target_fps: f64,
    bitrate_mode_requested: bool,
    fallback_crf: u8,
) -> QualityDecision {
    let fallback = QualityPlan::ConstantQuality { crf: fallback_crf };
    if !bitrate_mode_requested {
        return QualityDecision::plain(fallback);
    }

    match bitrate_preconditions(probe, target_fps) {
        Ok((size, new_duration)) => QualityDecision::plain(QualityPlan::TargetBitrate {
            kbps: target_bitrate_kbps(size, new_duration),
            new_duration,
        }),
        Err(notice) => {
            warn!("無法使用位元率模式，改用 CRF {fallback_crf}: {notice}");
            QualityDecision {
                plan: fallback,
                notice: Some(notice),
            }
        }
    }
}

fn bitrate_preconditions(probe: &ProbeResult, target_fps: f64) -> Result<(u64, f64), ConvertError> {
    let duration = probe
        .duration_secs
        .ok_or_else(|| ConvertError::code_only(ErrorCode::DurationNotDetected))?;

    let source_fps = probe.source_fps();
    if !(source_fps > 0.0 && target_fps > 0.0) {
        return Err(ConvertError::new(
            ErrorCode::InvalidFps,
            format!("src_fps={source_fps} target_fps={target_fps}"),
        ));
    }

    let size = match probe.file_size {
        Some(size) if size > 0 => size,
        other => {
            return Err(ConvertError::new(
                ErrorCode::EmptyInputFile,
                format!("size={other:?}"),
            ));
        }
    };

    let new_duration = duration * (source_fps / target_fps);
    if !new_duration.is_finite() || new_duration <= 0.0 {
        return Err(ConvertError::new(
            ErrorCode::InvalidNewDuration,
            format!("new_duration={new_duration}"),
        ));
    }

    Ok((size, new_duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FrameRate;

    fn probe(fps: u64, duration: Option<f64>, size: Option<u64>) -> ProbeResult {
        ProbeResult {
            frame_rate: FrameRate::new(fps, 1).unwrap(),
            duration_secs: duration,
            creation_time: None,
            modified_time: None,
            file_size: size,
        }
    }

    #[test]
    fn test_bitrate_scenario() {
        let decision = plan_quality(&probe(30, Some(60.0), Some(100_000_000)), 25.0, true, 23);
        match decision.plan {
            QualityPlan::TargetBitrate { kbps, new_duration } => {
                assert_eq!(kbps, 11111);
                assert!((new_duration - 72.0).abs() < 1e-9);
            }
            other => panic!("應該是位元率模式: {other:?}"),
        }
        assert!(decision.notice.is_none());
    }

    #[test]
    fn test_not_requested_uses_crf() {
        let decision = plan_quality(&probe(30, Some(60.0), Some(100)), 25.0, false, 18);
        assert_eq!(decision.plan, QualityPlan::ConstantQuality { crf: 18 });
        assert!(decision.notice.is_none());
    }

    #[test]
    fn test_missing_duration_degrades() {
        let decision = plan_quality(&probe(30, None, Some(100_000)), 25.0, true, 23);
        assert_eq!(decision.plan, QualityPlan::ConstantQuality { crf: 23 });
        assert_eq!(
            decision.notice.unwrap().code,
            ErrorCode::DurationNotDetected
        );
    }

    #[test]
    fn test_missing_or_empty_size_degrades() {
        for size in [None, Some(0)] {
            let decision = plan_quality(&probe(30, Some(60.0), size), 25.0, true, 23);
            assert_eq!(decision.plan, QualityPlan::ConstantQuality { crf: 23 });
            assert_eq!(decision.notice.unwrap().code, ErrorCode::EmptyInputFile);
        }
    }

    #[test]
    fn test_zero_duration_degrades() {
        let decision = plan_quality(&probe(30, Some(0.0), Some(1000)), 25.0, true, 23);
        assert_eq!(decision.plan, QualityPlan::ConstantQuality { crf: 23 });
        assert_eq!(
            decision.notice.unwrap().code,
            ErrorCode::InvalidNewDuration
        );
    }

    #[test]
    fn test_invalid_target_fps_degrades() {
        let decision = plan_quality(&probe(30, Some(10.0), Some(1000)), 0.0, true, 23);
        assert!(matches!(decision.plan, QualityPlan::ConstantQuality { .. }));
    }

    #[test]
    fn test_bitrate_monotonic() {
        let base = target_bitrate_kbps(50_000_000, 40.0);
        let double_size = target_bitrate_kbps(100_000_000, 40.0);
        let half_duration = target_bitrate_kbps(50_000_000, 20.0);

        assert!((double_size as i64 - 2 * base as i64).abs() <= 1);
        assert!((half_duration as i64 - 2 * base as i64).abs() <= 1);
    }

    #[test]
    fn test_bitrate_minimum_is_one() {
        assert_eq!(target_bitrate_kbps(1, 10_000.0), 1);
    }
}
