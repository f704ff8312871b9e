//! 解析 `-progress pipe:1` 的 key=value 輸出

/// 執行中回報的上限，完成時才會回報 100
pub const RUNNING_PERCENT_CAP: f32 = 99.9;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressTracker {
    /// 轉換後的長度（秒）
    total_secs: Option<f64>,
    expected_frames: Option<f64>,
    frames: Option<u64>,
    out_time_secs: Option<f64>,
    last_reported: Option<f32>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(total_secs: Option<f64>, expected_frames: Option<f64>) -> Self {
        Self {
            total_secs: total_secs.filter(|t| t.is_finite() && *t > 0.0),
            expected_frames: expected_frames.filter(|f| f.is_finite() && *f >= 1.0),
            frames: None,
            out_time_secs: None,
            last_reported: None,
        }
    }

    /// 讀入一行輸出，百分比上升時回傳新的數值
    pub fn feed_line(&mut self, line: &str) -> Option<f32> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key.trim() {
            "frame" => self.frames = value.parse().ok().or(self.frames),
            "out_time_us" | "out_time_ms" => {
                // ffmpeg 的 out_time_ms 實際單位也是微秒
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_secs = Some(us.max(0) as f64 / 1_000_000.0);
                }
            }
            "out_time" => {
                if let Some(secs) = parse_progress_time(value) {
                    self.out_time_secs = Some(secs);
                }
            }
            _ => return None,
        }

        let percent = self.percentage()?;
        if self.last_reported.is_some_and(|last| percent <= last) {
            return None;
        }
        self.last_reported = Some(percent);
        Some(percent)
    }

    /// 以影格數與輸出時間中較保守的一方估算，執行中不超過 99.9
    #[must_use]
    pub fn percentage(&self) -> Option<f32> {
        let by_frames = self
            .expected_frames
            .zip(self.frames)
            .map(|(expected, done)| done as f64 / expected);
        let by_time = self
            .total_secs
            .zip(self.out_time_secs)
            .map(|(total, done)| done / total);

        let fraction = match (by_frames, by_time) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => return None,
        };

        let percent = (fraction.clamp(0.0, 1.0) * 100.0) as f32;
        Some(percent.min(RUNNING_PERCENT_CAP))
    }
}

/// 解析 `HH:MM:SS.micro` 為秒數
#[must_use]
pub fn parse_progress_time(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.starts_with('-') {
        return None;
    }
    let mut parts = raw.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_time() {
        assert_eq!(parse_progress_time("00:01:02.500000"), Some(62.5));
        assert_eq!(parse_progress_time("01:00:00"), Some(3600.0));
        assert!(parse_progress_time("N/A").is_none());
        assert!(parse_progress_time("-00:00:01.0").is_none());
    }

    #[test]
    fn test_out_time_is_microseconds() {
        let mut tracker = ProgressTracker::new(Some(10.0), None);
        assert_eq!(tracker.feed_line("out_time_ms=5000000"), Some(50.0));

        let mut tracker = ProgressTracker::new(Some(10.0), None);
        assert_eq!(tracker.feed_line("out_time_us=2500000"), Some(25.0));
    }

    #[test]
    fn test_uses_smaller_of_frame_and_time_fraction() {
        let mut tracker = ProgressTracker::new(Some(100.0), Some(1000.0));
        tracker.feed_line("frame=800");
        let percent = tracker.feed_line("out_time=00:00:20.000000").unwrap();
        assert!((percent - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_reports_only_increasing_values() {
        let mut tracker = ProgressTracker::new(Some(10.0), None);
        assert_eq!(tracker.feed_line("out_time_us=3000000"), Some(30.0));
        assert_eq!(tracker.feed_line("out_time_us=3000000"), None);
        assert_eq!(tracker.feed_line("out_time_us=1000000"), None);
        assert_eq!(tracker.feed_line("out_time_us=4000000"), Some(40.0));
    }

    #[test]
    fn test_running_progress_is_capped() {
        let mut tracker = ProgressTracker::new(Some(10.0), None);
        assert_eq!(
            tracker.feed_line("out_time_us=20000000"),
            Some(RUNNING_PERCENT_CAP)
        );
    }

    #[test]
    fn test_unknown_totals_report_nothing() {
        let mut tracker = ProgressTracker::new(None, None);
        assert_eq!(tracker.feed_line("out_time_us=1000000"), None);
        assert_eq!(tracker.feed_line("frame=10"), None);
    }

    #[test]
    fn test_ignores_non_progress_keys() {
        let mut tracker = ProgressTracker::new(Some(10.0), None);
        assert_eq!(tracker.feed_line("speed=1.5x"), None);
        assert_eq!(tracker.feed_line("out_time_us=N/A"), None);
        assert_eq!(tracker.feed_line("garbage"), None);
        assert_eq!(tracker.feed_line("progress=end"), None);
    }
}
