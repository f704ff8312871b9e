//! 影片探測
//!
//! 從 ffmpeg 的診斷輸出擷取幀率與時長，並以 ffprobe 查詢容器建立時間。
//! 解析策略集中在此模組，其他元件只依賴 [`MediaProber`]。

use crate::error::{ConvertError, ConvertResult, ErrorCode};
use crate::tools::timestamps::format_utc_millis;
use log::{debug, warn};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::time::SystemTime;

static REGEX_VIDEO_STREAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^.*Stream #.*Video:.*$").expect("Invalid regex"));

static REGEX_FPS_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*fps\b").expect("Invalid regex"));

static REGEX_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("Invalid regex")
});

/// 有理數幀率，例如 24000/1001
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    num: u64,
    den: u64,
}

impl FrameRate {
    #[must_use]
    pub fn new(num: u64, den: u64) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        let divisor = gcd(num, den);
        Some(Self {
            num: num / divisor,
            den: den / divisor,
        })
    }

    /// 由十進位數值建立，ffmpeg 印出的 23.98、29.97 等會還原為 k*1000/1001
    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value <= 0.0 {
            return None;
        }

        let k = (value * 1.001).round();
        if k >= 1.0 && (value - k / 1.001).abs() < 0.006 && (value - k).abs() > 0.006 {
            return Self::new(k as u64 * 1000, 1001);
        }

        let millis = (value * 1000.0).round();
        if millis < 1.0 {
            return None;
        }
        Self::new(millis as u64, 1000)
    }

    /// 解析 "30/1"、"30000/1001" 或 "29.97"
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some((num_str, den_str)) = raw.split_once('/') {
            let num_str = num_str.trim();
            let den_str = den_str.trim();
            if let (Ok(num), Ok(den)) = (num_str.parse::<u64>(), den_str.parse::<u64>()) {
                return Self::new(num, den);
            }
            let num: f64 = num_str.parse().ok()?;
            let den: f64 = den_str.parse().ok()?;
            if den > 0.0 {
                return Self::from_f64(num / den);
            }
            return None;
        }
        Self::from_f64(raw.parse().ok()?)
    }

    #[must_use]
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    #[must_use]
    pub const fn num(&self) -> u64 {
        self.num
    }

    #[must_use]
    pub const fn den(&self) -> u64 {
        self.den
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// 一個檔案的探測結果，建立後不再變動
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub frame_rate: FrameRate,
    /// 找不到 `Duration:` 時為 None
    pub duration_secs: Option<f64>,
    /// 容器 creation_time 標籤
    pub creation_time: Option<String>,
    pub modified_time: Option<SystemTime>,
    pub file_size: Option<u64>,
}

impl ProbeResult {
    #[must_use]
    pub fn source_fps(&self) -> f64 {
        self.frame_rate.as_f64()
    }

    /// 容器標籤優先，否則使用檔案修改時間
    #[must_use]
    pub fn resolved_creation_time(&self) -> Option<String> {
        self.creation_time
            .clone()
            .or_else(|| self.modified_time.map(format_utc_millis))
    }
}

pub trait MediaProber {
    fn probe(&self, path: &Path) -> ConvertResult<ProbeResult>;
}

/// 在 ffmpeg 診斷輸出中找第一條視訊串流並取出 fps
pub fn parse_stream_fps(diagnostics: &str) -> ConvertResult<FrameRate> {
    let stream_line = REGEX_VIDEO_STREAM
        .find(diagnostics)
        .ok_or_else(|| ConvertError::new(ErrorCode::FpsNotDetected, "找不到視訊串流"))?
        .as_str();

    REGEX_FPS_TOKEN
        .captures(stream_line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .and_then(FrameRate::from_f64)
        .ok_or_else(|| {
            ConvertError::new(
                ErrorCode::FpsNotDetected,
                format!("視訊串流中沒有 fps: {}", stream_line.trim()),
            )
        })
}

/// 解析頂層 `Duration: H:MM:SS.xx` 為秒數
pub fn parse_duration(diagnostics: &str) -> ConvertResult<f64> {
    let caps = REGEX_DURATION
        .captures(diagnostics)
        .ok_or_else(|| ConvertError::code_only(ErrorCode::DurationNotDetected))?;

    let field = |i: usize| -> f64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };

    Ok(field(1) * 3600.0 + field(2) * 60.0 + field(3))
}

#[derive(Deserialize)]
struct FfprobeOutput {
    streams: Option<Vec<StreamInfo>>,
    format: Option<FormatInfo>,
}

#[derive(Deserialize)]
struct StreamInfo {
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

#[derive(Deserialize)]
struct FormatInfo {
    duration: Option<String>,
    tags: Option<FormatTags>,
}

#[derive(Deserialize)]
struct FormatTags {
    creation_time: Option<String>,
}

/// ffprobe 的結構化查詢結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerFacts {
    pub frame_rate: Option<FrameRate>,
    pub duration_secs: Option<f64>,
    pub creation_time: Option<String>,
}

pub fn parse_ffprobe_json(json: &str) -> ConvertResult<ContainerFacts> {
    let probe: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| ConvertError::new(ErrorCode::ProbeFailed, format!("無法解析 ffprobe 輸出: {e}")))?;

    let frame_rate = probe
        .streams
        .as_ref()
        .and_then(|streams| streams.first())
        .and_then(|s| {
            s.avg_frame_rate
                .as_deref()
                .and_then(FrameRate::parse)
                .or_else(|| s.r_frame_rate.as_deref().and_then(FrameRate::parse))
        });

    let (duration, tags) = probe
        .format
        .map_or((None, None), |f| (f.duration, f.tags));

    // 無法取得時 ffprobe 會輸出 "N/A"
    let duration_secs = duration
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    let creation_time = tags
        .and_then(|t| t.creation_time)
        .filter(|t| !t.trim().is_empty());

    Ok(ContainerFacts {
        frame_rate,
        duration_secs,
        creation_time,
    })
}

/// 使用 ffmpeg / ffprobe 執行檔的探測器
pub struct FfmpegProber {
    ffmpeg_bin: PathBuf,
    ffprobe_bin: Option<PathBuf>,
}

impl FfmpegProber {
    #[must_use]
    pub const fn new(ffmpeg_bin: PathBuf, ffprobe_bin: Option<PathBuf>) -> Self {
        Self {
            ffmpeg_bin,
            ffprobe_bin,
        }
    }

    fn read_diagnostics(&self, path: &Path) -> ConvertResult<String> {
        // 沒有指定輸出時 ffmpeg 會以非零碼結束，只需要 stderr
        let output = Command::new(&self.ffmpeg_bin)
            .args(["-hide_banner", "-nostdin", "-i"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                ConvertError::new(
                    ErrorCode::FfmpegSpawnFailed,
                    format!("無法執行 {}: {e}", self.ffmpeg_bin.display()),
                )
            })?;

        Ok(String::from_utf8_lossy(&output.stderr).to_string())
    }

    fn query_container(&self, ffprobe_bin: &Path, path: &Path) -> ConvertResult<ContainerFacts> {
        let output = Command::new(ffprobe_bin)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=avg_frame_rate,r_frame_rate:format=duration:format_tags=creation_time",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ConvertError::new(ErrorCode::ProbeFailed, format!("無法執行 ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(ConvertError::new(
                ErrorCode::ProbeFailed,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))
    }
}

impl MediaProber for FfmpegProber {
    fn probe(&self, path: &Path) -> ConvertResult<ProbeResult> {
        let metadata = fs::metadata(path).map_err(|e| {
            ConvertError::new(
                ErrorCode::ReadMetadataFailed,
                format!("{}: {e}", path.display()),
            )
        })?;

        let diagnostics = self.read_diagnostics(path)?;
        let mut frame_rate = parse_stream_fps(&diagnostics)?;

        let banner_duration = parse_duration(&diagnostics).ok();

        let facts = match &self.ffprobe_bin {
            Some(bin) => self.query_container(bin, path).unwrap_or_else(|e| {
                warn!("ffprobe 查詢失敗 {}: {e}", path.display());
                ContainerFacts::default()
            }),
            None => ContainerFacts::default(),
        };

        if let Some(precise) = facts.frame_rate {
            debug!(
                "以 ffprobe 幀率 {}/{} 取代文字解析的 {:.3}",
                precise.num(),
                precise.den(),
                frame_rate.as_f64()
            );
            frame_rate = precise;
        }

        let duration_secs = banner_duration.or(facts.duration_secs);
        if duration_secs.is_none() {
            warn!(
                "無法取得影片長度 {}: {}",
                path.display(),
                ErrorCode::DurationNotDetected
            );
        }

        Ok(ProbeResult {
            frame_rate,
            duration_secs,
            creation_time: facts.creation_time,
            modified_time: metadata.modified().ok(),
            file_size: Some(metadata.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mp4':
  Metadata:
    major_brand     : isom
    creation_time   : 2023-11-14T22:13:20.000000Z
  Duration: 00:01:02.50, start: 0.000000, bitrate: 4997 kb/s
  Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p(progressive), 1920x1080 [SAR 1:1 DAR 16:9], 4801 kb/s, 29.97 fps, 29.97 tbr, 30k tbn (default)
  Stream #0:1[0x2](und): Audio: aac (LC) (mp4a / 0x6134706D), 48000 Hz, stereo, fltp, 192 kb/s (default)
At least one output file must be specified
";

    #[test]
    fn test_parse_frame_rate_fraction() {
        assert!((FrameRate::parse("30/1").unwrap().as_f64() - 30.0).abs() < 0.01);
        assert!((FrameRate::parse("30000/1001").unwrap().as_f64() - 29.97).abs() < 0.01);
        assert!((FrameRate::parse("24/1").unwrap().as_f64() - 24.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_frame_rate_decimal() {
        assert!((FrameRate::parse("29.97").unwrap().as_f64() - 29.97).abs() < 0.01);
        assert!((FrameRate::parse("60").unwrap().as_f64() - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_frame_rate_invalid() {
        assert!(FrameRate::parse("invalid").is_none());
        assert!(FrameRate::parse("30/0").is_none());
        assert!(FrameRate::parse("0/0").is_none());
    }

    #[test]
    fn test_decimal_ntsc_rate_snaps_to_rational() {
        assert_eq!(FrameRate::from_f64(23.98), FrameRate::new(24000, 1001));
        assert_eq!(FrameRate::from_f64(29.97), FrameRate::new(30000, 1001));
        assert_eq!(FrameRate::from_f64(59.94), FrameRate::new(60000, 1001));
    }

    #[test]
    fn test_integer_and_fractional_rates_do_not_snap() {
        assert_eq!(FrameRate::from_f64(25.0), FrameRate::new(25, 1));
        assert_eq!(FrameRate::from_f64(12.5), FrameRate::new(25, 2));
    }

    #[test]
    fn test_parse_stream_fps() {
        let fps = parse_stream_fps(SAMPLE).unwrap();
        assert_eq!(fps, FrameRate::new(30000, 1001).unwrap());
    }

    #[test]
    fn test_parse_stream_fps_without_video_stream() {
        let text = "  Duration: 00:00:10.00\n  Stream #0:0: Audio: aac, 48000 Hz\n";
        let err = parse_stream_fps(text).unwrap_err();
        assert_eq!(err.code, ErrorCode::FpsNotDetected);
    }

    #[test]
    fn test_parse_stream_fps_without_fps_token() {
        let text = "  Stream #0:0: Video: mjpeg, yuvj420p, 640x480, 90k tbr, 90k tbn\n";
        let err = parse_stream_fps(text).unwrap_err();
        assert_eq!(err.code, ErrorCode::FpsNotDetected);
    }

    #[test]
    fn test_parse_duration() {
        let secs = parse_duration(SAMPLE).unwrap();
        assert!((secs - 62.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_duration_is_anchored() {
        // 行中的 Duration: 不是頂層標頭
        let text = "    title : Total Duration: 01:00:00.00\n  Duration: N/A, bitrate: N/A\n";
        let err = parse_duration(text).unwrap_err();
        assert_eq!(err.code, ErrorCode::DurationNotDetected);
    }

    #[test]
    fn test_parse_duration_is_case_sensitive() {
        assert!(parse_duration("  duration: 00:00:10.00\n").is_err());
    }

    #[test]
    fn test_parse_ffprobe_json() {
        let json = r#"{
            "streams": [{"avg_frame_rate": "24000/1001", "r_frame_rate": "24000/1001"}],
            "format": {"tags": {"creation_time": "2023-11-14T22:13:20.000000Z"}}
        }"#;
        let facts = parse_ffprobe_json(json).unwrap();
        assert_eq!(facts.frame_rate, FrameRate::new(24000, 1001));
        assert_eq!(
            facts.creation_time.as_deref(),
            Some("2023-11-14T22:13:20.000000Z")
        );
    }

    #[test]
    fn test_parse_ffprobe_json_falls_back_to_r_frame_rate() {
        let json = r#"{"streams": [{"avg_frame_rate": "0/0", "r_frame_rate": "25/1"}], "format": {}}"#;
        let facts = parse_ffprobe_json(json).unwrap();
        assert_eq!(facts.frame_rate, FrameRate::new(25, 1));
        assert!(facts.duration_secs.is_none());
        assert!(facts.creation_time.is_none());
    }

    #[test]
    fn test_parse_ffprobe_json_duration() {
        let json = r#"{"streams": [], "format": {"duration": "62.500000"}}"#;
        let facts = parse_ffprobe_json(json).unwrap();
        assert_eq!(facts.duration_secs, Some(62.5));

        let json = r#"{"format": {"duration": "N/A"}}"#;
        assert!(parse_ffprobe_json(json).unwrap().duration_secs.is_none());
    }

    #[test]
    fn test_resolved_creation_time_prefers_tag() {
        let mut result = ProbeResult {
            frame_rate: FrameRate::new(30, 1).unwrap(),
            duration_secs: Some(10.0),
            creation_time: Some("2020-01-01T00:00:00Z".to_string()),
            modified_time: Some(std::time::UNIX_EPOCH),
            file_size: Some(1),
        };
        assert_eq!(
            result.resolved_creation_time().as_deref(),
            Some("2020-01-01T00:00:00Z")
        );

        result.creation_time = None;
        assert_eq!(
            result.resolved_creation_time().as_deref(),
            Some("1970-01-01T00:00:00.000Z")
        );
    }
}
