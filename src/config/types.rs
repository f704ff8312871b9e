use crate::error::{ConvertError, ConvertResult, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const MAX_RECENT_PATHS: usize = 5;

/// 可處理的影片副檔名（小寫，不含前導點）
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm"];

pub const MAX_TARGET_FPS: f64 = 1000.0;
pub const MAX_AUDIO_BITRATE_KBPS: u32 = 512;
pub const MAX_CRF: u8 = 51;
pub const DEFAULT_CRF: u8 = 23;

#[must_use]
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
}

/// 硬體編碼器廠商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nvidia => write!(f, "NVIDIA (NVENC)"),
            Self::Amd => write!(f, "AMD (AMF)"),
            Self::Intel => write!(f, "Intel (QSV)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuSettings {
    pub enabled: bool,
    /// None 代表依序自動偵測
    pub vendor: Option<GpuVendor>,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            vendor: None,
        }
    }
}

/// 外部工具路徑，None 代表使用系統安裝的版本
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub target_fps: f64,
    pub keep_audio: bool,
    pub audio_bitrate_kbps: u32,
    pub use_custom_quality: bool,
    pub crf: u8,
    pub gpu: GpuSettings,
    pub cpu_limit: u8,
    pub tools: ToolPaths,
    pub output_folder: Option<PathBuf>,
    pub overwrite_existing: bool,
    pub recent_paths: Vec<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            target_fps: 30.0,
            keep_audio: true,
            audio_bitrate_kbps: 192,
            use_custom_quality: false,
            crf: DEFAULT_CRF,
            gpu: GpuSettings::default(),
            cpu_limit: 100,
            tools: ToolPaths::default(),
            output_folder: None,
            overwrite_existing: false,
            recent_paths: Vec::new(),
        }
    }
}

impl UserSettings {
    /// 以目前設定產生一次批次轉檔所需的不可變選項
    #[must_use]
    pub fn conversion_options(&self, target_fps: f64) -> ConversionOptions {
        ConversionOptions {
            target_fps,
            keep_audio: self.keep_audio,
            audio_bitrate_kbps: self.audio_bitrate_kbps,
            use_custom_quality: self.use_custom_quality,
            crf: self.crf,
            gpu: self.gpu,
            cpu_limit: self.cpu_limit,
            output_folder: self.output_folder.clone(),
            overwrite_existing: self.overwrite_existing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub settings: UserSettings,
}

/// 單次批次轉檔的選項，建立後不再變動
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    pub target_fps: f64,
    pub keep_audio: bool,
    pub audio_bitrate_kbps: u32,
    /// true 時使用固定 CRF，false 時嘗試依檔案大小計算目標位元率
    pub use_custom_quality: bool,
    pub crf: u8,
    pub gpu: GpuSettings,
    /// 1..=100，100 代表不限制
    pub cpu_limit: u8,
    pub output_folder: Option<PathBuf>,
    pub overwrite_existing: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        UserSettings::default().conversion_options(30.0)
    }
}

impl ConversionOptions {
    pub fn validate(&self) -> ConvertResult<()> {
        if !self.target_fps.is_finite() || self.target_fps <= 0.0 || self.target_fps > MAX_TARGET_FPS
        {
            return Err(ConvertError::new(
                ErrorCode::InvalidFps,
                format!(
                    "目標 FPS 必須介於 0 與 {MAX_TARGET_FPS} 之間，收到 {}",
                    self.target_fps
                ),
            ));
        }

        if self.keep_audio
            && (self.audio_bitrate_kbps == 0 || self.audio_bitrate_kbps > MAX_AUDIO_BITRATE_KBPS)
        {
            return Err(ConvertError::new(
                ErrorCode::AudioBitrateInvalid,
                format!(
                    "音訊位元率必須介於 1 與 {MAX_AUDIO_BITRATE_KBPS} kbps 之間，收到 {}",
                    self.audio_bitrate_kbps
                ),
            ));
        }

        if self.use_custom_quality && self.crf > MAX_CRF {
            return Err(ConvertError::new(
                ErrorCode::VideoQualityOutOfRange,
                format!("CRF 必須介於 0 與 {MAX_CRF} 之間，收到 {}", self.crf),
            ));
        }

        if self.cpu_limit == 0 || self.cpu_limit > 100 {
            return Err(ConvertError::new(
                ErrorCode::CpuLimitOutOfRange,
                format!("CPU 限制必須介於 1 與 100 之間，收到 {}", self.cpu_limit),
            ));
        }

        Ok(())
    }

    /// 固定畫質模式使用的 CRF，未自訂時為預設值
    #[must_use]
    pub fn fallback_crf(&self) -> u8 {
        if self.use_custom_quality {
            self.crf.min(MAX_CRF)
        } else {
            DEFAULT_CRF
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_file_case_insensitive() {
        assert!(is_video_file(Path::new("/a/clip.MP4")));
        assert!(is_video_file(Path::new("/a/clip.mkv")));
        assert!(!is_video_file(Path::new("/a/notes.txt")));
        assert!(!is_video_file(Path::new("/a/no_extension")));
    }

    #[test]
    fn test_default_options_are_valid() {
        assert!(ConversionOptions::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fps() {
        let mut options = ConversionOptions::default();
        options.target_fps = 0.0;
        assert_eq!(options.validate().unwrap_err().code, ErrorCode::InvalidFps);
        options.target_fps = 1200.0;
        assert_eq!(options.validate().unwrap_err().code, ErrorCode::InvalidFps);
        options.target_fps = f64::NAN;
        assert_eq!(options.validate().unwrap_err().code, ErrorCode::InvalidFps);
    }

    #[test]
    fn test_validate_audio_bitrate_only_when_audio_kept() {
        let mut options = ConversionOptions::default();
        options.audio_bitrate_kbps = 0;
        assert_eq!(
            options.validate().unwrap_err().code,
            ErrorCode::AudioBitrateInvalid
        );
        options.keep_audio = false;
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_crf_only_when_custom_quality() {
        let mut options = ConversionOptions::default();
        options.crf = 60;
        assert!(options.validate().is_ok());
        options.use_custom_quality = true;
        assert_eq!(
            options.validate().unwrap_err().code,
            ErrorCode::VideoQualityOutOfRange
        );
    }

    #[test]
    fn test_validate_cpu_limit() {
        let mut options = ConversionOptions::default();
        options.cpu_limit = 0;
        assert_eq!(
            options.validate().unwrap_err().code,
            ErrorCode::CpuLimitOutOfRange
        );
    }

    #[test]
    fn test_fallback_crf() {
        let mut options = ConversionOptions::default();
        options.crf = 30;
        assert_eq!(options.fallback_crf(), DEFAULT_CRF);
        options.use_custom_quality = true;
        assert_eq!(options.fallback_crf(), 30);
    }

    #[test]
    fn test_settings_deserialize_with_missing_fields() {
        let settings: UserSettings = serde_json::from_str(r#"{"target_fps": 24.0}"#).unwrap();
        assert!((settings.target_fps - 24.0).abs() < f64::EPSILON);
        assert_eq!(settings.crf, DEFAULT_CRF);
        assert!(settings.gpu.enabled);
    }
}
