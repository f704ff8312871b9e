//! 編碼器選擇
//!
//! 依 NVIDIA、AMD、Intel 的順序檢查硬體編碼器，每個候選都必須同時
//! 出現在 `ffmpeg -encoders` 清單中並通過試編碼，否則退回 libx264。

use crate::config::{GpuSettings, GpuVendor};
use log::{debug, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderKind {
    Nvidia,
    Amd,
    Intel,
    Cpu,
}

impl EncoderKind {
    /// 自動偵測時的檢查順序
    pub const HARDWARE_PRIORITY: [Self; 3] = [Self::Nvidia, Self::Amd, Self::Intel];

    #[must_use]
    pub const fn from_vendor(vendor: GpuVendor) -> Self {
        match vendor {
            GpuVendor::Nvidia => Self::Nvidia,
            GpuVendor::Amd => Self::Amd,
            GpuVendor::Intel => Self::Intel,
        }
    }

    #[must_use]
    pub const fn codec(self) -> &'static str {
        match self {
            Self::Nvidia => "h264_nvenc",
            Self::Amd => "h264_amf",
            Self::Intel => "h264_qsv",
            Self::Cpu => "libx264",
        }
    }

    /// 固定畫質模式使用的參數名稱，AMD 需要分別指定 I/P/B 幀
    #[must_use]
    pub const fn quality_flags(self) -> &'static [&'static str] {
        match self {
            Self::Nvidia => &["-cq"],
            Self::Amd => &["-qp_i", "-qp_p", "-qp_b"],
            Self::Intel => &["-global_quality"],
            Self::Cpu => &["-crf"],
        }
    }

    #[must_use]
    pub const fn preset_flag(self) -> &'static str {
        match self {
            Self::Amd => "-quality",
            Self::Nvidia | Self::Intel | Self::Cpu => "-preset",
        }
    }

    #[must_use]
    pub const fn preset(self) -> &'static str {
        match self {
            Self::Nvidia => "p4",
            Self::Amd => "balanced",
            Self::Intel => "medium",
            Self::Cpu => "slow",
        }
    }

    #[must_use]
    pub const fn is_hardware(self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nvidia => write!(f, "NVIDIA NVENC"),
            Self::Amd => write!(f, "AMD AMF"),
            Self::Intel => write!(f, "Intel QSV"),
            Self::Cpu => write!(f, "CPU (libx264)"),
        }
    }
}

/// 一次批次使用的編碼器與其參數名稱
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderChoice {
    pub kind: EncoderKind,
    pub codec: &'static str,
    pub quality_flags: &'static [&'static str],
    pub preset_flag: &'static str,
    pub preset: &'static str,
}

impl From<EncoderKind> for EncoderChoice {
    fn from(kind: EncoderKind) -> Self {
        Self {
            kind,
            codec: kind.codec(),
            quality_flags: kind.quality_flags(),
            preset_flag: kind.preset_flag(),
            preset: kind.preset(),
        }
    }
}

impl EncoderChoice {
    #[must_use]
    pub fn software() -> Self {
        EncoderKind::Cpu.into()
    }
}

/// 查詢轉檔工具支援哪些編碼器
pub trait EncoderCapabilities {
    /// `-encoders` 的輸出，無法執行時為 None
    fn compiled_encoders(&self) -> Option<String>;
    /// 以極短的合成影片試編碼
    fn trial_encode(&self, codec: &str) -> bool;
}

/// 清單中是否有名稱完全相同的編碼器
#[must_use]
pub fn is_encoder_listed(listing: &str, codec: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(codec))
}

pub struct FfmpegCapabilities {
    ffmpeg_bin: PathBuf,
}

impl FfmpegCapabilities {
    #[must_use]
    pub const fn new(ffmpeg_bin: PathBuf) -> Self {
        Self { ffmpeg_bin }
    }
}

impl EncoderCapabilities for FfmpegCapabilities {
    fn compiled_encoders(&self) -> Option<String> {
        let output = Command::new(&self.ffmpeg_bin)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .ok()?;

        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn trial_encode(&self, codec: &str) -> bool {
        let status = Command::new(&self.ffmpeg_bin)
            .args([
                "-hide_banner",
                "-nostdin",
                "-loglevel",
                "error",
                "-f",
                "lavfi",
                "-i",
                "color=black:s=320x240:d=1",
                "-c:v",
                codec,
                "-f",
                "null",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        matches!(status, Ok(s) if s.success())
    }
}

/// 快取選擇結果，同一批次只檢查一次
pub struct EncoderSelector {
    capabilities: Box<dyn EncoderCapabilities + Send>,
    cached: Option<(GpuSettings, EncoderChoice)>,
}

impl EncoderSelector {
    #[must_use]
    pub fn new(capabilities: Box<dyn EncoderCapabilities + Send>) -> Self {
        Self {
            capabilities,
            cached: None,
        }
    }

    /// 丟棄快取，下次 `select` 會重新檢查
    pub fn reprobe(&mut self) {
        self.cached = None;
    }

    /// 取得編碼器，永遠至少回傳軟體編碼器
    pub fn select(&mut self, gpu: GpuSettings) -> EncoderChoice {
        if let Some((_, choice)) = self.cached.filter(|(settings, _)| *settings == gpu) {
            debug!("沿用已選擇的編碼器: {}", choice.kind);
            return choice;
        }

        let choice = self.probe(gpu);
        info!("使用編碼器: {} ({})", choice.kind, choice.codec);
        self.cached = Some((gpu, choice));
        choice
    }

    fn probe(&self, gpu: GpuSettings) -> EncoderChoice {
        if !gpu.enabled {
            return EncoderChoice::software();
        }

        let Some(listing) = self.capabilities.compiled_encoders() else {
            warn!("無法取得編碼器清單，改用 CPU 編碼");
            return EncoderChoice::software();
        };

        if let Some(vendor) = gpu.vendor {
            let kind = EncoderKind::from_vendor(vendor);
            if self.accepts(&listing, kind) {
                return kind.into();
            }
            warn!("指定的 {vendor} 編碼器無法使用，改用 CPU 編碼");
            return EncoderChoice::software();
        }

        EncoderKind::HARDWARE_PRIORITY
            .into_iter()
            .find(|kind| self.accepts(&listing, *kind))
            .map_or_else(EncoderChoice::software, EncoderChoice::from)
    }

    fn accepts(&self, listing: &str, kind: EncoderKind) -> bool {
        let codec = kind.codec();
        if !is_encoder_listed(listing, codec) {
            debug!("{codec} 未編譯進 ffmpeg");
            return false;
        }
        let ok = self.capabilities.trial_encode(codec);
        if !ok {
            debug!("{codec} 試編碼失敗");
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const LISTING: &str = "\
Encoders:
 V..... = Video
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10 (codec h264)
 V....D h264_amf             AMD AMF H.264 Encoder (codec h264)
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)
 V..... h264_qsv             H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10 (Intel Quick Sync Video acceleration) (codec h264)
";

    struct FakeCapabilities {
        listing: Option<String>,
        working: Vec<&'static str>,
        trials: Arc<Mutex<Vec<String>>>,
    }

    impl EncoderCapabilities for FakeCapabilities {
        fn compiled_encoders(&self) -> Option<String> {
            self.listing.clone()
        }

        fn trial_encode(&self, codec: &str) -> bool {
            self.trials.lock().unwrap().push(codec.to_string());
            self.working.contains(&codec)
        }
    }

    fn selector(
        listing: Option<&str>,
        working: Vec<&'static str>,
    ) -> (EncoderSelector, Arc<Mutex<Vec<String>>>) {
        let trials = Arc::new(Mutex::new(Vec::new()));
        let fake = FakeCapabilities {
            listing: listing.map(str::to_string),
            working,
            trials: Arc::clone(&trials),
        };
        (EncoderSelector::new(Box::new(fake)), trials)
    }

    fn auto() -> GpuSettings {
        GpuSettings {
            enabled: true,
            vendor: None,
        }
    }

    #[test]
    fn test_is_encoder_listed_exact_name() {
        assert!(is_encoder_listed(LISTING, "h264_nvenc"));
        assert!(!is_encoder_listed(LISTING, "h264"));
        assert!(!is_encoder_listed(LISTING, "hevc_nvenc"));
    }

    #[test]
    fn test_priority_prefers_nvidia() {
        let (mut selector, trials) = selector(Some(LISTING), vec!["h264_nvenc", "h264_qsv"]);
        assert_eq!(selector.select(auto()).kind, EncoderKind::Nvidia);
        assert_eq!(*trials.lock().unwrap(), vec!["h264_nvenc"]);
    }

    #[test]
    fn test_failed_trials_advance_to_next_candidate() {
        let (mut selector, trials) = selector(Some(LISTING), vec!["h264_qsv"]);
        let choice = selector.select(auto());
        assert_eq!(choice.kind, EncoderKind::Intel);
        assert_eq!(choice.quality_flags, &["-global_quality"]);
        assert_eq!(
            *trials.lock().unwrap(),
            vec!["h264_nvenc", "h264_amf", "h264_qsv"]
        );
    }

    #[test]
    fn test_all_hardware_fails_returns_software() {
        let (mut selector, _) = selector(Some(LISTING), vec![]);
        let choice = selector.select(auto());
        assert_eq!(choice, EncoderChoice::software());
        assert_eq!(choice.codec, "libx264");
        assert_eq!(choice.quality_flags, &["-crf"]);
    }

    #[test]
    fn test_missing_listing_returns_software() {
        let (mut selector, trials) = selector(None, vec!["h264_nvenc"]);
        assert_eq!(selector.select(auto()).kind, EncoderKind::Cpu);
        assert!(trials.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unlisted_encoder_is_not_trialed() {
        let listing = " V....D libx264              libx264 H.264\n";
        let (mut selector, trials) = selector(Some(listing), vec!["h264_nvenc"]);
        assert_eq!(selector.select(auto()).kind, EncoderKind::Cpu);
        assert!(trials.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_hardware_skips_probing() {
        let (mut selector, trials) = selector(Some(LISTING), vec!["h264_nvenc"]);
        let gpu = GpuSettings {
            enabled: false,
            vendor: Some(GpuVendor::Nvidia),
        };
        assert_eq!(selector.select(gpu).kind, EncoderKind::Cpu);
        assert!(trials.lock().unwrap().is_empty());
    }

    #[test]
    fn test_forced_vendor_failure_falls_back_without_further_probing() {
        let (mut selector, trials) = selector(Some(LISTING), vec!["h264_nvenc"]);
        let gpu = GpuSettings {
            enabled: true,
            vendor: Some(GpuVendor::Amd),
        };
        assert_eq!(selector.select(gpu).kind, EncoderKind::Cpu);
        assert_eq!(*trials.lock().unwrap(), vec!["h264_amf"]);
    }

    #[test]
    fn test_forced_vendor_success() {
        let (mut selector, _) = selector(Some(LISTING), vec!["h264_amf"]);
        let gpu = GpuSettings {
            enabled: true,
            vendor: Some(GpuVendor::Amd),
        };
        let choice = selector.select(gpu);
        assert_eq!(choice.kind, EncoderKind::Amd);
        assert_eq!(choice.preset_flag, "-quality");
        assert_eq!(choice.preset, "balanced");
    }

    #[test]
    fn test_selection_is_cached_until_reprobe() {
        let (mut selector, trials) = selector(Some(LISTING), vec!["h264_nvenc"]);
        selector.select(auto());
        selector.select(auto());
        assert_eq!(trials.lock().unwrap().len(), 1);

        selector.reprobe();
        selector.select(auto());
        assert_eq!(trials.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_vendor_flag_table() {
        assert_eq!(EncoderKind::Nvidia.quality_flags(), &["-cq"]);
        assert_eq!(EncoderKind::Amd.quality_flags(), &["-qp_i", "-qp_p", "-qp_b"]);
        assert_eq!(EncoderKind::Nvidia.preset(), "p4");
        assert_eq!(EncoderKind::Intel.preset(), "medium");
        assert!(!EncoderKind::Cpu.is_hardware());
    }
}
