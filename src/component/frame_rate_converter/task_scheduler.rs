//! 批次轉檔排程
//!
//! 依呼叫端給定的順序逐一轉檔，同一時間只會有一個 ffmpeg 在執行。
//! 取消信號為整個批次共用，觀察到之後尚未開始的檔案一律標記為已取消。

use super::encoder_selector::{EncoderCapabilities, EncoderChoice, EncoderSelector, FfmpegCapabilities};
use super::ffmpeg_command::default_output_folder;
use super::job_executor::{FfmpegTranscoder, JobExecutor, JobOutcome, JobState, Transcoder};
use crate::config::{ConversionOptions, ToolPaths, is_video_file};
use crate::error::{ConvertError, ConvertResult, ErrorCode};
use crate::tools::{
    CpuLimit, FFMPEG, FFPROBE, FfmpegProber, MediaProber, SourceFile, ensure_directory_exists,
    ensure_tool, resolve_bin, scan_video_files, validate_directory_exists, validate_safe_path,
};
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    Processing,
    Success,
    Error,
    Cancelled,
}

impl From<JobState> for ConversionStatus {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Succeeded => Self::Success,
            JobState::Failed => Self::Error,
            JobState::Cancelled => Self::Cancelled,
            JobState::Pending | JobState::Probing | JobState::Planning | JobState::Running => {
                Self::Processing
            }
        }
    }
}

/// 傳給介面層的進度事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub current_file: String,
    /// 從 1 開始
    pub current_file_index: usize,
    pub total_files: usize,
    pub percentage: f32,
    pub status: ConversionStatus,
}

#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub input_folder: PathBuf,
    /// None 時掃描資料夾內所有影片
    pub files: Option<Vec<PathBuf>>,
}

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub output_folder: PathBuf,
    pub encoder: EncoderChoice,
    pub outcomes: Vec<JobOutcome>,
}

impl BatchSummary {
    /// 全部檔案都成功才算成功
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(JobOutcome::is_success)
    }

    #[must_use]
    pub fn count(&self, state: JobState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }
}

/// 已確認可執行的外部工具
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: Option<PathBuf>,
}

impl Toolchain {
    /// ffmpeg 為必要工具；找不到 ffprobe 時只記錄警告，建立時間改用檔案修改時間
    pub fn resolve(paths: &ToolPaths) -> ConvertResult<Self> {
        let ffmpeg = resolve_bin(paths.ffmpeg.as_deref(), FFMPEG);
        ensure_tool(&ffmpeg, ErrorCode::FfmpegNotFound)?;

        let ffprobe = resolve_bin(paths.ffprobe.as_deref(), FFPROBE);
        let ffprobe = match ensure_tool(&ffprobe, ErrorCode::FfprobeNotFound) {
            Ok(_) => Some(ffprobe),
            Err(e) => {
                warn!("{e}，將以檔案修改時間作為建立時間");
                None
            }
        };

        Ok(Self { ffmpeg, ffprobe })
    }
}

pub struct TaskScheduler {
    ffmpeg_bin: PathBuf,
    prober: Box<dyn MediaProber + Send>,
    transcoder: Box<dyn Transcoder + Send>,
    selector: EncoderSelector,
    cancel: Arc<AtomicBool>,
}

impl TaskScheduler {
    #[must_use]
    pub fn new(toolchain: Toolchain, cancel: Arc<AtomicBool>) -> Self {
        let prober = FfmpegProber::new(toolchain.ffmpeg.clone(), toolchain.ffprobe);
        let capabilities = FfmpegCapabilities::new(toolchain.ffmpeg.clone());
        Self::with_backends(
            toolchain.ffmpeg,
            Box::new(prober),
            Box::new(FfmpegTranscoder),
            Box::new(capabilities),
            cancel,
        )
    }

    #[must_use]
    pub fn with_backends(
        ffmpeg_bin: PathBuf,
        prober: Box<dyn MediaProber + Send>,
        transcoder: Box<dyn Transcoder + Send>,
        capabilities: Box<dyn EncoderCapabilities + Send>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            ffmpeg_bin,
            prober,
            transcoder,
            selector: EncoderSelector::new(capabilities),
            cancel,
        }
    }

    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// 下一次批次重新檢查硬體編碼器
    pub fn reprobe_encoders(&mut self) {
        self.selector.reprobe();
    }

    /// 執行一次批次
    ///
    /// 只有設定錯誤、資料夾不存在、沒有影片時回傳 Err，
    /// 個別檔案的失敗（包含指定清單中無效的路徑）記錄在 [`BatchSummary::outcomes`]
    pub fn run(
        &mut self,
        request: &BatchRequest,
        options: &ConversionOptions,
        on_event: &mut dyn FnMut(&ProgressEvent),
    ) -> ConvertResult<BatchSummary> {
        options.validate()?;
        validate_directory_exists(&request.input_folder)?;

        let entries = collect_entries(request)?;
        if entries.is_empty() {
            return Err(ConvertError::new(
                ErrorCode::NoVideoFiles,
                request.input_folder.display().to_string(),
            ));
        }

        let output_folder = options
            .output_folder
            .clone()
            .unwrap_or_else(|| default_output_folder(&request.input_folder, options.target_fps));
        ensure_directory_exists(&output_folder)?;

        let encoder = self.selector.select(options.gpu);
        let cpu_limit = CpuLimit::new(options.cpu_limit);
        if let Some(threads) = cpu_limit.threads() {
            info!("CPU 限制 {}%，ffmpeg 使用 {threads} 個執行緒", options.cpu_limit);
        }

        info!(
            "開始轉檔，共 {} 個檔案，目標 {} fps，輸出至 {}",
            entries.len(),
            options.target_fps,
            output_folder.display()
        );

        let executor = JobExecutor {
            prober: &*self.prober,
            transcoder: &*self.transcoder,
            ffmpeg_bin: &self.ffmpeg_bin,
            options,
            encoder,
            output_dir: &output_folder,
            cpu_limit,
        };

        let total_files = entries.len();
        let mut outcomes = Vec::with_capacity(total_files);

        for (index, entry) in entries.into_iter().enumerate() {
            let name = entry.name().to_string();
            let event = |percentage: f32, status: ConversionStatus| ProgressEvent {
                current_file: name.clone(),
                current_file_index: index + 1,
                total_files,
                percentage,
                status,
            };

            let source = match entry {
                BatchEntry::Ready(source) => source,
                BatchEntry::Rejected(outcome) => {
                    on_event(&event(0.0, ConversionStatus::Error));
                    outcomes.push(outcome);
                    continue;
                }
            };

            if self.cancel.load(Ordering::SeqCst) {
                on_event(&event(0.0, ConversionStatus::Cancelled));
                outcomes.push(JobOutcome::cancelled(&source));
                continue;
            }

            on_event(&event(0.0, ConversionStatus::Processing));
            let mut last_percent = 0.0_f32;
            let outcome = executor.execute(&source, &self.cancel, &mut |percent| {
                last_percent = percent;
                on_event(&event(percent, ConversionStatus::Processing));
            });
            on_event(&event(last_percent, outcome.state.into()));

            outcomes.push(outcome);
        }

        let summary = BatchSummary {
            output_folder,
            encoder,
            outcomes,
        };
        info!(
            "批次結束 - 成功: {}, 失敗: {}, 取消: {}",
            summary.count(JobState::Succeeded),
            summary.count(JobState::Failed),
            summary.count(JobState::Cancelled)
        );
        Ok(summary)
    }
}

/// 批次中的一個項目；指定清單中無效的檔案直接記為失敗，不影響其他檔案
enum BatchEntry {
    Ready(SourceFile),
    Rejected(JobOutcome),
}

impl BatchEntry {
    fn name(&self) -> &str {
        match self {
            Self::Ready(source) => &source.name,
            Self::Rejected(outcome) => &outcome.name,
        }
    }
}

fn collect_entries(request: &BatchRequest) -> ConvertResult<Vec<BatchEntry>> {
    let Some(files) = &request.files else {
        let sources = scan_video_files(&request.input_folder)?;
        return Ok(sources.into_iter().map(BatchEntry::Ready).collect());
    };

    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let path = if file.is_absolute() {
            file.clone()
        } else {
            request.input_folder.join(file)
        };
        let path = match validate_safe_path(&path, &request.input_folder) {
            Ok(path) => path,
            Err(e) => {
                warn!("排除檔案 {}: {e}", path.display());
                entries.push(BatchEntry::Rejected(JobOutcome::rejected(&path, e)));
                continue;
            }
        };
        if !is_video_file(&path) {
            warn!("略過非影片檔案: {}", path.display());
            continue;
        }
        match SourceFile::from_path(&path) {
            Ok(source) => entries.push(BatchEntry::Ready(source)),
            Err(e) => {
                warn!("排除檔案 {}: {e}", path.display());
                entries.push(BatchEntry::Rejected(JobOutcome::rejected(&path, e)));
            }
        }
    }
    Ok(entries)
}

/// 以檔名列出結果，供介面顯示
#[must_use]
pub fn describe_outcome(outcome: &JobOutcome) -> String {
    match (&outcome.state, &outcome.error) {
        (JobState::Succeeded, _) => outcome
            .output_path
            .as_deref()
            .and_then(Path::file_name)
            .map_or_else(String::new, |n| n.to_string_lossy().to_string()),
        (_, Some(error)) => error.to_string(),
        _ => String::new(),
    }
}
