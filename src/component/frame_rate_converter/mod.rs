//! 影格率轉換元件
//!
//! 以縮放時間戳的方式改變影片 FPS，不丟棄也不複製影格，
//! 音訊以 atempo 濾鏡調整速度以維持同步，實際編碼交給 ffmpeg。

pub mod encoder_selector;
pub mod ffmpeg_command;
pub mod job_executor;
mod main;
pub mod progress;
pub mod quality;
pub mod task_scheduler;
pub mod timing;

pub use encoder_selector::{
    EncoderCapabilities, EncoderChoice, EncoderKind, EncoderSelector, FfmpegCapabilities,
};
pub use ffmpeg_command::{FfmpegCommand, default_output_folder, format_fps, output_file_name};
pub use job_executor::{
    FfmpegTranscoder, JobExecutor, JobOutcome, JobState, TranscodeExit, TranscodeRequest,
    Transcoder, drive_process,
};
pub use main::FrameRateConverter;
pub use progress::ProgressTracker;
pub use quality::{QualityDecision, QualityPlan, plan_quality, target_bitrate_kbps};
pub use task_scheduler::{
    BatchRequest, BatchSummary, ConversionStatus, ProgressEvent, TaskScheduler, Toolchain,
};
pub use timing::{TimingPlan, decompose_tempo};
