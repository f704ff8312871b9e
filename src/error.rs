//! 轉檔引擎錯誤型別
//!
//! 所有引擎層錯誤都帶有固定的錯誤代碼與可選的細節，可序列化為 `{code, details}`

use serde::Serialize;
use std::fmt;

pub type ConvertResult<T> = Result<T, ConvertError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    Cancelled,
    FolderNotFound,
    NoVideoFiles,
    Io,

    FfmpegNotFound,
    FfprobeNotFound,
    FfmpegSpawnFailed,
    ProbeFailed,
    FpsNotDetected,
    DurationNotDetected,
    TranscodeFailed,

    InvalidFps,
    InvalidNewDuration,
    EmptyInputFile,
    VideoQualityOutOfRange,
    AudioBitrateInvalid,
    CpuLimitOutOfRange,
    ReadMetadataFailed,
    PathTraversalDetected,
    InvalidInputPath,
    OutputExists,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "Cancelled",
            Self::FolderNotFound => "FolderNotFound",
            Self::NoVideoFiles => "NoVideoFiles",
            Self::Io => "Io",
            Self::FfmpegNotFound => "FfmpegNotFound",
            Self::FfprobeNotFound => "FfprobeNotFound",
            Self::FfmpegSpawnFailed => "FfmpegSpawnFailed",
            Self::ProbeFailed => "ProbeFailed",
            Self::FpsNotDetected => "FpsNotDetected",
            Self::DurationNotDetected => "DurationNotDetected",
            Self::TranscodeFailed => "TranscodeFailed",
            Self::InvalidFps => "InvalidFps",
            Self::InvalidNewDuration => "InvalidNewDuration",
            Self::EmptyInputFile => "EmptyInputFile",
            Self::VideoQualityOutOfRange => "VideoQualityOutOfRange",
            Self::AudioBitrateInvalid => "AudioBitrateInvalid",
            Self::CpuLimitOutOfRange => "CpuLimitOutOfRange",
            Self::ReadMetadataFailed => "ReadMetadataFailed",
            Self::PathTraversalDetected => "PathTraversalDetected",
            Self::InvalidInputPath => "InvalidInputPath",
            Self::OutputExists => "OutputExists",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 帶錯誤代碼的引擎錯誤
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{code}{}", detail_suffix(.details))]
pub struct ConvertError {
    pub code: ErrorCode,
    pub details: Option<String>,
}

fn detail_suffix(details: &Option<String>) -> String {
    details.as_ref().map(|d| format!(": {d}")).unwrap_or_default()
}

impl ConvertError {
    pub fn new(code: ErrorCode, details: impl Into<String>) -> Self {
        Self {
            code,
            details: Some(details.into()),
        }
    }

    #[must_use]
    pub const fn code_only(code: ErrorCode) -> Self {
        Self {
            code,
            details: None,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, e.to_string())
    }
}
