pub mod load;
pub mod save;
pub mod types;

pub use types::{
    Config, ConversionOptions, DEFAULT_CRF, GpuSettings, GpuVendor, MAX_AUDIO_BITRATE_KBPS,
    MAX_CRF, MAX_RECENT_PATHS, MAX_TARGET_FPS, ToolPaths, UserSettings, VIDEO_EXTENSIONS,
    is_video_file,
};
