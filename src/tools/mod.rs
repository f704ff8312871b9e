pub mod bins;
mod cpu_limit;
pub mod media_prober;
mod path_validator;
pub mod timestamps;
mod video_scanner;

pub use bins::{FFMPEG, FFPROBE, ensure_tool, resolve_bin, tool_version};
pub use cpu_limit::CpuLimit;
pub use media_prober::{
    ContainerFacts, FfmpegProber, FrameRate, MediaProber, ProbeResult, parse_duration,
    parse_stream_fps,
};
pub use path_validator::{ensure_directory_exists, validate_directory_exists, validate_safe_path};
pub use timestamps::{format_utc_millis, parse_creation_time, restore_file_times};
pub use video_scanner::{SourceFile, display_name, scan_video_files};
