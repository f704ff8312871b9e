use super::encoder_selector::EncoderChoice;
use super::quality::QualityPlan;
use super::timing::TimingPlan;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// 以能還原同一數值的最短十進位表示 fps
///
/// `-r`、輸出檔名與資料夾名稱都使用這個字串，不同的目標值不會得到相同名稱
#[must_use]
pub fn format_fps(fps: f64) -> String {
    format!("{fps}")
}

/// `<原檔名>_<fps>fps.<原副檔名>`
#[must_use]
pub fn output_file_name(source: &Path, target_fps: f64) -> String {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let fps = format_fps(target_fps);

    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{fps}fps.{ext}"),
        None => format!("{stem}_{fps}fps"),
    }
}

#[must_use]
pub fn default_output_folder(input_folder: &Path, target_fps: f64) -> PathBuf {
    input_folder.join(format!("converted_videos_{}fps", format_fps(target_fps)))
}

/// 組合單一檔案的 ffmpeg 參數
pub struct FfmpegCommand<'a> {
    pub source: &'a Path,
    pub destination: &'a Path,
    pub target_fps: f64,
    pub timing: &'a TimingPlan,
    pub quality: &'a QualityPlan,
    pub encoder: &'a EncoderChoice,
    /// 保留音訊時的位元率，None 代表移除音訊
    pub audio_bitrate_kbps: Option<u32>,
    pub threads: Option<usize>,
    pub creation_time: Option<&'a str>,
    pub overwrite: bool,
}

impl FfmpegCommand<'_> {
    #[must_use]
    pub fn build_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        let mut push = |items: &[&str]| args.extend(items.iter().map(OsString::from));

        push(&[if self.overwrite { "-y" } else { "-n" }]);
        push(&["-hide_banner", "-nostdin", "-i"]);
        args.push(self.source.as_os_str().to_owned());

        let mut rest = vec![
            "-vf".to_string(),
            self.timing.setpts_filter(),
            "-r".to_string(),
            format_fps(self.target_fps),
        ];
        rest.extend(self.video_args());
        rest.extend(self.audio_args());

        if let Some(threads) = self.threads {
            rest.extend(["-threads".to_string(), threads.to_string()]);
        }
        if let Some(time) = self.creation_time {
            rest.extend(["-metadata".to_string(), format!("creation_time={time}")]);
        }
        rest.extend(
            ["-progress", "pipe:1", "-nostats", "-loglevel", "error"]
                .into_iter()
                .map(str::to_string),
        );

        args.extend(rest.into_iter().map(OsString::from));
        args.push(self.destination.as_os_str().to_owned());
        args
    }

    fn video_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.encoder.codec.to_string()];

        match self.quality {
            QualityPlan::ConstantQuality { crf } => {
                for flag in self.encoder.quality_flags {
                    args.extend([(*flag).to_string(), crf.to_string()]);
                }
            }
            QualityPlan::TargetBitrate { kbps, .. } => {
                args.extend(["-b:v".to_string(), format!("{kbps}k")]);
            }
        }

        args.extend([
            self.encoder.preset_flag.to_string(),
            self.encoder.preset.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ]);
        args
    }

    fn audio_args(&self) -> Vec<String> {
        match self.audio_bitrate_kbps {
            Some(kbps) => vec![
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                format!("{kbps}k"),
                "-af".to_string(),
                self.timing.atempo_filter(),
            ],
            None => vec!["-an".to_string()],
        }
    }
}

/// 產生可貼到終端機的指令字串，用於記錄
#[must_use]
pub fn command_preview(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|arg| quote_if_needed(&arg.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_if_needed(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}
