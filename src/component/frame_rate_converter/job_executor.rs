//! 單一檔案的轉檔流程
//!
//! 狀態依序為 Pending、Probing、Planning、Running，最後停在 Succeeded、
//! Failed 或 Cancelled 其中之一。外部程序由 [`Transcoder`] 負責，測試時可替換。

use super::encoder_selector::EncoderChoice;
use super::ffmpeg_command::{FfmpegCommand, command_preview, output_file_name};
use super::progress::ProgressTracker;
use super::quality::plan_quality;
use super::timing::TimingPlan;
use crate::config::ConversionOptions;
use crate::error::{ConvertError, ConvertResult, ErrorCode};
use crate::tools::{
    CpuLimit, MediaProber, SourceFile, display_name, parse_creation_time, restore_file_times,
};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 檢查取消信號的間隔
const TICK: Duration = Duration::from_millis(200);

/// 失敗時保留的 stderr 行數
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Probing,
    Planning,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// 一個檔案的最終結果，不會自動重試
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub source: PathBuf,
    pub name: String,
    pub state: JobState,
    pub error: Option<ConvertError>,
    pub output_path: Option<PathBuf>,
    /// 未造成失敗的提示，例如位元率模式改回 CRF
    pub notice: Option<ConvertError>,
}

impl JobOutcome {
    fn new(source: &SourceFile, state: JobState) -> Self {
        Self {
            source: source.path.clone(),
            name: source.name.clone(),
            state,
            error: None,
            output_path: None,
            notice: None,
        }
    }

    #[must_use]
    pub fn cancelled(source: &SourceFile) -> Self {
        Self {
            error: Some(ConvertError::code_only(ErrorCode::Cancelled)),
            ..Self::new(source, JobState::Cancelled)
        }
    }

    /// 尚未開始轉檔就被排除的檔案，例如路徑無效或位於資料夾外
    #[must_use]
    pub fn rejected(path: &Path, error: ConvertError) -> Self {
        Self {
            source: path.to_path_buf(),
            name: display_name(path),
            state: JobState::Failed,
            error: Some(error),
            output_path: None,
            notice: None,
        }
    }

    fn failed(source: &SourceFile, error: ConvertError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(source, JobState::Failed)
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == JobState::Succeeded
    }
}

/// 交給外部程序執行的一次轉檔
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub output_path: PathBuf,
    pub cpu_limit: CpuLimit,
    pub tracker: ProgressTracker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeExit {
    Completed,
    Cancelled,
}

pub trait Transcoder {
    fn run(
        &self,
        request: TranscodeRequest,
        on_progress: &mut dyn FnMut(f32),
        cancel: &AtomicBool,
    ) -> ConvertResult<TranscodeExit>;
}

pub struct FfmpegTranscoder;

impl Transcoder for FfmpegTranscoder {
    fn run(
        &self,
        request: TranscodeRequest,
        on_progress: &mut dyn FnMut(f32),
        cancel: &AtomicBool,
    ) -> ConvertResult<TranscodeExit> {
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        request.cpu_limit.apply_priority(&mut command);

        info!("執行: {}", command_preview(&request.program, &request.args));

        let child = command.spawn().map_err(|e| {
            ConvertError::new(
                ErrorCode::TranscodeFailed,
                format!("無法啟動 {}: {e}", request.program.display()),
            )
        })?;

        drive_process(child, request.tracker, on_progress, cancel)
    }
}

/// 讀取子程序的進度輸出直到結束，每個檢查點都會確認取消信號
pub fn drive_process(
    mut child: Child,
    mut tracker: ProgressTracker,
    on_progress: &mut dyn FnMut(f32),
    cancel: &AtomicBool,
) -> ConvertResult<TranscodeExit> {
    let (tx, rx) = mpsc::channel::<String>();
    let reader = child.stdout.take().map(|stdout| {
        thread::spawn(move || for_each_lossy_line(stdout, |line| tx.send(line).is_ok()))
    });
    let stderr_tail = child.stderr.take().map(collect_stderr_tail);

    loop {
        if cancel.load(Ordering::SeqCst) {
            return Ok(kill_for_cancel(&mut child));
        }
        match rx.recv_timeout(TICK) {
            Ok(line) => {
                if let Some(percent) = tracker.feed_line(&line) {
                    on_progress(percent);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = loop {
        if cancel.load(Ordering::SeqCst) {
            return Ok(kill_for_cancel(&mut child));
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(TICK),
            Err(e) => {
                if let Err(kill_err) = child.kill() {
                    debug!("終止程序失敗（可能已結束）: {kill_err}");
                }
                return Err(wait_error(&e));
            }
        }
    };

    if let Some(Err(_)) = reader.map(JoinHandle::join) {
        warn!("讀取 ffmpeg 進度的執行緒異常結束");
    }
    let tail = match stderr_tail.map(JoinHandle::join) {
        Some(Ok(tail)) => tail,
        Some(Err(_)) => {
            warn!("讀取 ffmpeg 錯誤輸出的執行緒異常結束");
            String::new()
        }
        None => String::new(),
    };

    if status.success() {
        debug!("ffmpeg 正常結束");
        Ok(TranscodeExit::Completed)
    } else {
        let details = if tail.is_empty() {
            format!("ffmpeg 結束狀態 {status}")
        } else {
            format!("ffmpeg 結束狀態 {status}: {tail}")
        };
        Err(ConvertError::new(ErrorCode::TranscodeFailed, details))
    }
}

fn kill_for_cancel(child: &mut Child) -> TranscodeExit {
    warn!("收到取消信號，終止 ffmpeg [{}]", child.id());
    if let Err(e) = child.kill() {
        debug!("終止程序失敗（可能已結束）: {e}");
    }
    if let Err(e) = child.wait() {
        warn!("等待 ffmpeg 結束失敗: {e}");
    }
    TranscodeExit::Cancelled
}

fn wait_error(e: &io::Error) -> ConvertError {
    ConvertError::new(
        ErrorCode::TranscodeFailed,
        format!("無法取得 ffmpeg 結束狀態: {e}"),
    )
}

/// 逐行讀取，非 UTF-8 的位元組以替代字元呈現；`f` 回傳 false 時停止
fn for_each_lossy_line<R: Read>(source: R, mut f: impl FnMut(String) -> bool) {
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = String::from_utf8_lossy(&buf);
        if !f(line.trim_end_matches(['\r', '\n']).to_string()) {
            break;
        }
    }
}

fn collect_stderr_tail<R: Read + Send + 'static>(stderr: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        for_each_lossy_line(stderr, |line| {
            if !line.trim().is_empty() {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            true
        });
        Vec::from(tail).join("\n")
    })
}

/// 一次批次中所有檔案共用的執行環境
pub struct JobExecutor<'a> {
    pub prober: &'a dyn MediaProber,
    pub transcoder: &'a dyn Transcoder,
    pub ffmpeg_bin: &'a Path,
    pub options: &'a ConversionOptions,
    pub encoder: EncoderChoice,
    pub output_dir: &'a Path,
    pub cpu_limit: CpuLimit,
}

impl JobExecutor<'_> {
    pub fn execute(
        &self,
        source: &SourceFile,
        cancel: &AtomicBool,
        on_progress: &mut dyn FnMut(f32),
    ) -> JobOutcome {
        if cancel.load(Ordering::SeqCst) {
            return JobOutcome::cancelled(source);
        }

        let mut state = JobState::Pending;
        transition(source, &mut state, JobState::Probing);
        let probe = match self.prober.probe(&source.path) {
            Ok(probe) => probe,
            Err(e) => {
                error!("探測失敗 {}: {e}", source.name);
                return JobOutcome::failed(source, e);
            }
        };
        debug!(
            "{}: {:.3} fps, 長度 {:?} 秒",
            source.name,
            probe.source_fps(),
            probe.duration_secs
        );

        transition(source, &mut state, JobState::Planning);
        let target_fps = self.options.target_fps;
        let timing = match TimingPlan::new(probe.source_fps(), target_fps) {
            Ok(timing) => timing,
            Err(e) => {
                error!("無法計算時間轉換 {}: {e}", source.name);
                return JobOutcome::failed(source, e);
            }
        };
        let quality = plan_quality(
            &probe,
            target_fps,
            !self.options.use_custom_quality,
            self.options.fallback_crf(),
        );

        let output_path = self
            .output_dir
            .join(output_file_name(&source.path, target_fps));
        if output_path.exists() && !self.options.overwrite_existing {
            let e = ConvertError::new(
                ErrorCode::OutputExists,
                output_path.display().to_string(),
            );
            error!("輸出檔案已存在 {}: {e}", source.name);
            return JobOutcome::failed(source, e);
        }

        let creation_time = probe.resolved_creation_time();
        let args = FfmpegCommand {
            source: &source.path,
            destination: &output_path,
            target_fps,
            timing: &timing,
            quality: &quality.plan,
            encoder: &self.encoder,
            audio_bitrate_kbps: self
                .options
                .keep_audio
                .then_some(self.options.audio_bitrate_kbps),
            threads: self.cpu_limit.threads(),
            creation_time: creation_time.as_deref(),
            overwrite: self.options.overwrite_existing,
        }
        .build_args();

        let request = TranscodeRequest {
            program: self.ffmpeg_bin.to_path_buf(),
            args,
            output_path: output_path.clone(),
            cpu_limit: self.cpu_limit,
            tracker: ProgressTracker::new(
                probe.duration_secs.map(|d| timing.scaled_duration(d)),
                probe.duration_secs.map(|d| d * probe.source_fps()),
            ),
        };

        transition(source, &mut state, JobState::Running);
        let result = self.transcoder.run(request, on_progress, cancel);

        let mut outcome = match result {
            Ok(TranscodeExit::Completed) => {
                on_progress(100.0);
                if let Some(time) = creation_time.as_deref() {
                    apply_creation_time(&output_path, time);
                }
                info!("轉檔完成: {} -> {}", source.name, output_path.display());
                JobOutcome::new(source, JobState::Succeeded)
            }
            Ok(TranscodeExit::Cancelled) => {
                remove_partial_output(&output_path);
                warn!("已取消: {}", source.name);
                JobOutcome::cancelled(source)
            }
            Err(e) => {
                remove_partial_output(&output_path);
                error!("轉檔失敗 {}: {e}", source.name);
                JobOutcome::failed(source, e)
            }
        };
        transition(source, &mut state, outcome.state);

        if outcome.is_success() {
            outcome.output_path = Some(output_path);
        }
        outcome.notice = quality.notice;
        outcome
    }
}

fn transition(source: &SourceFile, state: &mut JobState, next: JobState) {
    debug!("{}: {:?} -> {:?}", source.name, state, next);
    *state = next;
}

fn apply_creation_time(output_path: &Path, creation_time: &str) {
    let Some(time) = parse_creation_time(creation_time) else {
        warn!("無法解析建立時間 {creation_time}，保留輸出檔的時間");
        return;
    };
    if let Err(e) = restore_file_times(output_path, time) {
        warn!("無法設定輸出檔時間 {}: {e}", output_path.display());
    }
}

fn remove_partial_output(output_path: &Path) {
    if !output_path.exists() {
        return;
    }
    match fs::remove_file(output_path) {
        Ok(()) => info!("已刪除未完成的輸出檔案: {}", output_path.display()),
        Err(e) => error!(
            "無法刪除未完成的輸出檔案 {}: {e}",
            output_path.display()
        ),
    }
}
