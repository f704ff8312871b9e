use super::ffmpeg_command::format_fps;
use super::job_executor::{JobOutcome, JobState};
use super::task_scheduler::{
    BatchRequest, BatchSummary, ConversionStatus, ProgressEvent, TaskScheduler, Toolchain,
    describe_outcome,
};
use crate::config::save::{add_recent_path, save_settings};
use crate::config::{Config, MAX_TARGET_FPS};
use crate::tools::{SourceFile, scan_video_files, validate_directory_exists};
use anyhow::Result;
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, MultiSelect, Select};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 進度條每個檔案的刻度
const TICKS_PER_FILE: u64 = 1000;

pub struct FrameRateConverter<'a> {
    config: &'a mut Config,
    shutdown_signal: Arc<AtomicBool>,
}

impl<'a> FrameRateConverter<'a> {
    pub const fn new(config: &'a mut Config, shutdown_signal: Arc<AtomicBool>) -> Self {
        Self {
            config,
            shutdown_signal,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        println!("{}", style("=== 影格率轉換 ===").cyan().bold());

        let Some(input_path) = self.prompt_input_path()? else {
            return Ok(());
        };
        let directory = PathBuf::from(&input_path);
        validate_directory_exists(&directory)?;

        add_recent_path(&mut self.config.settings, &input_path);
        if let Err(e) = save_settings(&self.config.settings) {
            warn!("無法儲存最近使用的路徑: {e:#}");
        }

        println!("{}", style("掃描影片檔案中...").dim());
        let video_files = scan_video_files(&directory)?;
        if video_files.is_empty() {
            println!("{}", style("找不到任何影片檔案").yellow());
            return Ok(());
        }
        Self::print_files(&video_files);

        let Some(files) = self.prompt_selection(&video_files)? else {
            return Ok(());
        };
        let target_fps = self.prompt_target_fps()?;
        let options = self.config.settings.conversion_options(target_fps);

        let toolchain = Toolchain::resolve(&self.config.settings.tools)?;
        // 上一次批次的取消不影響這一次
        self.shutdown_signal.store(false, Ordering::SeqCst);
        let mut scheduler = TaskScheduler::new(toolchain, Arc::clone(&self.shutdown_signal));

        let request = BatchRequest {
            input_folder: directory,
            files,
        };

        println!("{}", style("開始轉檔...").cyan());
        let progress_bar = ProgressBar::new(0);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("#>-"),
        );

        let summary = scheduler.run(&request, &options, &mut |event| {
            Self::render_event(&progress_bar, event);
        });
        progress_bar.finish_and_clear();

        Self::print_summary(&summary?, target_fps);
        Ok(())
    }

    fn prompt_input_path(&self) -> Result<Option<String>> {
        let recent_paths = &self.config.settings.recent_paths;

        if recent_paths.is_empty() {
            let path: String = Input::new()
                .with_prompt("請輸入影片資料夾路徑")
                .interact_text()?;
            return Ok(Some(path.trim().to_string()));
        }

        let mut options: Vec<String> = recent_paths
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let indicator = if Path::new(p).exists() { "✓" } else { "✗" };
                format!("{} [{}] {}", i + 1, indicator, p)
            })
            .collect();
        options.push("輸入新路徑...".to_string());

        println!("{}", style("(按 ESC 返回主選單)").dim());

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("請選擇路徑")
            .items(&options)
            .default(0)
            .interact_opt()?;

        match selection {
            None => Ok(None),
            Some(idx) if idx < recent_paths.len() => Ok(Some(recent_paths[idx].clone())),
            Some(_) => {
                let path: String = Input::new()
                    .with_prompt("請輸入影片資料夾路徑")
                    .interact_text()?;
                Ok(Some(path.trim().to_string()))
            }
        }
    }

    fn print_files(files: &[SourceFile]) {
        println!(
            "{}",
            style(format!("找到 {} 個影片檔案：", files.len())).green()
        );
        for (index, file) in files.iter().enumerate() {
            let size_mb = file.size as f64 / 1024.0 / 1024.0;
            println!("  {}. {} ({:.2} MB)", index + 1, file.name, size_mb);
        }
        println!();
    }

    /// None 代表使用者取消；Some(None) 代表轉換全部檔案
    fn prompt_selection(&self, files: &[SourceFile]) -> Result<Option<Option<Vec<PathBuf>>>> {
        let convert_all = Confirm::new()
            .with_prompt("轉換全部檔案嗎？")
            .default(true)
            .interact()?;
        if convert_all {
            return Ok(Some(None));
        }

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        let chosen = MultiSelect::with_theme(&ColorfulTheme::default())
            .with_prompt("以空白鍵選擇要轉換的檔案")
            .items(&names)
            .interact_opt()?;

        match chosen {
            Some(indices) if !indices.is_empty() => Ok(Some(Some(
                indices.into_iter().map(|i| files[i].path.clone()).collect(),
            ))),
            _ => {
                println!("{}", style("未選擇任何檔案").yellow());
                Ok(None)
            }
        }
    }

    fn prompt_target_fps(&self) -> Result<f64> {
        let fps: f64 = Input::new()
            .with_prompt("目標 FPS")
            .default(self.config.settings.target_fps)
            .validate_with(|value: &f64| -> Result<(), String> {
                if value.is_finite() && *value > 0.0 && *value <= MAX_TARGET_FPS {
                    Ok(())
                } else {
                    Err(format!("請輸入 0 到 {MAX_TARGET_FPS} 之間的數值"))
                }
            })
            .interact_text()?;
        Ok(fps)
    }

    fn render_event(progress_bar: &ProgressBar, event: &ProgressEvent) {
        progress_bar.set_length(event.total_files as u64 * TICKS_PER_FILE);
        let done_before = (event.current_file_index.saturating_sub(1)) as u64 * TICKS_PER_FILE;
        let within = (f64::from(event.percentage) / 100.0 * TICKS_PER_FILE as f64) as u64;

        match event.status {
            ConversionStatus::Processing => {
                progress_bar.set_position(done_before + within);
                progress_bar.set_message(format!(
                    "({}/{}) {}",
                    event.current_file_index, event.total_files, event.current_file
                ));
            }
            ConversionStatus::Success => {
                progress_bar.set_position(done_before + TICKS_PER_FILE);
            }
            ConversionStatus::Error => {
                progress_bar.set_position(done_before + TICKS_PER_FILE);
                progress_bar.println(format!(
                    "{} {}",
                    style("✗").red(),
                    event.current_file
                ));
            }
            ConversionStatus::Cancelled => {
                progress_bar.set_position(done_before + TICKS_PER_FILE);
            }
        }
    }

    fn print_summary(summary: &BatchSummary, target_fps: f64) {
        let succeeded = summary.count(JobState::Succeeded);
        let failed = summary.count(JobState::Failed);
        let cancelled = summary.count(JobState::Cancelled);

        println!();
        println!("{}", style("=== 轉檔摘要 ===").cyan().bold());
        let accel = if summary.encoder.kind.is_hardware() { " (硬體加速)" } else { "" };
        println!("  編碼器: {}{accel}", summary.encoder.kind);
        println!("  輸出資料夾: {}", summary.output_folder.display());
        println!("  總計: {} 個檔案", summary.outcomes.len());
        println!("  成功: {} 個", style(succeeded).green());
        if failed > 0 {
            println!("  失敗: {} 個", style(failed).red());
        }
        if cancelled > 0 {
            println!("  取消: {} 個", style(cancelled).yellow());
        }

        println!();
        for outcome in &summary.outcomes {
            Self::print_outcome(outcome);
        }

        info!(
            "轉檔完成 ({} fps) - 成功: {succeeded}, 失敗: {failed}, 取消: {cancelled}",
            format_fps(target_fps)
        );
    }

    fn print_outcome(outcome: &JobOutcome) {
        let mark = match outcome.state {
            JobState::Succeeded => style("✓").green(),
            JobState::Cancelled => style("-").yellow(),
            _ => style("✗").red(),
        };
        println!("  {mark} {} {}", outcome.name, style(describe_outcome(outcome)).dim());
        if let Some(notice) = &outcome.notice {
            println!("      {}", style(format!("改用固定畫質: {notice}")).yellow());
        }
    }
}
