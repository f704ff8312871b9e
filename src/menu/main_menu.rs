use crate::config::save::save_settings;
use crate::config::types::{
    Config, GpuSettings, GpuVendor, MAX_AUDIO_BITRATE_KBPS, MAX_CRF, MAX_TARGET_FPS,
};
use crate::menu::handlers::run_frame_rate_converter;
use anyhow::Result;
use console::{Term, style};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub fn show_main_menu(
    term: &Term,
    shutdown_signal: &Arc<AtomicBool>,
    config: &mut Config,
) -> Result<bool> {
    term.clear_screen()?;

    println!("{}", style("=== 影片影格率轉換 ===").cyan().bold());
    println!("{}", style("(按 ESC 離開)").dim());

    let options = vec!["影格率轉換", "設定", "離開"];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("請選擇功能")
        .items(&options)
        .default(0)
        .interact_on_opt(term)?;

    match selection {
        Some(0) => {
            run_frame_rate_converter(term, shutdown_signal, config)?;
            Ok(true)
        }
        Some(1) => {
            show_settings_menu(term, config)?;
            Ok(true)
        }
        Some(2) | None => Ok(false),
        _ => unreachable!(),
    }
}

/// 設定選單
fn show_settings_menu(term: &Term, config: &mut Config) -> Result<()> {
    loop {
        term.clear_screen()?;

        println!("{}", style("=== 設定 ===").cyan().bold());
        println!("{}", style("(按 ESC 返回)").dim());

        let settings = &config.settings;
        let quality = if settings.use_custom_quality {
            format!("自訂 CRF {}", settings.crf)
        } else {
            "依檔案大小計算位元率".to_string()
        };
        let options = vec![
            format!("預設目標 FPS: {}", settings.target_fps),
            format!("保留音訊: {}", yes_no(settings.keep_audio)),
            format!("音訊位元率: {} kbps", settings.audio_bitrate_kbps),
            format!("畫質: {quality}"),
            format!("硬體加速: {}", describe_gpu(settings.gpu)),
            format!("CPU 使用上限: {}%", settings.cpu_limit),
            format!("ffmpeg 路徑: {}", describe_path(settings.tools.ffmpeg.as_ref())),
            format!("ffprobe 路徑: {}", describe_path(settings.tools.ffprobe.as_ref())),
            format!("輸出資料夾: {}", describe_path(settings.output_folder.as_ref())),
            format!("覆寫已存在的輸出: {}", yes_no(settings.overwrite_existing)),
            "返回".to_string(),
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("請選擇要修改的項目")
            .items(&options)
            .default(0)
            .interact_on_opt(term)?;

        let settings = &mut config.settings;
        match selection {
            Some(0) => {
                settings.target_fps = prompt_number("預設目標 FPS", settings.target_fps, |v| {
                    v.is_finite() && *v > 0.0 && *v <= MAX_TARGET_FPS
                })?;
            }
            Some(1) => settings.keep_audio = !settings.keep_audio,
            Some(2) => {
                settings.audio_bitrate_kbps =
                    prompt_number("音訊位元率 (kbps)", settings.audio_bitrate_kbps, |v| {
                        (1..=MAX_AUDIO_BITRATE_KBPS).contains(v)
                    })?;
            }
            Some(3) => {
                settings.use_custom_quality = Confirm::new()
                    .with_prompt("使用自訂 CRF？（否則依檔案大小計算位元率）")
                    .default(settings.use_custom_quality)
                    .interact()?;
                if settings.use_custom_quality {
                    settings.crf =
                        prompt_number("CRF (0 = 最高畫質)", settings.crf, |v| *v <= MAX_CRF)?;
                }
            }
            Some(4) => settings.gpu = prompt_gpu(term, settings.gpu)?,
            Some(5) => {
                settings.cpu_limit =
                    prompt_number("CPU 使用上限 (%)", settings.cpu_limit, |v| {
                        (1..=100).contains(v)
                    })?;
            }
            Some(6) => settings.tools.ffmpeg = prompt_optional_path("ffmpeg 路徑")?,
            Some(7) => settings.tools.ffprobe = prompt_optional_path("ffprobe 路徑")?,
            Some(8) => settings.output_folder = prompt_optional_path("輸出資料夾")?,
            Some(9) => settings.overwrite_existing = !settings.overwrite_existing,
            Some(10) | None => break,
            _ => unreachable!(),
        }

        save_settings(&config.settings)?;
    }

    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "是" } else { "否" }
}

fn describe_path(path: Option<&PathBuf>) -> String {
    path.map_or_else(|| "(預設)".to_string(), |p| p.display().to_string())
}

fn describe_gpu(gpu: GpuSettings) -> String {
    match (gpu.enabled, gpu.vendor) {
        (false, _) => "停用".to_string(),
        (true, None) => "自動偵測".to_string(),
        (true, Some(vendor)) => vendor.to_string(),
    }
}

fn prompt_number<T>(prompt: &str, current: T, valid: impl Fn(&T) -> bool) -> Result<T>
where
    T: Clone + ToString + std::str::FromStr,
    <T as std::str::FromStr>::Err: ToString,
{
    let value = Input::new()
        .with_prompt(prompt)
        .default(current)
        .validate_with(|v: &T| -> Result<(), &'static str> {
            if valid(v) { Ok(()) } else { Err("數值超出範圍") }
        })
        .interact_text()?;
    Ok(value)
}

/// 空白輸入代表使用預設
fn prompt_optional_path(prompt: &str) -> Result<Option<PathBuf>> {
    let raw: String = Input::new()
        .with_prompt(format!("{prompt}（留空使用預設）"))
        .allow_empty(true)
        .interact_text()?;
    let raw = raw.trim();
    Ok((!raw.is_empty()).then(|| PathBuf::from(raw)))
}

fn prompt_gpu(term: &Term, current: GpuSettings) -> Result<GpuSettings> {
    let choices = [
        ("自動偵測", GpuSettings { enabled: true, vendor: None }),
        ("NVIDIA (NVENC)", GpuSettings { enabled: true, vendor: Some(GpuVendor::Nvidia) }),
        ("AMD (AMF)", GpuSettings { enabled: true, vendor: Some(GpuVendor::Amd) }),
        ("Intel (QSV)", GpuSettings { enabled: true, vendor: Some(GpuVendor::Intel) }),
        ("停用（只用 CPU）", GpuSettings { enabled: false, vendor: None }),
    ];
    let labels: Vec<&str> = choices.iter().map(|(label, _)| *label).collect();
    let default_index = choices
        .iter()
        .position(|(_, gpu)| *gpu == current)
        .unwrap_or(0);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("硬體加速")
        .items(&labels)
        .default(default_index)
        .interact_on_opt(term)?;

    Ok(selection.map_or(current, |i| choices[i].1))
}
