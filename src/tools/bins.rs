use crate::error::{ConvertError, ConvertResult, ErrorCode};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

#[cfg(target_os = "macos")]
const COMMON_BIN_DIRS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];
#[cfg(not(target_os = "macos"))]
const COMMON_BIN_DIRS: &[&str] = &["/usr/local/bin", "/usr/bin"];

/// 解析外部工具路徑
///
/// 優先使用存在的自訂路徑，其次是常見安裝目錄，最後交給 PATH 解析
#[must_use]
pub fn resolve_bin(custom: Option<&Path>, tool: &str) -> PathBuf {
    if let Some(path) = custom {
        if path.exists() {
            return path.to_path_buf();
        }
        debug!("自訂 {tool} 路徑不存在，改用系統版本: {}", path.display());
    }

    COMMON_BIN_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(tool))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(tool))
}

/// 執行 `<bin> -version` 並取出版本字串
#[must_use]
pub fn tool_version(bin: &Path) -> Option<String> {
    let output = Command::new(bin)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).to_string()
    };
    parse_version_line(&text, bin)
}

fn parse_version_line(text: &str, bin: &Path) -> Option<String> {
    let first_line = text.lines().next()?.trim();
    if first_line.is_empty() {
        return None;
    }

    let bin_name = bin
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let prefix = format!("{bin_name} version ");

    first_line
        .strip_prefix(&prefix)
        .and_then(|rest| rest.split_whitespace().next())
        .map_or_else(|| Some(first_line.to_string()), |ver| Some(ver.to_string()))
}

/// 確認工具可以執行，否則回傳對應的 NotFound 錯誤
pub fn ensure_tool(bin: &Path, missing_code: ErrorCode) -> ConvertResult<String> {
    match tool_version(bin) {
        Some(version) => {
            info!("使用 {} (版本 {version})", bin.display());
            Ok(version)
        }
        None => Err(ConvertError::new(
            missing_code,
            format!("無法執行 {}", bin.display()),
        )),
    }
}
