use crate::config::is_video_file;
use crate::error::{ConvertError, ConvertResult, ErrorCode};
use crate::tools::path_validator::validate_directory_exists;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 掃描時發現的來源檔案
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl SourceFile {
    pub fn from_path(path: &Path) -> ConvertResult<Self> {
        let metadata = fs::metadata(path).map_err(|e| {
            ConvertError::new(
                ErrorCode::ReadMetadataFailed,
                format!("{}: {e}", path.display()),
            )
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            name: display_name(path),
            size: metadata.len(),
        })
    }
}

#[must_use]
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// 列出資料夾第一層的影片檔，依檔名排序
///
/// 連結到資料夾外的檔案會被略過
pub fn scan_video_files(directory: &Path) -> ConvertResult<Vec<SourceFile>> {
    validate_directory_exists(directory)?;

    let base = directory
        .canonicalize()
        .map_err(|e| ConvertError::new(ErrorCode::InvalidInputPath, e.to_string()))?;

    let video_files = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| is_video_file(entry.path()))
        .filter(|entry| match entry.path().canonicalize() {
            Ok(canonical) if canonical.starts_with(&base) => true,
            _ => {
                debug!("略過資料夾外的檔案: {}", entry.path().display());
                false
            }
        })
        .filter_map(|entry| {
            let metadata = fs::metadata(entry.path()).ok()?;
            if !metadata.is_file() {
                return None;
            }
            Some(SourceFile {
                name: display_name(entry.path()),
                size: metadata.len(),
                path: entry.into_path(),
            })
        })
        .collect();

    Ok(video_files)
}
