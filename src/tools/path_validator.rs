use crate::error::{ConvertError, ConvertResult, ErrorCode};
use std::path::{Path, PathBuf};

pub fn validate_directory_exists(path: &Path) -> ConvertResult<()> {
    if !path.exists() {
        return Err(ConvertError::new(
            ErrorCode::FolderNotFound,
            format!("路徑不存在: {}", path.display()),
        ));
    }
    if !path.is_dir() {
        return Err(ConvertError::new(
            ErrorCode::FolderNotFound,
            format!("路徑不是資料夾: {}", path.display()),
        ));
    }
    Ok(())
}

pub fn ensure_directory_exists(path: &Path) -> ConvertResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// 確認檔案位於指定資料夾之內，回傳正規化後的路徑
pub fn validate_safe_path(path: &Path, base_folder: &Path) -> ConvertResult<PathBuf> {
    let base = base_folder.canonicalize().map_err(|e| {
        ConvertError::new(
            ErrorCode::InvalidInputPath,
            format!("無效的資料夾 {}: {e}", base_folder.display()),
        )
    })?;

    let target = path.canonicalize().map_err(|e| {
        ConvertError::new(
            ErrorCode::InvalidInputPath,
            format!("無效的檔案路徑 {}: {e}", path.display()),
        )
    })?;

    if !target.starts_with(&base) {
        return Err(ConvertError::new(
            ErrorCode::PathTraversalDetected,
            format!("{} 不在 {} 之內", path.display(), base_folder.display()),
        ));
    }

    Ok(target)
}
