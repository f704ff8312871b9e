//! 建立時間的格式轉換與檔案時間還原

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use filetime::FileTime;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// 將系統時間轉為 UTC ISO-8601 字串（毫秒精度）
#[must_use]
pub fn format_utc_millis(time: SystemTime) -> String {
    let dt: DateTime<Utc> = time.into();
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 解析容器標籤中的建立時間
///
/// 接受 RFC 3339，以及部分容器使用的 `YYYY-MM-DD HH:MM:SS`（視為 UTC）
#[must_use]
pub fn parse_creation_time(raw: &str) -> Option<SystemTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(SystemTime::from(dt.with_timezone(&Utc)));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| SystemTime::from(naive.and_utc()))
}

/// 將輸出檔的存取、修改時間（Windows 上另含建立時間）設為指定時間
pub fn restore_file_times(path: &Path, time: SystemTime) -> io::Result<()> {
    let ft = FileTime::from_system_time(time);
    filetime::set_file_times(path, ft, ft)?;

    #[cfg(windows)]
    {
        use std::fs::{FileTimes, OpenOptions};
        use std::os::windows::fs::FileTimesExt;

        let file = OpenOptions::new().write(true).open(path)?;
        file.set_times(FileTimes::new().set_created(time))?;
    }

    Ok(())
}
