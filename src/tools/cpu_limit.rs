use std::process::Command;
use sysinfo::System;

/// 降低優先權時使用的 nice 值
#[cfg(unix)]
const LOW_PRIORITY_NICE: libc::c_int = 10;

#[cfg(windows)]
const BELOW_NORMAL_PRIORITY_CLASS: u32 = 0x0000_4000;

/// 依 CPU 使用上限決定轉檔時的資源提示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuLimit {
    percent: u8,
    cpu_count: usize,
}

impl CpuLimit {
    #[must_use]
    pub fn new(percent: u8) -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self::with_cpu_count(percent, system.cpus().len())
    }

    #[must_use]
    pub fn with_cpu_count(percent: u8, cpu_count: usize) -> Self {
        Self {
            percent: percent.clamp(1, 100),
            cpu_count: cpu_count.max(1),
        }
    }

    #[must_use]
    pub const fn is_limited(&self) -> bool {
        self.percent < 100
    }

    /// 傳給 ffmpeg `-threads` 的數量，不限制時為 None
    #[must_use]
    pub fn threads(&self) -> Option<usize> {
        if !self.is_limited() {
            return None;
        }
        let n = (self.cpu_count as f64 * f64::from(self.percent) / 100.0).ceil() as usize;
        Some(n.clamp(1, self.cpu_count))
    }

    /// 在啟動子程序前降低其排程優先權，僅為盡力而為的提示
    pub fn apply_priority(&self, command: &mut Command) {
        if !self.is_limited() {
            return;
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: setpriority 是 async-signal-safe，閉包內不配置記憶體
            unsafe {
                command.pre_exec(|| {
                    libc::setpriority(libc::PRIO_PROCESS, 0, LOW_PRIORITY_NICE);
                    Ok(())
                });
            }
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(BELOW_NORMAL_PRIORITY_CLASS);
        }

        #[cfg(not(any(unix, windows)))]
        let _ = command;
    }
}
