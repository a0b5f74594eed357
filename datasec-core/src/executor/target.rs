use crate::constants::backup::{PACK_DIR_PREFIX, PACK_TIMESTAMP_FORMAT};
use crate::db::{DataSecuritySettings, TargetMode};
use crate::{DataSecError, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

/// 解析备份目标目录
///
/// - `local`: 直接使用 `target_local_dir`
/// - `share`: 组合成共享路径，Windows 上为 `\\ip\share\subdir`，其他平台为 `//ip/share/subdir`
pub fn resolve_target_dir(settings: &DataSecuritySettings) -> Result<PathBuf> {
    match settings.target_mode {
        TargetMode::Local => {
            let dir = non_empty(settings.target_local_dir.as_deref())
                .ok_or_else(|| DataSecError::config("未配置本地备份目录 target_local_dir"))?;
            Ok(PathBuf::from(dir))
        }
        TargetMode::Share => {
            let ip = non_empty(settings.target_ip.as_deref())
                .ok_or_else(|| DataSecError::config("未配置共享主机 target_ip"))?;
            let share = non_empty(settings.target_share_name.as_deref())
                .ok_or_else(|| DataSecError::config("未配置共享名 target_share_name"))?;
            let subdir = non_empty(settings.target_subdir.as_deref());
            Ok(PathBuf::from(share_path(ip, share, subdir)))
        }
    }
}

fn share_path(ip: &str, share: &str, subdir: Option<&str>) -> String {
    let sep = if cfg!(windows) { '\\' } else { '/' };
    let mut path = format!("{sep}{sep}{ip}{sep}{share}");
    if let Some(subdir) = subdir {
        for part in subdir.split(['/', '\\']).filter(|p| !p.is_empty()) {
            path.push(sep);
            path.push_str(part);
        }
    }
    path
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// 在目标目录下创建唯一的 `migration_pack_<时间戳>` 目录
pub fn create_pack_dir(target: &Path, now: DateTime<Local>) -> Result<PathBuf> {
    fs::create_dir_all(target).map_err(|e| {
        DataSecError::backup(format!("无法创建备份目标目录 {}: {e}", target.display()))
    })?;

    let base = format!("{PACK_DIR_PREFIX}{}", now.format(PACK_TIMESTAMP_FORMAT));
    let mut candidate = target.join(&base);
    let mut suffix = 1;
    loop {
        // create_dir 在目录已存在时失败，保证不会复用别的任务的目录
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = target.join(format!("{base}_{suffix}"));
                suffix += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
