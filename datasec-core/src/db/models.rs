use crate::{DataSecError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 备份任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }

    /// 终态：success / failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DataSecError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DataSecError::Database(format!("未知的任务状态: {other}"))),
        }
    }
}

/// 备份类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// 业务库 + 伴随平台数据卷
    Incremental,
    /// 增量内容 + 镜像、容器与网络配置
    Full,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Incremental => "incremental",
            BackupKind::Full => "full",
        }
    }

    pub fn from_full_flag(full_backup: bool) -> Self {
        if full_backup {
            BackupKind::Full
        } else {
            BackupKind::Incremental
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = DataSecError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "incremental" => Ok(BackupKind::Incremental),
            "full" => Ok(BackupKind::Full),
            other => Err(DataSecError::Database(format!("未知的备份类型: {other}"))),
        }
    }
}

/// 备份任务记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupJob {
    pub id: i64,
    pub kind: BackupKind,
    pub status: JobStatus,
    pub progress: i64,
    pub message: Option<String>,
    pub detail: Option<String>,
    pub output_dir: Option<String>,
    pub created_at_ms: i64,
    pub started_at_ms: Option<i64>,
    pub finished_at_ms: Option<i64>,
}

/// 任务部分更新，只写入提供的字段
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<i64>,
    pub message: Option<String>,
    pub detail: Option<String>,
    pub output_dir: Option<String>,
    pub started_at_ms: Option<i64>,
    pub finished_at_ms: Option<i64>,
}

impl JobUpdate {
    pub fn progress(progress: i64, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress.is_none()
            && self.message.is_none()
            && self.detail.is_none()
            && self.output_dir.is_none()
            && self.started_at_ms.is_none()
            && self.finished_at_ms.is_none()
    }
}

/// 备份目标模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    /// 网络共享：host/share/subdir
    Share,
    /// 本机目录
    Local,
}

impl TargetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMode::Share => "share",
            TargetMode::Local => "local",
        }
    }
}

impl FromStr for TargetMode {
    type Err = DataSecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "share" => Ok(TargetMode::Share),
            "local" => Ok(TargetMode::Local),
            other => Err(DataSecError::config(format!(
                "无效的目标模式: {other}（可选 share / local）"
            ))),
        }
    }
}

/// 数据安全备份设置（单行）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSecuritySettings {
    pub enabled: bool,
    pub interval_minutes: i64,
    pub incremental_schedule: Option<String>,
    pub full_backup_schedule: Option<String>,
    pub target_mode: TargetMode,
    pub target_ip: Option<String>,
    pub target_share_name: Option<String>,
    pub target_subdir: Option<String>,
    pub target_local_dir: Option<String>,
    pub compose_path: Option<String>,
    pub compose_project_name: Option<String>,
    pub stop_services: bool,
    pub app_db_path: Option<String>,
    pub upload_after_backup: bool,
    pub upload_host: Option<String>,
    pub upload_username: Option<String>,
    pub upload_target_path: Option<String>,
    pub full_backup_enabled: bool,
    pub full_backup_include_images: bool,
    pub updated_at_ms: i64,
    pub last_run_at_ms: Option<i64>,
    pub last_incremental_backup_time_ms: Option<i64>,
    pub last_full_backup_time_ms: Option<i64>,
}

impl DataSecuritySettings {
    /// 指定类型的最近一次成功备份时间
    pub fn last_success_ms(&self, kind: BackupKind) -> Option<i64> {
        match kind {
            BackupKind::Incremental => self.last_incremental_backup_time_ms,
            BackupKind::Full => self.last_full_backup_time_ms,
        }
    }
}

/// 设置的可更新字段子集
///
/// 可空文本字段使用 `Option<Option<String>>`：外层 `None` 表示不修改，
/// `Some(None)` 表示清空。
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub interval_minutes: Option<i64>,
    pub incremental_schedule: Option<Option<String>>,
    pub full_backup_schedule: Option<Option<String>>,
    pub target_mode: Option<TargetMode>,
    pub target_ip: Option<Option<String>>,
    pub target_share_name: Option<Option<String>>,
    pub target_subdir: Option<Option<String>>,
    pub target_local_dir: Option<Option<String>>,
    pub compose_path: Option<Option<String>>,
    pub compose_project_name: Option<Option<String>>,
    pub stop_services: Option<bool>,
    pub app_db_path: Option<Option<String>>,
    pub upload_after_backup: Option<bool>,
    pub upload_host: Option<Option<String>>,
    pub upload_username: Option<Option<String>>,
    pub upload_target_path: Option<Option<String>>,
    pub full_backup_enabled: Option<bool>,
    pub full_backup_include_images: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_terminal() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Success,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_target_mode_rejects_unknown() {
        assert_eq!(" local ".parse::<TargetMode>().unwrap(), TargetMode::Local);
        let err = "nfs".parse::<TargetMode>().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_job_update_is_empty() {
        assert!(JobUpdate::default().is_empty());
        assert!(!JobUpdate::progress(10, "x").is_empty());
    }
}
