//! 备份执行器
//!
//! 增量备份：业务库在线快照 + 伴随平台数据卷导出；全量备份在此之上追加镜像、
//! 容器与网络配置导出。执行器独占它所运行的任务记录，任意阶段失败都会把整个
//! 任务标记为 failed，不存在部分成功。

mod full;
mod incremental;
pub mod manifest;
pub mod target;
mod upload;

use crate::config::AppConfig;
use crate::constants::{backup, progress};
use crate::container::DockerEngine;
use crate::db::{
    BackupKind, DataSecuritySettings, JobStatus, JobStore, JobUpdate, SettingsStore, now_ms,
};
use crate::{DataSecError, Result};
use chrono::Local;
use manifest::{AppDbEntry, Manifest, UploadEntry};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use walkdir::WalkDir;

/// 执行器的静态参数（来自配置文件）
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub helper_image: String,
    pub upload_binary: String,
    /// 设置中未指定 app_db_path 时使用的业务库路径
    pub default_app_db: PathBuf,
    pub busy_timeout: Duration,
}

impl ExecutorOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            helper_image: config.docker.helper_image.clone(),
            upload_binary: config.upload.binary.clone(),
            default_app_db: config.database_path(),
            busy_timeout: config.busy_timeout(),
        }
    }
}

/// 预检查通过后的执行计划
#[derive(Debug, Clone)]
struct BackupPlan {
    target: PathBuf,
    compose_file: PathBuf,
    app_db: PathBuf,
    upload: Option<UploadEntry>,
}

/// 备份执行器
#[derive(Debug, Clone)]
pub struct BackupExecutor {
    settings: SettingsStore,
    jobs: JobStore,
    engine: DockerEngine,
    options: ExecutorOptions,
}

impl BackupExecutor {
    pub fn new(
        settings: SettingsStore,
        jobs: JobStore,
        engine: DockerEngine,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            settings,
            jobs,
            engine,
            options,
        }
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// 执行一个已创建的任务并写入终态，返回迁移包目录
    #[instrument(skip(self), fields(kind = %kind))]
    pub fn run(&self, job_id: i64, kind: BackupKind) -> Result<PathBuf> {
        let started_at = now_ms();
        let started = self.jobs.update_job(
            job_id,
            JobUpdate {
                status: Some(JobStatus::Running),
                started_at_ms: Some(started_at),
                message: Some("备份开始".to_string()),
                ..Default::default()
            },
        )?;
        if !started {
            return Err(DataSecError::backup(format!("任务 {job_id} 已结束，不再执行")));
        }
        if let Err(e) = self.settings.touch_last_run(started_at) {
            warn!(error = %e, "记录最近运行时间失败");
        }

        match self.execute(job_id, kind) {
            Ok(pack_dir) => {
                let finished_at = now_ms();
                let recorded = self.jobs.update_job(
                    job_id,
                    JobUpdate {
                        status: Some(JobStatus::Success),
                        progress: Some(progress::FINISHED),
                        message: Some("备份完成".to_string()),
                        output_dir: Some(pack_dir.to_string_lossy().to_string()),
                        finished_at_ms: Some(finished_at),
                        ..Default::default()
                    },
                )?;
                if !recorded {
                    // 运行期间已被判定为僵死任务，保留已写入的终态
                    warn!(job_id, pack = %pack_dir.display(), "任务已被标记为结束，不再记录成功");
                    return Ok(pack_dir);
                }
                self.settings.record_backup_success(kind, finished_at)?;
                match pack_size(&pack_dir) {
                    Ok(bytes) => info!(job_id, pack = %pack_dir.display(), bytes, "备份任务完成"),
                    Err(e) => warn!(job_id, error = %e, "统计迁移包大小失败"),
                }
                Ok(pack_dir)
            }
            Err(e) => {
                error!(job_id, error = %e, "备份任务失败");
                self.jobs.update_job(
                    job_id,
                    JobUpdate {
                        status: Some(JobStatus::Failed),
                        message: Some("备份失败".to_string()),
                        detail: Some(e.to_string()),
                        finished_at_ms: Some(now_ms()),
                        ..Default::default()
                    },
                )?;
                Err(e)
            }
        }
    }

    fn execute(&self, job_id: i64, kind: BackupKind) -> Result<PathBuf> {
        let settings = self.settings.get_settings()?;
        let plan = self.preflight(&settings)?;
        self.report(job_id, progress::STARTED, "预检查通过")?;

        // 1. 迁移包目录
        let pack_dir = target::create_pack_dir(&plan.target, Local::now())?;
        self.jobs.update_job(
            job_id,
            JobUpdate {
                progress: Some(progress::PACK_CREATED),
                message: Some("已创建迁移包目录".to_string()),
                output_dir: Some(pack_dir.to_string_lossy().to_string()),
                ..Default::default()
            },
        )?;

        // 2. 业务库在线快照
        let db_file = pack_dir.join(backup::APP_DB_FILE_NAME);
        incremental::backup_app_db(&plan.app_db, &db_file, self.options.busy_timeout)?;
        self.report(job_id, progress::DATABASE_DONE, "业务数据库备份完成")?;

        // 3-6. compose 元数据、停服、卷导出、恢复服务
        let platform = self.backup_platform(job_id, &settings, &plan.compose_file, &pack_dir)?;

        if kind == BackupKind::Full {
            self.run_full_extension(job_id, &settings, &pack_dir, &platform.volume_names())?;
        }

        // 7. 清单
        let manifest = Manifest {
            format_version: Manifest::format_version(),
            kind,
            created_at: Local::now().to_rfc3339(),
            job_id,
            app_db: AppDbEntry {
                source: plan.app_db.to_string_lossy().to_string(),
                file: backup::APP_DB_FILE_NAME.to_string(),
            },
            compose: platform.compose,
            volumes: platform.volumes,
            upload: plan.upload.clone(),
        };
        manifest::write_json(&pack_dir.join(backup::MANIFEST_FILE_NAME), &manifest)?;
        self.report(job_id, progress::MANIFEST_DONE, "清单已写入")?;

        // 8. 可选上传
        if let Some(upload) = &plan.upload {
            upload::upload_pack(&self.engine, &self.options.upload_binary, &pack_dir, upload)?;
            self.report(job_id, progress::UPLOAD_DONE, "迁移包已上传")?;
        }

        Ok(pack_dir)
    }

    /// 执行前的配置与环境检查，任何失败都发生在写入阶段进度之前
    fn preflight(&self, settings: &DataSecuritySettings) -> Result<BackupPlan> {
        let target = target::resolve_target_dir(settings)?;

        let compose_file = settings
            .compose_path
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| DataSecError::config("未配置伴随平台 compose 文件路径"))?;
        if !compose_file.is_file() {
            return Err(DataSecError::config(format!(
                "compose 文件不存在: {}",
                compose_file.display()
            )));
        }

        let app_db = settings
            .app_db_path
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.options.default_app_db.clone());
        if !app_db.is_file() {
            return Err(DataSecError::config(format!(
                "业务数据库不存在: {}",
                app_db.display()
            )));
        }

        let upload = if settings.upload_after_backup {
            Some(upload::upload_entry(settings)?)
        } else {
            None
        };

        self.engine.check_available()?;

        Ok(BackupPlan {
            target,
            compose_file,
            app_db,
            upload,
        })
    }

    /// 更新进度并记录日志
    fn report(&self, job_id: i64, value: i64, message: &str) -> Result<()> {
        info!(job_id, progress = value, "{}", message);
        self.jobs.update_job(job_id, JobUpdate::progress(value, message))?;
        Ok(())
    }
}

/// 包内相对路径（统一使用 `/`）
fn pack_relative(pack_dir: &Path, path: &Path) -> String {
    path.strip_prefix(pack_dir)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// 迁移包内所有文件的总大小
fn pack_size(pack_dir: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(pack_dir) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
pub(crate) mod tests;
