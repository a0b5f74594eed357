use super::manifest::{self, ComposeEntry, VolumeArchive};
use super::{BackupExecutor, pack_relative};
use crate::constants::backup::{PLATFORM_DIR_NAME, VOLUMES_DIR_NAME};
use crate::constants::docker::ENV_FILE_NAME;
use crate::constants::progress;
use crate::container::{DockerEngine, compose};
use crate::db::DataSecuritySettings;
use crate::{DataSecError, Result};
use rusqlite::{Connection, DatabaseName};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// 伴随平台部分的备份结果
#[derive(Debug)]
pub(super) struct PlatformBackup {
    pub(super) compose: ComposeEntry,
    pub(super) volumes: Vec<VolumeArchive>,
}

impl PlatformBackup {
    pub(super) fn volume_names(&self) -> Vec<String> {
        self.volumes.iter().map(|v| v.name.clone()).collect()
    }
}

/// 用 SQLite 在线备份接口生成一致的业务库快照，不阻塞其他写入者
pub(super) fn backup_app_db(source: &Path, dest: &Path, busy_timeout: Duration) -> Result<()> {
    info!("备份业务数据库: {} -> {}", source.display(), dest.display());
    let conn = Connection::open(source)?;
    conn.busy_timeout(busy_timeout)?;
    conn.backup(DatabaseName::Main, dest, None)
        .map_err(|e| DataSecError::backup(format!("业务数据库在线备份失败: {e}")))?;
    Ok(())
}

/// 复制 compose 文件（以及同级 .env）到 `platform/`，返回包内相对路径
fn copy_compose_files(compose_file: &Path, pack_dir: &Path) -> Result<Vec<String>> {
    let platform_dir = pack_dir.join(PLATFORM_DIR_NAME);
    fs::create_dir_all(&platform_dir)?;

    let mut sources = vec![compose_file.to_path_buf()];
    if let Some(env_file) = compose_file.parent().map(|p| p.join(ENV_FILE_NAME)) {
        if env_file.is_file() {
            sources.push(env_file);
        }
    }

    let mut copied = Vec::with_capacity(sources.len());
    for source in sources {
        let file_name = source
            .file_name()
            .ok_or_else(|| DataSecError::config(format!("无效的文件路径: {}", source.display())))?;
        let dest = platform_dir.join(file_name);
        fs::copy(&source, &dest)?;
        copied.push(pack_relative(pack_dir, &dest));
    }
    Ok(copied)
}

/// 停服期间的守卫：离开作用域前若未显式恢复，则在 Drop 中尝试启动服务
pub(super) struct ServicesStopped<'a> {
    engine: &'a DockerEngine,
    compose_file: &'a Path,
    project: &'a str,
    restarted: bool,
}

impl<'a> ServicesStopped<'a> {
    pub(super) fn stop(
        engine: &'a DockerEngine,
        compose_file: &'a Path,
        project: &'a str,
    ) -> Result<Self> {
        if let Err(stop_err) = engine.compose_stop(compose_file, project) {
            // stop 可能只停掉了部分服务
            if let Err(start_err) = engine.compose_start(compose_file, project) {
                error!(error = %start_err, "停服失败后恢复服务也失败");
            }
            return Err(stop_err);
        }
        Ok(Self {
            engine,
            compose_file,
            project,
            restarted: false,
        })
    }

    pub(super) fn restart(mut self) -> Result<()> {
        self.restarted = true;
        self.engine.compose_start(self.compose_file, self.project)
    }
}

impl Drop for ServicesStopped<'_> {
    fn drop(&mut self) {
        if self.restarted {
            return;
        }
        warn!("备份流程异常中断，尝试恢复伴随平台服务");
        if let Err(e) = self.engine.compose_start(self.compose_file, self.project) {
            error!(error = %e, "恢复伴随平台服务失败");
        }
    }
}

impl BackupExecutor {
    /// compose 元数据、停服、卷导出与恢复服务
    pub(super) fn backup_platform(
        &self,
        job_id: i64,
        settings: &DataSecuritySettings,
        compose_file: &Path,
        pack_dir: &Path,
    ) -> Result<PlatformBackup> {
        let copied_files = copy_compose_files(compose_file, pack_dir)?;
        let project = compose::resolve_project_name(
            compose_file,
            settings.compose_project_name.as_deref(),
        )?;
        let prefix = compose::volume_prefix(&project);
        self.report(
            job_id,
            progress::COMPOSE_RESOLVED,
            &format!("compose 项目: {project}"),
        )?;

        let volumes = self.engine.list_volumes(&prefix)?;
        if volumes.is_empty() {
            warn!(project = %project, "没有找到前缀为 {} 的数据卷", prefix);
        }
        let volumes_dir = pack_dir.join(PLATFORM_DIR_NAME).join(VOLUMES_DIR_NAME);
        fs::create_dir_all(&volumes_dir)?;

        let stop = settings.stop_services && !volumes.is_empty();
        let guard = if stop {
            let guard = ServicesStopped::stop(&self.engine, compose_file, &project)?;
            self.report(job_id, progress::SERVICES_STOPPED, "伴随平台服务已停止")?;
            Some(guard)
        } else {
            None
        };

        let exported = self.export_volumes(job_id, &volumes, &volumes_dir);
        let restarted = guard.map(ServicesStopped::restart);

        let archives = match (exported, restarted) {
            (Ok(archives), None) => archives,
            (Ok(archives), Some(Ok(()))) => {
                self.report(job_id, progress::SERVICES_RESTARTED, "伴随平台服务已恢复")?;
                archives
            }
            (Ok(_), Some(Err(restart_err))) => {
                return Err(DataSecError::docker(format!(
                    "数据卷已导出，但恢复伴随平台服务失败: {restart_err}"
                )));
            }
            (Err(export_err), Some(Err(restart_err))) => {
                error!(error = %restart_err, "恢复伴随平台服务失败");
                return Err(DataSecError::backup(format!(
                    "{export_err}；恢复伴随平台服务也失败: {restart_err}"
                )));
            }
            (Err(export_err), _) => return Err(export_err),
        };

        Ok(PlatformBackup {
            compose: ComposeEntry {
                compose_file: compose_file.to_string_lossy().to_string(),
                copied_files,
                project_name: project,
                volume_prefix: prefix,
                services_stopped: stop,
            },
            volumes: archives,
        })
    }

    fn export_volumes(
        &self,
        job_id: i64,
        volumes: &[String],
        volumes_dir: &Path,
    ) -> Result<Vec<VolumeArchive>> {
        self.report(
            job_id,
            progress::VOLUMES_START,
            &format!("开始导出 {} 个数据卷", volumes.len()),
        )?;

        let span = progress::VOLUMES_DONE - progress::VOLUMES_START;
        let total = volumes.len() as i64;
        let mut archives = Vec::with_capacity(volumes.len());
        for (index, volume) in volumes.iter().enumerate() {
            let archive = self
                .engine
                .export_volume(&self.options.helper_image, volume, volumes_dir)?;
            let path: PathBuf = volumes_dir.join(&archive);
            if !path.is_file() {
                return Err(DataSecError::backup(format!(
                    "数据卷 {volume} 的归档文件未生成: {}",
                    path.display()
                )));
            }
            let (sha256, size_bytes) = manifest::file_digest(&path)?;
            archives.push(VolumeArchive {
                name: volume.clone(),
                archive,
                size_bytes,
                sha256,
            });

            let done = index as i64 + 1;
            self.report(
                job_id,
                progress::VOLUMES_START + span * done / total,
                &format!("已导出数据卷 {volume} ({done}/{total})"),
            )?;
        }

        if volumes.is_empty() {
            self.report(job_id, progress::VOLUMES_DONE, "没有需要导出的数据卷")?;
        }
        Ok(archives)
    }
}
