// SQLite 数据库模块
//
// 设置与任务共用业务数据库。每次调用都打开一个短生命周期连接（WAL +
// busy_timeout），调用量很低，不需要连接池。
//
// 主要组件：
// - Database: 连接工厂与表结构初始化
// - SettingsStore: 单行备份设置
// - JobStore: 备份任务记录

mod jobs;
mod models;
mod settings;

pub use jobs::{JobStore, STALE_JOB_MESSAGE};
pub use models::{
    BackupJob, BackupKind, DataSecuritySettings, JobStatus, JobUpdate, SettingsUpdate, TargetMode,
};
pub use settings::SettingsStore;

use crate::Result;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// 旧版数据库可能缺失的列（表名, 列名, 类型定义）
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("data_security_settings", "incremental_schedule", "TEXT"),
    ("data_security_settings", "full_backup_schedule", "TEXT"),
    ("data_security_settings", "target_local_dir", "TEXT"),
    ("data_security_settings", "compose_project_name", "TEXT"),
    ("data_security_settings", "app_db_path", "TEXT"),
    ("data_security_settings", "upload_after_backup", "INTEGER NOT NULL DEFAULT 0"),
    ("data_security_settings", "upload_host", "TEXT"),
    ("data_security_settings", "upload_username", "TEXT"),
    ("data_security_settings", "upload_target_path", "TEXT"),
    ("data_security_settings", "full_backup_enabled", "INTEGER NOT NULL DEFAULT 0"),
    ("data_security_settings", "full_backup_include_images", "INTEGER NOT NULL DEFAULT 1"),
    ("data_security_settings", "last_incremental_backup_time_ms", "INTEGER"),
    ("data_security_settings", "last_full_backup_time_ms", "INTEGER"),
    ("backup_jobs", "kind", "TEXT NOT NULL DEFAULT 'incremental'"),
];

/// 数据库句柄：只保存路径和超时，按需建立连接
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    /// 打开数据库并确保表结构与设置行存在
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Self { path, busy_timeout };
        db.init_tables()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 建立一个短生命周期连接
    pub(crate) fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// 初始化数据库表
    fn init_tables(&self) -> Result<()> {
        debug!("正在初始化备份相关表...");

        let conn = self.connect()?;
        conn.execute_batch(include_str!("../../migrations/init_sqlite.sql"))?;
        Self::add_missing_columns(&conn)?;

        // 设置表始终只有一行
        conn.execute(
            "INSERT OR IGNORE INTO data_security_settings (id, app_db_path, updated_at_ms) \
             VALUES (1, ?1, ?2)",
            rusqlite::params![
                self.path.to_string_lossy().to_string(),
                chrono::Utc::now().timestamp_millis()
            ],
        )?;

        debug!("备份相关表初始化完成: {}", self.path.display());
        Ok(())
    }

    /// 为旧版数据库补齐新增列
    fn add_missing_columns(conn: &Connection) -> Result<()> {
        for (table, name, definition) in ADDED_COLUMNS {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
            let existing = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            if !existing.iter().any(|c| c == name) {
                info!("表 {} 缺少列 {}，正在补齐", table, name);
                conn.execute(
                    &format!("ALTER TABLE {table} ADD COLUMN {name} {definition}"),
                    [],
                )?;
            }
        }
        Ok(())
    }
}

/// 当前时间（毫秒）
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
