use super::models::{BackupKind, DataSecuritySettings, SettingsUpdate, TargetMode};
use super::{Database, now_ms};
use crate::cron::CronExpr;
use crate::{DataSecError, Result};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params_from_iter};
use tracing::info;

const SELECT_SETTINGS: &str = "SELECT enabled, interval_minutes, incremental_schedule, \
     full_backup_schedule, target_mode, target_ip, target_share_name, target_subdir, \
     target_local_dir, compose_path, compose_project_name, stop_services, app_db_path, \
     upload_after_backup, upload_host, upload_username, upload_target_path, \
     full_backup_enabled, full_backup_include_images, updated_at_ms, last_run_at_ms, \
     last_incremental_backup_time_ms, last_full_backup_time_ms \
     FROM data_security_settings WHERE id = 1";

/// 备份设置存储（单行）
#[derive(Debug, Clone)]
pub struct SettingsStore {
    db: Database,
}

impl SettingsStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 读取设置
    pub fn get_settings(&self) -> Result<DataSecuritySettings> {
        let conn = self.db.connect()?;
        let settings = conn
            .query_row(SELECT_SETTINGS, [], row_to_settings)
            .optional()?;

        match settings {
            Some(settings) => settings,
            // 初始化时总会插入该行，这里只可能是被外部删除
            None => Err(DataSecError::Database("备份设置行不存在".to_string())),
        }
    }

    /// 更新允许修改的字段，返回更新后的设置
    pub fn update_settings(&self, update: SettingsUpdate) -> Result<DataSecuritySettings> {
        let assignments = build_assignments(update)?;
        if assignments.is_empty() {
            return self.get_settings();
        }

        let mut columns = Vec::with_capacity(assignments.len() + 1);
        let mut values = Vec::with_capacity(assignments.len() + 1);
        for (column, value) in assignments {
            columns.push(format!("{column} = ?"));
            values.push(value);
        }
        columns.push("updated_at_ms = ?".to_string());
        values.push(Value::Integer(now_ms()));

        let sql = format!(
            "UPDATE data_security_settings SET {} WHERE id = 1",
            columns.join(", ")
        );
        let conn = self.db.connect()?;
        conn.execute(&sql, params_from_iter(values))?;
        info!("备份设置已更新");

        self.get_settings()
    }

    /// 记录最近一次运行时间
    pub fn touch_last_run(&self, ts_ms: i64) -> Result<()> {
        let conn = self.db.connect()?;
        conn.execute(
            "UPDATE data_security_settings SET last_run_at_ms = ?1 WHERE id = 1",
            [ts_ms],
        )?;
        Ok(())
    }

    /// 记录某类备份最近一次成功时间
    pub fn record_backup_success(&self, kind: BackupKind, ts_ms: i64) -> Result<()> {
        let column = match kind {
            BackupKind::Incremental => "last_incremental_backup_time_ms",
            BackupKind::Full => "last_full_backup_time_ms",
        };
        let conn = self.db.connect()?;
        conn.execute(
            &format!("UPDATE data_security_settings SET {column} = ?1 WHERE id = 1"),
            [ts_ms],
        )?;
        Ok(())
    }
}

fn row_to_settings(row: &Row<'_>) -> rusqlite::Result<Result<DataSecuritySettings>> {
    let target_mode: String = row.get(4)?;
    let target_mode = match target_mode.parse::<TargetMode>() {
        Ok(mode) => mode,
        Err(e) => return Ok(Err(e)),
    };

    Ok(Ok(DataSecuritySettings {
        enabled: row.get(0)?,
        interval_minutes: row.get(1)?,
        incremental_schedule: row.get(2)?,
        full_backup_schedule: row.get(3)?,
        target_mode,
        target_ip: row.get(5)?,
        target_share_name: row.get(6)?,
        target_subdir: row.get(7)?,
        target_local_dir: row.get(8)?,
        compose_path: row.get(9)?,
        compose_project_name: row.get(10)?,
        stop_services: row.get(11)?,
        app_db_path: row.get(12)?,
        upload_after_backup: row.get(13)?,
        upload_host: row.get(14)?,
        upload_username: row.get(15)?,
        upload_target_path: row.get(16)?,
        full_backup_enabled: row.get(17)?,
        full_backup_include_images: row.get(18)?,
        updated_at_ms: row.get(19)?,
        last_run_at_ms: row.get(20)?,
        last_incremental_backup_time_ms: row.get(21)?,
        last_full_backup_time_ms: row.get(22)?,
    }))
}

/// 校验并展开更新字段为 (列名, 值)
fn build_assignments(update: SettingsUpdate) -> Result<Vec<(&'static str, Value)>> {
    let mut out: Vec<(&'static str, Value)> = Vec::new();

    let flag = |v: bool| Value::Integer(i64::from(v));

    if let Some(v) = update.enabled {
        out.push(("enabled", flag(v)));
    }
    if let Some(v) = update.interval_minutes {
        if v < 1 {
            return Err(DataSecError::config(format!(
                "interval_minutes 必须大于 0: {v}"
            )));
        }
        out.push(("interval_minutes", Value::Integer(v)));
    }
    if let Some(v) = update.incremental_schedule {
        out.push(("incremental_schedule", schedule_value(v)?));
    }
    if let Some(v) = update.full_backup_schedule {
        out.push(("full_backup_schedule", schedule_value(v)?));
    }
    if let Some(v) = update.target_mode {
        out.push(("target_mode", Value::Text(v.as_str().to_string())));
    }

    let texts = [
        ("target_ip", update.target_ip),
        ("target_share_name", update.target_share_name),
        ("target_subdir", update.target_subdir),
        ("target_local_dir", update.target_local_dir),
        ("compose_path", update.compose_path),
        ("compose_project_name", update.compose_project_name),
        ("app_db_path", update.app_db_path),
        ("upload_host", update.upload_host),
        ("upload_username", update.upload_username),
        ("upload_target_path", update.upload_target_path),
    ];
    for (column, value) in texts {
        if let Some(value) = value {
            out.push((column, text_value(value)));
        }
    }

    if let Some(v) = update.stop_services {
        out.push(("stop_services", flag(v)));
    }
    if let Some(v) = update.upload_after_backup {
        out.push(("upload_after_backup", flag(v)));
    }
    if let Some(v) = update.full_backup_enabled {
        out.push(("full_backup_enabled", flag(v)));
    }
    if let Some(v) = update.full_backup_include_images {
        out.push(("full_backup_include_images", flag(v)));
    }

    Ok(out)
}

/// 空白字符串视为清空
fn text_value(value: Option<String>) -> Value {
    match value.map(|s| s.trim().to_string()) {
        Some(s) if !s.is_empty() => Value::Text(s),
        _ => Value::Null,
    }
}

fn schedule_value(value: Option<String>) -> Result<Value> {
    match text_value(value) {
        Value::Text(expr) => {
            CronExpr::parse(&expr)?;
            Ok(Value::Text(expr))
        }
        other => Ok(other),
    }
}
