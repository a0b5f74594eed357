use super::models::{BackupJob, BackupKind, JobStatus, JobUpdate};
use super::{Database, now_ms};
use crate::{DataSecError, Result};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, warn};

const SELECT_JOB: &str = "SELECT id, kind, status, progress, message, detail, output_dir, \
     created_at_ms, started_at_ms, finished_at_ms FROM backup_jobs";

/// 僵死任务的失败说明
pub const STALE_JOB_MESSAGE: &str = "任务超时（可能进程已退出）";

/// 备份任务存储
#[derive(Debug, Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 创建任务，进度从 0 开始
    pub fn create_job(
        &self,
        kind: BackupKind,
        status: JobStatus,
        message: impl Into<String>,
    ) -> Result<BackupJob> {
        let message = message.into();
        let created_at_ms = now_ms();
        let conn = self.db.connect()?;
        conn.execute(
            "INSERT INTO backup_jobs (kind, status, progress, message, created_at_ms) \
             VALUES (?1, ?2, 0, ?3, ?4)",
            params![kind.as_str(), status.as_str(), message, created_at_ms],
        )?;
        let id = conn.last_insert_rowid();
        debug!(job_id = id, kind = %kind, "创建备份任务");

        Ok(BackupJob {
            id,
            kind,
            status,
            progress: 0,
            message: Some(message),
            detail: None,
            output_dir: None,
            created_at_ms,
            started_at_ms: None,
            finished_at_ms: None,
        })
    }

    /// 部分更新任务；进度被限制在 [0, 100]
    ///
    /// 只更新仍处于 queued / running 的任务，任务已进入终态时忽略本次更新并返回
    /// `false`，因此终态只会写入一次。
    pub fn update_job(&self, id: i64, update: JobUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(true);
        }

        let mut columns: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = update.status {
            columns.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(progress) = update.progress {
            columns.push("progress = ?");
            values.push(Value::Integer(progress.clamp(0, 100)));
        }
        if let Some(message) = update.message {
            columns.push("message = ?");
            values.push(Value::Text(message));
        }
        if let Some(detail) = update.detail {
            columns.push("detail = ?");
            values.push(Value::Text(detail));
        }
        if let Some(output_dir) = update.output_dir {
            columns.push("output_dir = ?");
            values.push(Value::Text(output_dir));
        }
        if let Some(ts) = update.started_at_ms {
            columns.push("started_at_ms = ?");
            values.push(Value::Integer(ts));
        }
        if let Some(ts) = update.finished_at_ms {
            columns.push("finished_at_ms = ?");
            values.push(Value::Integer(ts));
        }
        values.push(Value::Integer(id));

        let sql = format!(
            "UPDATE backup_jobs SET {} WHERE id = ? AND status IN ('queued', 'running')",
            columns.join(", ")
        );
        let conn = self.db.connect()?;
        if conn.execute(&sql, params_from_iter(values))? > 0 {
            return Ok(true);
        }

        let exists = conn
            .query_row("SELECT 1 FROM backup_jobs WHERE id = ?1", [id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(DataSecError::JobNotFound(id));
        }
        debug!(job_id = id, "任务已结束，忽略更新");
        Ok(false)
    }

    /// 获取任务，不存在时返回 `JobNotFound`
    pub fn get_job(&self, id: i64) -> Result<BackupJob> {
        let conn = self.db.connect()?;
        let job = conn
            .query_row(&format!("{SELECT_JOB} WHERE id = ?1"), [id], row_to_job)
            .optional()?;

        match job {
            Some(job) => job,
            None => Err(DataSecError::JobNotFound(id)),
        }
    }

    /// 按创建时间倒序列出任务
    pub fn list_jobs(&self, limit: usize) -> Result<Vec<BackupJob>> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_JOB} ORDER BY created_at_ms DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit as i64], row_to_job)?;
        collect_jobs(rows)
    }

    /// 所有处于 queued / running 的任务（新到旧）
    pub fn find_active_jobs(&self) -> Result<Vec<BackupJob>> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_JOB} WHERE status IN ('queued', 'running') \
             ORDER BY created_at_ms DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], row_to_job)?;
        collect_jobs(rows)
    }

    /// 将超过阈值仍未结束的任务标记为失败，返回被处理的任务 ID
    pub fn fail_stale_jobs(&self, now_ms: i64, stale_after_ms: i64) -> Result<Vec<i64>> {
        let stale: Vec<i64> = self
            .find_active_jobs()?
            .into_iter()
            .filter(|job| job.finished_at_ms.is_none())
            .filter(|job| now_ms - job.created_at_ms > stale_after_ms)
            .map(|job| job.id)
            .collect();

        let mut failed = Vec::with_capacity(stale.len());
        for id in stale {
            let update = JobUpdate {
                status: Some(JobStatus::Failed),
                message: Some(STALE_JOB_MESSAGE.to_string()),
                finished_at_ms: Some(now_ms),
                ..Default::default()
            };
            // 查询与更新之间任务可能刚好结束
            if self.update_job(id, update)? {
                warn!(job_id = id, "发现僵死备份任务，已标记为失败");
                failed.push(id);
            }
        }
        Ok(failed)
    }
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Result<BackupJob>> {
    let kind: String = row.get(1)?;
    let status: String = row.get(2)?;
    let (kind, status) = match (kind.parse::<BackupKind>(), status.parse::<JobStatus>()) {
        (Ok(kind), Ok(status)) => (kind, status),
        (Err(e), _) | (_, Err(e)) => return Ok(Err(e)),
    };

    Ok(Ok(BackupJob {
        id: row.get(0)?,
        kind,
        status,
        progress: row.get(3)?,
        message: row.get(4)?,
        detail: row.get(5)?,
        output_dir: row.get(6)?,
        created_at_ms: row.get(7)?,
        started_at_ms: row.get(8)?,
        finished_at_ms: row.get(9)?,
    }))
}

fn collect_jobs<I>(rows: I) -> Result<Vec<BackupJob>>
where
    I: Iterator<Item = rusqlite::Result<Result<BackupJob>>>,
{
    let mut jobs = Vec::new();
    for row in rows {
        jobs.push(row??);
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, JobStore) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("auth.db"), Duration::from_secs(1)).unwrap();
        (dir, JobStore::new(db))
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, store) = store();
        let job = store
            .create_job(BackupKind::Incremental, JobStatus::Queued, "排队中")
            .unwrap();
        assert_eq!(job.progress, 0);

        let fetched = store.get_job(job.id).unwrap();
        assert_eq!(fetched, job);
    }

    #[test]
    fn test_get_missing_job() {
        let (_dir, store) = store();
        assert!(matches!(
            store.get_job(42),
            Err(DataSecError::JobNotFound(42))
        ));
        assert!(matches!(
            store.update_job(42, JobUpdate::progress(1, "x")),
            Err(DataSecError::JobNotFound(42))
        ));
    }

    #[test]
    fn test_progress_is_clamped() {
        let (_dir, store) = store();
        let job = store
            .create_job(BackupKind::Full, JobStatus::Running, "运行中")
            .unwrap();

        store.update_job(job.id, JobUpdate::progress(150, "超出")).unwrap();
        assert_eq!(store.get_job(job.id).unwrap().progress, 100);

        store.update_job(job.id, JobUpdate::progress(-10, "负数")).unwrap();
        assert_eq!(store.get_job(job.id).unwrap().progress, 0);
    }

    #[test]
    fn test_update_applies_only_provided_fields() {
        let (_dir, store) = store();
        let job = store
            .create_job(BackupKind::Incremental, JobStatus::Queued, "排队中")
            .unwrap();

        store
            .update_job(
                job.id,
                JobUpdate {
                    detail: Some("docker 不可用".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let fetched = store.get_job(job.id).unwrap();
        assert_eq!(fetched.detail.as_deref(), Some("docker 不可用"));
        assert_eq!(fetched.message.as_deref(), Some("排队中"));
        assert_eq!(fetched.status, JobStatus::Queued);
    }

    #[test]
    fn test_terminal_status_is_written_once() {
        let (_dir, store) = store();
        let job = store
            .create_job(BackupKind::Incremental, JobStatus::Running, "运行中")
            .unwrap();

        let failed = JobUpdate {
            status: Some(JobStatus::Failed),
            message: Some(STALE_JOB_MESSAGE.to_string()),
            finished_at_ms: Some(1),
            ..Default::default()
        };
        assert!(store.update_job(job.id, failed).unwrap());

        let success = JobUpdate {
            status: Some(JobStatus::Success),
            progress: Some(100),
            message: Some("备份完成".to_string()),
            finished_at_ms: Some(2),
            ..Default::default()
        };
        assert!(!store.update_job(job.id, success).unwrap());
        assert!(!store.update_job(job.id, JobUpdate::progress(80, "晚到的进度")).unwrap());

        let fetched = store.get_job(job.id).unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert_eq!(fetched.message.as_deref(), Some(STALE_JOB_MESSAGE));
        assert_eq!(fetched.finished_at_ms, Some(1));
        assert_eq!(fetched.progress, 0);
    }

    #[test]
    fn test_list_newest_first_with_limit() {
        let (_dir, store) = store();
        let ids: Vec<i64> = (0..3)
            .map(|i| {
                store
                    .create_job(BackupKind::Incremental, JobStatus::Success, format!("job {i}"))
                    .unwrap()
                    .id
            })
            .collect();

        let jobs = store.list_jobs(2).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, ids[2]);
        assert_eq!(jobs[1].id, ids[1]);
    }

    #[test]
    fn test_fail_stale_jobs_only_touches_old_active_jobs() {
        let (_dir, store) = store();
        let old = store
            .create_job(BackupKind::Incremental, JobStatus::Running, "运行中")
            .unwrap();
        let fresh = store
            .create_job(BackupKind::Incremental, JobStatus::Queued, "排队中")
            .unwrap();
        let done = store
            .create_job(BackupKind::Incremental, JobStatus::Success, "完成")
            .unwrap();

        let day_ms = 24 * 3600 * 1000;
        let conn = store.db.connect().unwrap();
        conn.execute(
            "UPDATE backup_jobs SET created_at_ms = created_at_ms - ?1 WHERE id IN (?2, ?3)",
            params![day_ms + 1_000, old.id, done.id],
        )
        .unwrap();

        let failed = store.fail_stale_jobs(now_ms(), day_ms).unwrap();
        assert_eq!(failed, vec![old.id]);

        let old = store.get_job(old.id).unwrap();
        assert_eq!(old.status, JobStatus::Failed);
        assert!(old.finished_at_ms.is_some());
        assert_eq!(store.get_job(fresh.id).unwrap().status, JobStatus::Queued);
        assert_eq!(store.get_job(done.id).unwrap().status, JobStatus::Success);
    }
}
