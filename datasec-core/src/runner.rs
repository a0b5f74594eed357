//! 单任务运行器
//!
//! 同一进程内最多只有一个备份任务在执行。任务在后台阻塞线程中运行，调用方
//! 立即拿到任务 id。

use crate::db::{BackupKind, JobStatus, JobStore, JobUpdate, now_ms};
use crate::executor::BackupExecutor;
use crate::Result;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tracing::{error, info, instrument, warn};

/// 后台任务运行器
#[derive(Debug, Clone)]
pub struct Runner {
    jobs: JobStore,
    executor: Arc<BackupExecutor>,
    handle: Handle,
    current: Arc<Mutex<Option<i64>>>,
}

impl Runner {
    /// `handle` 为执行阻塞任务的 tokio 运行时
    pub fn new(executor: BackupExecutor, handle: Handle) -> Self {
        Self {
            jobs: executor.jobs().clone(),
            executor: Arc::new(executor),
            handle,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// 当前进程内正在执行的任务
    pub fn current_job(&self) -> Option<i64> {
        *lock(&self.current)
    }

    /// 空闲时创建并启动新任务；已有任务在执行时直接返回其 id
    #[instrument(skip(self))]
    pub fn start_job_if_idle(&self, reason: &str, full_backup: bool) -> Result<i64> {
        let mut current = lock(&self.current);
        if let Some(job_id) = *current {
            info!(job_id, "已有备份任务在执行，跳过新任务");
            return Ok(job_id);
        }

        let kind = BackupKind::from_full_flag(full_backup);
        let job = self.jobs.create_job(kind, JobStatus::Queued, reason)?;
        *current = Some(job.id);
        drop(current);

        info!(job_id = job.id, kind = %kind, "启动备份任务");
        let job_id = job.id;
        let executor = Arc::clone(&self.executor);
        let jobs = self.jobs.clone();
        let marker = Arc::clone(&self.current);
        self.handle.spawn_blocking(move || {
            let _clear = ClearMarker { marker, job_id };
            match catch_unwind(AssertUnwindSafe(|| executor.run(job_id, kind))) {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => fail_if_unfinished(&jobs, job_id, e.to_string()),
                Err(payload) => {
                    let detail = format!("备份线程异常退出: {}", panic_message(payload.as_ref()));
                    error!(job_id, "{}", detail);
                    fail_if_unfinished(&jobs, job_id, detail);
                }
            }
        });

        Ok(job_id)
    }
}

/// 任务结束（包括 panic）时清除进程内的执行标记
struct ClearMarker {
    marker: Arc<Mutex<Option<i64>>>,
    job_id: i64,
}

impl Drop for ClearMarker {
    fn drop(&mut self) {
        let mut current = lock(&self.marker);
        if *current == Some(self.job_id) {
            *current = None;
        }
    }
}

/// 执行器未能写入终态时（例如数据库写入失败或 panic）补记失败
fn fail_if_unfinished(jobs: &JobStore, job_id: i64, detail: String) {
    let finished = jobs
        .get_job(job_id)
        .map(|job| job.status.is_terminal())
        .unwrap_or(false);
    if finished {
        return;
    }

    let update = JobUpdate {
        status: Some(JobStatus::Failed),
        message: Some("备份失败".to_string()),
        detail: Some(detail),
        finished_at_ms: Some(now_ms()),
        ..Default::default()
    };
    if let Err(e) = jobs.update_job(job_id, update) {
        warn!(job_id, error = %e, "无法记录任务失败状态");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知错误".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
