use crate::app::CliApp;
use crate::utils::format_ms;
use datasec_core::db::{BackupJob, JobStatus};
use datasec_core::scheduler::REASON_MANUAL;
use datasec_core::{DataSecError, Result};
use std::time::Duration;
use tracing::{error, info};

/// `--wait` 时的轮询间隔
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// 手动触发备份
pub async fn run_backup(app: &CliApp, full: bool, wait: bool) -> Result<()> {
    let runner = app.runner();
    let job_id = runner.start_job_if_idle(REASON_MANUAL, full)?;
    info!("💾 备份任务已提交: #{}", job_id);

    if !wait {
        // 运行时关闭时会等待后台线程结束，进程在任务完成后才退出
        info!("💡 可在另一个终端使用 'datasec backup job {}' 查看进度", job_id);
        return Ok(());
    }

    let job = wait_for_job(app, job_id).await?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    match job.status {
        JobStatus::Success => {
            info!(
                "✅ 备份完成: {}",
                job.output_dir.as_deref().unwrap_or_default()
            );
            Ok(())
        }
        _ => {
            let detail = job.detail.unwrap_or_default();
            error!("❌ 备份失败: {}", detail);
            Err(DataSecError::backup(format!("任务 #{job_id} 失败: {detail}")))
        }
    }
}

/// 轮询任务直到进入终态，进度变化时输出一行
async fn wait_for_job(app: &CliApp, job_id: i64) -> Result<BackupJob> {
    let mut last_progress = -1;
    loop {
        let job = app.jobs.get_job(job_id)?;
        if job.progress != last_progress {
            info!(
                "⏳ [{:>3}%] {}",
                job.progress,
                job.message.as_deref().unwrap_or_default()
            );
            last_progress = job.progress;
        }
        if job.status.is_terminal() {
            return Ok(job);
        }
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    }
}

/// 列出最近的任务
pub fn list_jobs(app: &CliApp, limit: usize) -> Result<()> {
    let jobs = app.jobs.list_jobs(limit)?;
    if jobs.is_empty() {
        info!("📦 暂无备份任务");
    }
    for job in &jobs {
        info!(
            "#{} {} {} {}% 创建于 {}",
            job.id,
            job.kind,
            job.status,
            job.progress,
            format_ms(job.created_at_ms)
        );
    }
    println!("{}", serde_json::to_string_pretty(&jobs)?);
    Ok(())
}

/// 查看单个任务
pub fn show_job(app: &CliApp, id: i64) -> Result<()> {
    let job = app.jobs.get_job(id)?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
