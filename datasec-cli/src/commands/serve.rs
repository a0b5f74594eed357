use crate::app::CliApp;
use crate::project_info::version_line;
use datasec_core::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 运行调度器直到收到 Ctrl-C
pub async fn run_serve(app: &CliApp) -> Result<()> {
    info!("🚀 {}", version_line());
    let runner = app.runner();
    let scheduler = app.scheduler(runner.clone());

    let token = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(token.clone()));

    tokio::signal::ctrl_c().await?;
    info!("⏹️  收到退出信号，正在停止调度...");
    token.cancel();
    handle.await?;

    if let Some(job_id) = runner.current_job() {
        warn!("备份任务 #{} 仍在执行，进程将在其结束后退出", job_id);
    }
    Ok(())
}
