//! 定时备份调度
//!
//! 每个轮询周期重新读取设置并独立判断增量与全量是否到期：最近一次触发时间
//! 必须同时晚于上次成功时间和本进程内的上次尝试时间。两者同时到期时只执行全量。

use crate::config::AppConfig;
use crate::cron::latest_scheduled_time_ms;
use crate::db::{BackupKind, DataSecuritySettings, JobStore, SettingsStore, now_ms};
use crate::runner::Runner;
use crate::Result;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 手动触发的任务原因
pub const REASON_MANUAL: &str = "manual";
const REASON_INCREMENTAL: &str = "scheduled-incremental";
const REASON_FULL: &str = "scheduled-full";

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub poll_interval: Duration,
    /// 超过该时长仍未结束的任务视为僵死
    pub stale_after: Duration,
}

impl SchedulerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            stale_after: config.stale_after(),
        }
    }
}

/// 一次调度判断的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickAction {
    Disabled,
    /// 已有任务处于 queued / running
    ActiveJob(i64),
    NothingDue,
    Dispatched {
        kind: BackupKind,
        job_id: i64,
        scheduled_ms: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub action: TickAction,
    /// 本次被标记为失败的僵死任务
    pub stale_failed: Vec<i64>,
}

impl TickOutcome {
    fn new(action: TickAction, stale_failed: Vec<i64>) -> Self {
        Self {
            action,
            stale_failed,
        }
    }
}

/// 进程内的尝试记录，重启后清空
#[derive(Debug, Default)]
struct Attempts {
    incremental: Option<i64>,
    full: Option<i64>,
}

impl Attempts {
    fn get(&self, kind: BackupKind) -> Option<i64> {
        match kind {
            BackupKind::Incremental => self.incremental,
            BackupKind::Full => self.full,
        }
    }

    fn record(&mut self, kind: BackupKind, scheduled_ms: i64) {
        match kind {
            BackupKind::Incremental => self.incremental = Some(scheduled_ms),
            BackupKind::Full => self.full = Some(scheduled_ms),
        }
    }
}

pub struct Scheduler {
    settings: SettingsStore,
    jobs: JobStore,
    runner: Runner,
    options: SchedulerOptions,
    attempts: Mutex<Attempts>,
}

impl Scheduler {
    pub fn new(
        settings: SettingsStore,
        jobs: JobStore,
        runner: Runner,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            settings,
            jobs,
            runner,
            options,
            attempts: Mutex::new(Attempts::default()),
        }
    }

    /// 执行一次调度判断
    pub fn tick(&self, now_ms: i64) -> Result<TickOutcome> {
        let settings = self.settings.get_settings()?;
        if !settings.enabled {
            return Ok(TickOutcome::new(TickAction::Disabled, Vec::new()));
        }

        let stale_after_ms = i64::try_from(self.options.stale_after.as_millis()).unwrap_or(i64::MAX);
        let stale = self.jobs.fail_stale_jobs(now_ms, stale_after_ms)?;

        if let Some(active) = self.jobs.find_active_jobs()?.first() {
            debug!(job_id = active.id, "已有备份任务未结束，本轮跳过");
            return Ok(TickOutcome::new(TickAction::ActiveJob(active.id), stale));
        }

        let full = self.due(BackupKind::Full, &settings, now_ms);
        let incremental = self.due(BackupKind::Incremental, &settings, now_ms);
        let (kind, scheduled_ms, reason) = match (full, incremental) {
            (Some(at), _) => (BackupKind::Full, at, REASON_FULL),
            (None, Some(at)) => (BackupKind::Incremental, at, REASON_INCREMENTAL),
            (None, None) => return Ok(TickOutcome::new(TickAction::NothingDue, stale)),
        };

        info!(kind = %kind, scheduled_ms, "定时备份到期");
        let job_id = self
            .runner
            .start_job_if_idle(reason, kind == BackupKind::Full)?;
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(kind, scheduled_ms);

        Ok(TickOutcome::new(
            TickAction::Dispatched {
                kind,
                job_id,
                scheduled_ms,
            },
            stale,
        ))
    }

    /// 到期时返回本次的计划触发时间
    fn due(&self, kind: BackupKind, settings: &DataSecuritySettings, now_ms: i64) -> Option<i64> {
        let scheduled = scheduled_time_ms(kind, settings, now_ms)?;
        let last_success = settings.last_success_ms(kind);
        let last_attempt = self
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind);

        let after = |marker: Option<i64>| marker.is_none_or(|t| scheduled > t);
        (after(last_success) && after(last_attempt)).then_some(scheduled)
    }

    /// 轮询直到 `token` 被取消
    pub async fn run(self, token: CancellationToken) {
        info!(
            "备份调度已启动，轮询间隔 {} 秒",
            self.options.poll_interval.as_secs()
        );
        let poll_interval = self.options.poll_interval;
        let scheduler = Arc::new(self);

        loop {
            let this = Arc::clone(&scheduler);
            match tokio::task::spawn_blocking(move || this.tick(now_ms())).await {
                Ok(Ok(outcome)) => debug!(?outcome, "调度检查完成"),
                Ok(Err(e)) => error!(error = %e, "调度检查失败"),
                Err(e) => error!(error = %e, "调度检查线程异常退出"),
            }

            tokio::select! {
                _ = token.cancelled() => {
                    info!("备份调度已停止");
                    break;
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

/// 计算某类备份当前的计划触发时间
fn scheduled_time_ms(kind: BackupKind, settings: &DataSecuritySettings, now_ms: i64) -> Option<i64> {
    let schedule = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    match kind {
        BackupKind::Full => {
            if !settings.full_backup_enabled {
                return None;
            }
            latest_scheduled_time_ms(&schedule(&settings.full_backup_schedule)?, now_ms)
        }
        BackupKind::Incremental => match schedule(&settings.incremental_schedule) {
            Some(expr) => latest_scheduled_time_ms(&expr, now_ms),
            // 旧版配置：按固定间隔
            None => {
                if settings.interval_minutes <= 0 {
                    warn!(interval = settings.interval_minutes, "无效的备份间隔");
                    return None;
                }
                let Some(interval_ms) = settings.interval_minutes.checked_mul(60_000) else {
                    warn!(interval = settings.interval_minutes, "备份间隔过大，不会触发");
                    return None;
                };
                match settings.last_run_at_ms {
                    Some(last) if now_ms.saturating_sub(last) < interval_ms => None,
                    _ => Some(now_ms),
                }
            }
        },
    }
}
