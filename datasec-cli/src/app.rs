use datasec_core::{
    Result,
    config::AppConfig,
    container::{DockerEngine, SystemProcessRunner},
    db::{Database, JobStore, SettingsStore},
    executor::{BackupExecutor, ExecutorOptions},
    runner::Runner,
    scheduler::{Scheduler, SchedulerOptions},
};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::cli::{BackupCommand, Commands, SettingsCommand};
use crate::commands;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CliApp {
    pub config: AppConfig,
    pub settings: SettingsStore,
    pub jobs: JobStore,
    pub executor: BackupExecutor,
}

impl CliApp {
    /// 使用指定配置文件初始化；未指定时按默认顺序查找
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => AppConfig::load_from_file(path)?,
            None => AppConfig::find_and_load_config()?,
        };
        Self::from_config(config)
    }

    pub fn from_config(config: AppConfig) -> Result<Self> {
        let database = Database::open(config.database_path(), config.busy_timeout())?;
        debug!("数据库已就绪: {}", database.path().display());

        let settings = SettingsStore::new(database.clone());
        let jobs = JobStore::new(database);
        let engine = DockerEngine::new(Arc::new(SystemProcessRunner::new()), &config.docker.binary);
        let executor = BackupExecutor::new(
            settings.clone(),
            jobs.clone(),
            engine,
            ExecutorOptions::from_config(&config),
        );

        Ok(Self {
            config,
            settings,
            jobs,
            executor,
        })
    }

    /// 在当前 tokio 运行时上创建任务运行器
    pub fn runner(&self) -> Runner {
        Runner::new(self.executor.clone(), Handle::current())
    }

    pub fn scheduler(&self, runner: Runner) -> Scheduler {
        Scheduler::new(
            self.settings.clone(),
            self.jobs.clone(),
            runner,
            SchedulerOptions::from_config(&self.config),
        )
    }

    /// 运行应用命令
    pub async fn run_command(&self, command: Commands) -> Result<()> {
        match command {
            // 已经在 main.rs 中处理
            Commands::Init { .. } => Ok(()),
            Commands::Serve => commands::run_serve(self).await,
            Commands::Backup(cmd) => self.run_backup_command(cmd).await,
            Commands::Settings(cmd) => match cmd {
                SettingsCommand::Show => commands::show_settings(self),
                SettingsCommand::Set(args) => commands::set_settings(self, args),
            },
            Commands::Cron { expression, at } => commands::run_cron(&expression, at.as_deref()),
        }
    }

    async fn run_backup_command(&self, cmd: BackupCommand) -> Result<()> {
        match cmd {
            BackupCommand::Run { full, wait } => commands::run_backup(self, full, wait).await,
            BackupCommand::Jobs { limit } => commands::list_jobs(self, limit),
            BackupCommand::Job { id } => commands::show_job(self, id),
        }
    }
}
